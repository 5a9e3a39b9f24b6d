// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2024 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2024 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2024 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bc::{
    Bip340Sig, LegacyPk, LegacySig, ScriptBytes, ScriptPubkey, SighashCache, SighashError,
    TapSighash, Tx, TxOut,
};
use derive::{NetworkParams, ScriptType};

use crate::{Input, Psbt};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum SignError {
    /// PSBT has no input {0}.
    NoInput(usize),

    /// input {0} doesn't contain the spent output, which is required for signing.
    NoPrevout(usize),

    /// input {index} is expected to be {expected}, but its scripts don't match this type.
    ScriptTypeMismatch { index: usize, expected: ScriptType },

    #[from]
    #[display(inner)]
    Sighash(SighashError),
}

/// Script code of a P2PKH-like spend of a key hash.
fn p2pkh_script_code(hash: [u8; 20]) -> ScriptBytes {
    ScriptPubkey::p2pkh(hash).as_script_bytes().clone()
}

impl Input {
    fn require_type(&self, script_type: ScriptType) -> Result<(), SignError> {
        if self.prev_txout().is_none() {
            return Err(SignError::NoPrevout(self.index));
        }
        if self.script_type() != Some(script_type) {
            return Err(SignError::ScriptTypeMismatch {
                index: self.index,
                expected: script_type,
            });
        }
        Ok(())
    }

    /// Script code committed to by the ECDSA signing payload.
    fn script_code(&self, script_type: ScriptType) -> Result<ScriptBytes, SignError> {
        let mismatch = SignError::ScriptTypeMismatch {
            index: self.index,
            expected: script_type,
        };
        let prev_script = &self.prev_txout().ok_or(SignError::NoPrevout(self.index))?.script_pubkey;
        Ok(match script_type {
            ScriptType::P2pkh => prev_script.as_script_bytes().clone(),
            ScriptType::P2wpkh => p2pkh_script_code(prev_script.hash20().ok_or(mismatch)?),
            ScriptType::P2shP2pkh => {
                self.redeem_script.as_ref().ok_or(mismatch)?.as_script_bytes().clone()
            }
            ScriptType::P2shP2wpkh => {
                let redeem_script = self.redeem_script.as_ref().ok_or(mismatch)?;
                let program = ScriptPubkey::from_unsafe(redeem_script.to_vec());
                p2pkh_script_code(program.hash20().ok_or(mismatch)?)
            }
            ScriptType::P2tr => return Err(mismatch),
        })
    }
}

impl Psbt {
    /// Computes the payload which has to be signed for the input. For ECDSA
    /// inputs this is the full preimage hashed by the coin digest; for
    /// taproot inputs it is the BIP-341 signature message.
    ///
    /// Coins with replay protection sign all inputs with the BIP-143
    /// algorithm and with the fork id in the sighash type.
    pub fn sighash_preimage(
        &self,
        index: usize,
        script_type: ScriptType,
        params: &NetworkParams,
    ) -> Result<Vec<u8>, SignError> {
        let input = self.input(index).ok_or(SignError::NoInput(index))?;
        input.require_type(script_type)?;
        let tx = Tx::from(self.to_unsigned_tx());

        if script_type == ScriptType::P2tr {
            let prevouts = self
                .inputs()
                .map(|input| input.prev_txout().cloned().ok_or(SignError::NoPrevout(input.index)))
                .collect::<Result<Vec<TxOut>, _>>()?;
            let cache = SighashCache::with_prevouts(&tx, prevouts)?;
            return Ok(cache.taproot_preimage(index, input.sighash_type, None, None)?);
        }

        let sighash_type = params.adapt_sighash(input.sighash_type.unwrap_or_default());
        let script_code = input.script_code(script_type)?;
        let cache = SighashCache::new(&tx);
        let preimage = if params.fork_id.is_some() || script_type.is_segwit() {
            let value = input.value().ok_or(SignError::NoPrevout(index))?;
            cache.segwit_v0_preimage(index, &script_code, value, sighash_type)?
        } else {
            cache.legacy_preimage(index, &script_code, sighash_type)?
        };
        Ok(preimage)
    }

    /// Message digest the signature of the input must commit to.
    pub fn sighash_digest(
        &self,
        index: usize,
        script_type: ScriptType,
        params: &NetworkParams,
    ) -> Result<[u8; 32], SignError> {
        let preimage = self.sighash_preimage(index, script_type, params)?;
        Ok(match script_type {
            ScriptType::P2tr => TapSighash::from_sig_msg(preimage).to_byte_array(),
            _ => params.sighash_digest.digest(preimage),
        })
    }

    /// Stores ECDSA signature of the input, replacing a previous signature by
    /// the same key.
    pub fn set_partial_sig(
        &mut self,
        index: usize,
        pk: LegacyPk,
        sig: LegacySig,
    ) -> Result<(), SignError> {
        let input = self.input_mut(index).ok_or(SignError::NoInput(index))?;
        input.partial_sigs.insert(pk, sig);
        Ok(())
    }

    /// Stores taproot key-path signature of the input.
    pub fn set_tap_key_sig(&mut self, index: usize, sig: Bip340Sig) -> Result<(), SignError> {
        let input = self.input_mut(index).ok_or(SignError::NoInput(index))?;
        input.tap_key_sig = Some(sig);
        Ok(())
    }
}
