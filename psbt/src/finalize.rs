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

use bc::{Chunk, LegacyPk, LegacySig, Sats, ScriptError, ScriptPubkey, SigScript, Tx, Witness};
use derive::ScriptType;

use crate::{Input, Psbt};

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum FinalizeError {
    /// PSBT has no input {0}.
    NoInput(usize),

    /// {found} script types were provided for a PSBT with {expected} inputs.
    TypesMismatch { expected: usize, found: usize },

    /// input {index} is expected to be {expected}, but its scripts don't match this type.
    ScriptTypeMismatch { index: usize, expected: ScriptType },

    /// input {0} doesn't contain the spent output.
    NoPrevout(usize),

    /// input {0} has no signatures.
    NoSignature(usize),

    /// none of the signatures of input {0} is made by the key the spent output commits to.
    NoMatchingKey(usize),

    /// input {0} spends a P2SH output but has no redeem script.
    NoRedeemScript(usize),

    #[from]
    #[display(inner)]
    Script(ScriptError),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ExtractError {
    /// input {0} is not finalized.
    NotFinalized(usize),

    /// input {0} doesn't contain the spent output, so the fee can't be checked.
    NoPrevout(usize),

    /// sum of the transaction amounts exceeds the maximal value.
    AmountOverflow,

    /// transaction spends {input} sats, but creates outputs worth {output} sats.
    Overspend { input: Sats, output: Sats },

    /// transaction fee {fee} sats is less than its virtual size of {vsize} vbytes.
    InsufficientFee { fee: Sats, vsize: usize },
}

impl Input {
    /// Key hash the spent output (or the wrapped script) commits to.
    fn committed_key_hash(&self, script_type: ScriptType) -> Result<[u8; 20], FinalizeError> {
        let mismatch = FinalizeError::ScriptTypeMismatch {
            index: self.index,
            expected: script_type,
        };
        let prevout = self.prev_txout().ok_or(FinalizeError::NoPrevout(self.index))?;
        let script = match script_type {
            ScriptType::P2pkh | ScriptType::P2wpkh => prevout.script_pubkey.clone(),
            ScriptType::P2shP2pkh | ScriptType::P2shP2wpkh => {
                let redeem_script =
                    self.redeem_script.as_ref().ok_or(FinalizeError::NoRedeemScript(self.index))?;
                ScriptPubkey::from_unsafe(redeem_script.to_vec())
            }
            ScriptType::P2tr => return Err(mismatch),
        };
        script.hash20().ok_or(mismatch)
    }

    fn signing_pair(&self, script_type: ScriptType) -> Result<(LegacyPk, LegacySig), FinalizeError> {
        if self.partial_sigs.is_empty() {
            return Err(FinalizeError::NoSignature(self.index));
        }
        let hash = self.committed_key_hash(script_type)?;
        self.partial_sigs
            .iter()
            .find(|(pk, _)| pk.pubkey_hash() == hash)
            .map(|(pk, sig)| (*pk, *sig))
            .ok_or(FinalizeError::NoMatchingKey(self.index))
    }

    /// Builds the final scriptSig and witness of the input from its signatures.
    /// Inputs which are already finalized are left intact.
    pub fn finalize(&mut self, script_type: ScriptType) -> Result<(), FinalizeError> {
        if self.is_finalized() {
            return Ok(());
        }
        if self.script_type() != Some(script_type) {
            return Err(FinalizeError::ScriptTypeMismatch {
                index: self.index,
                expected: script_type,
            });
        }

        match script_type {
            ScriptType::P2pkh => {
                let (pk, sig) = self.signing_pair(script_type)?;
                self.final_script_sig = Some(SigScript::from_chunks(&[
                    Chunk::push(sig.to_vec()),
                    Chunk::push(pk.to_vec()),
                ])?);
            }
            ScriptType::P2shP2pkh => {
                let (pk, sig) = self.signing_pair(script_type)?;
                let redeem_script =
                    self.redeem_script.as_ref().ok_or(FinalizeError::NoRedeemScript(self.index))?;
                self.final_script_sig = Some(SigScript::from_chunks(&[
                    Chunk::push(sig.to_vec()),
                    Chunk::push(pk.to_vec()),
                    Chunk::push(redeem_script.to_vec()),
                ])?);
            }
            ScriptType::P2shP2wpkh => {
                let (pk, sig) = self.signing_pair(script_type)?;
                let redeem_script =
                    self.redeem_script.as_ref().ok_or(FinalizeError::NoRedeemScript(self.index))?;
                self.final_script_sig =
                    Some(SigScript::from_chunks(&[Chunk::push(redeem_script.to_vec())])?);
                self.final_witness = Some(Witness::from_consensus_stack([sig.to_vec(), pk.to_vec()]));
            }
            ScriptType::P2wpkh => {
                let (pk, sig) = self.signing_pair(script_type)?;
                self.final_witness = Some(Witness::from_consensus_stack([sig.to_vec(), pk.to_vec()]));
            }
            ScriptType::P2tr => {
                let sig = self.tap_key_sig.ok_or(FinalizeError::NoSignature(self.index))?;
                self.final_witness = Some(Witness::from_consensus_stack([sig.to_vec()]));
            }
        }

        self.clear_signing_data();
        Ok(())
    }

    /// Removes fields which are not needed anymore once the input is finalized.
    fn clear_signing_data(&mut self) {
        self.partial_sigs.clear();
        self.sighash_type = None;
        self.redeem_script = None;
        self.witness_script = None;
        self.bip32_derivation.clear();
        self.tap_key_sig = None;
        self.tap_script_sig.clear();
        self.tap_leaf_script.clear();
        self.tap_bip32_derivation.clear();
        self.tap_internal_key = None;
        self.tap_merkle_root = None;
    }
}

impl Psbt {
    pub fn finalize_input(
        &mut self,
        index: usize,
        script_type: ScriptType,
    ) -> Result<(), FinalizeError> {
        self.input_mut(index).ok_or(FinalizeError::NoInput(index))?.finalize(script_type)
    }

    /// Finalizes every input with the script type given at its position.
    pub fn finalize_all(&mut self, script_types: &[ScriptType]) -> Result<(), FinalizeError> {
        if script_types.len() != self.inputs.len() {
            return Err(FinalizeError::TypesMismatch {
                expected: self.inputs.len(),
                found: script_types.len(),
            });
        }
        for (input, script_type) in self.inputs.iter_mut().zip(script_types) {
            input.finalize(*script_type)?;
        }
        Ok(())
    }

    /// Produces the signed transaction out of a fully finalized PSBT.
    ///
    /// The transaction is rejected unless its fee covers at least one satoshi
    /// per virtual byte.
    pub fn extract(&self) -> Result<Tx, ExtractError> {
        let mut tx = Tx::from(self.to_unsigned_tx());
        let mut input_sum = Sats::ZERO;
        for (input, txin) in self.inputs.iter().zip(&mut tx.inputs) {
            if !input.is_finalized() {
                return Err(ExtractError::NotFinalized(input.index));
            }
            let value = input.value().ok_or(ExtractError::NoPrevout(input.index))?;
            input_sum = input_sum.checked_add(value).ok_or(ExtractError::AmountOverflow)?;
            txin.sig_script = input.final_script_sig.clone().unwrap_or_default();
            txin.witness = input.final_witness.clone().unwrap_or_default();
        }

        let output_sum = self.output_sum().ok_or(ExtractError::AmountOverflow)?;
        let fee = input_sum.checked_sub(output_sum).ok_or(ExtractError::Overspend {
            input: input_sum,
            output: output_sum,
        })?;
        let vsize = tx.vsize();
        log::debug!("extracted transaction {} of {vsize} vbytes paying {fee} sats", tx.txid());
        if fee.sats() < vsize as u64 {
            return Err(ExtractError::InsufficientFee { fee, vsize });
        }
        Ok(tx)
    }
}
