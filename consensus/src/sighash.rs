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

//! Signing payloads for the three signature hash algorithms: legacy
//! whole-transaction copy, BIP-143 segwit v0 and BIP-341 taproot.
//!
//! The payloads returned here are the full preimages. ECDSA signers hash them
//! with the coin digest (see [`crate::DigestAlgo`]); taproot signers use
//! [`TapSighash::from_sig_msg`].

use std::fmt::{self, Display, Formatter};

use amplify::hex::ToHex;

use crate::hashes::{sha256, sha256d, tagged_hash};
use crate::{
    ConsensusEncode, Sats, ScriptBytes, SeqNo, SighashFlag, SighashType, Tx, TxIn, TxOut,
};

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum SighashError {
    /// input index {index} is out of bounds for a transaction with {inputs} inputs.
    InvalidInputIndex { inputs: usize, index: usize },

    /// input {0} is signed with SIGHASH_SINGLE, but the transaction has no output with the
    /// same index.
    NoSingleOutputMatch(usize),

    /// taproot signing requires all {inputs} previous outputs, but {prevouts} were provided.
    PrevoutsMismatch { prevouts: usize, inputs: usize },

    /// sighash type {0:#04x} is invalid for taproot signatures.
    InvalidTaprootSighash(u8),
}

/// BIP-341 signature hash: tagged hash of the taproot signing message.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
pub struct TapSighash([u8; 32]);

impl TapSighash {
    pub fn from_sig_msg(sig_msg: impl AsRef<[u8]>) -> Self {
        TapSighash(tagged_hash("TapSighash", &[sig_msg.as_ref()]))
    }

    pub const fn to_byte_array(&self) -> [u8; 32] { self.0 }
}

impl Display for TapSighash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

/// Computes signing payloads over an immutable transaction. The borrow guarantees
/// that the transaction can't change while payloads are derived.
#[derive(Clone, Debug)]
pub struct SighashCache<'tx> {
    tx: &'tx Tx,
    prevouts: Vec<TxOut>,
}

fn encode_to_vec(data: &impl ConsensusEncode, buf: &mut Vec<u8>) {
    data.consensus_encode(buf).expect("in-memory encoding can't error");
}

impl<'tx> SighashCache<'tx> {
    /// Cache usable for legacy and segwit v0 payloads, which take the spent output
    /// data as arguments.
    pub fn new(tx: &'tx Tx) -> Self {
        SighashCache {
            tx,
            prevouts: vec![],
        }
    }

    /// Cache with all spent outputs, as required for taproot payloads.
    pub fn with_prevouts(tx: &'tx Tx, prevouts: Vec<TxOut>) -> Result<Self, SighashError> {
        if prevouts.len() != tx.inputs.len() {
            return Err(SighashError::PrevoutsMismatch {
                prevouts: prevouts.len(),
                inputs: tx.inputs.len(),
            });
        }
        Ok(SighashCache { tx, prevouts })
    }

    pub fn tx(&self) -> &'tx Tx { self.tx }

    fn check_index(&self, index: usize) -> Result<&'tx TxIn, SighashError> {
        self.tx.inputs.get(index).ok_or(SighashError::InvalidInputIndex {
            inputs: self.tx.inputs.len(),
            index,
        })
    }

    /// Legacy payload: modified transaction copy followed by the 4-byte hash type.
    pub fn legacy_preimage(
        &self,
        index: usize,
        prev_script: &ScriptBytes,
        sighash_type: SighashType,
    ) -> Result<Vec<u8>, SighashError> {
        self.check_index(index)?;
        if sighash_type.flag == SighashFlag::Single && index >= self.tx.outputs.len() {
            return Err(SighashError::NoSingleOutputMatch(index));
        }

        let script = prev_script.remove_codeseparators();
        let zero_others = sighash_type.flag != SighashFlag::All;
        let inputs = self
            .tx
            .inputs
            .iter()
            .enumerate()
            .filter(|(no, _)| !sighash_type.anyone_can_pay || *no == index)
            .map(|(no, txin)| {
                let mut txin = TxIn::unsigned(txin.prev_output, txin.sequence);
                if no == index {
                    txin.sig_script = script.clone().into();
                } else if zero_others {
                    txin.sequence = SeqNo::from_consensus_u32(0);
                }
                txin
            })
            .collect();
        let outputs = match sighash_type.flag {
            SighashFlag::All => self.tx.outputs.clone(),
            SighashFlag::None => vec![],
            SighashFlag::Single => self.tx.outputs[..=index]
                .iter()
                .enumerate()
                .map(|(no, txout)| match no == index {
                    true => txout.clone(),
                    false => TxOut::new(ScriptBytes::new(), u64::MAX),
                })
                .collect(),
        };
        let tx = Tx {
            version: self.tx.version,
            inputs,
            outputs,
            lock_time: self.tx.lock_time,
        };

        let mut buf = Vec::with_capacity(tx.base_size() + 4);
        tx.encode_with(&mut buf, false).expect("in-memory encoding can't error");
        encode_to_vec(&sighash_type.to_consensus_u32(), &mut buf);
        Ok(buf)
    }

    /// BIP-143 payload. `script_code` is written with its length prefix.
    pub fn segwit_v0_preimage(
        &self,
        index: usize,
        script_code: &ScriptBytes,
        value: Sats,
        sighash_type: SighashType,
    ) -> Result<Vec<u8>, SighashError> {
        let txin = self.check_index(index)?;
        let tx = self.tx;

        let mut hash_prevouts = [0u8; 32];
        let mut hash_sequence = [0u8; 32];
        let mut hash_outputs = [0u8; 32];

        if !sighash_type.anyone_can_pay {
            hash_prevouts = sha256d(self.prevouts_data());
            if sighash_type.flag == SighashFlag::All {
                hash_sequence = sha256d(self.sequences_data());
            }
        }
        match sighash_type.flag {
            SighashFlag::All => hash_outputs = sha256d(self.outputs_data()),
            SighashFlag::Single if index < tx.outputs.len() => {
                hash_outputs = sha256d(tx.outputs[index].consensus_serialize())
            }
            _ => {}
        }

        let mut buf = Vec::with_capacity(156 + script_code.len());
        encode_to_vec(&tx.version.to_consensus_i32(), &mut buf);
        buf.extend(hash_prevouts);
        buf.extend(hash_sequence);
        encode_to_vec(&txin.prev_output, &mut buf);
        encode_to_vec(script_code, &mut buf);
        encode_to_vec(&value, &mut buf);
        encode_to_vec(&txin.sequence.to_consensus_u32(), &mut buf);
        buf.extend(hash_outputs);
        encode_to_vec(&tx.lock_time.to_consensus_u32(), &mut buf);
        encode_to_vec(&sighash_type.to_consensus_u32(), &mut buf);
        Ok(buf)
    }

    /// BIP-341 signature message, including the leading epoch byte. `None` sighash
    /// type stands for the implicit default (`0x00`).
    pub fn taproot_preimage(
        &self,
        index: usize,
        sighash_type: Option<SighashType>,
        leaf_hash: Option<[u8; 32]>,
        annex: Option<&[u8]>,
    ) -> Result<Vec<u8>, SighashError> {
        let txin = self.check_index(index)?;
        let tx = self.tx;
        if self.prevouts.len() != tx.inputs.len() {
            return Err(SighashError::PrevoutsMismatch {
                prevouts: self.prevouts.len(),
                inputs: tx.inputs.len(),
            });
        }

        let hash_type = sighash_type.map(SighashType::to_u8).unwrap_or_default();
        if !matches!(hash_type, 0x00..=0x03 | 0x81..=0x83) {
            return Err(SighashError::InvalidTaprootSighash(hash_type));
        }
        let (flag, anyone_can_pay) = sighash_type
            .map(|ty| (ty.flag, ty.anyone_can_pay))
            .unwrap_or((SighashFlag::All, false));
        if flag == SighashFlag::Single && index >= tx.outputs.len() {
            return Err(SighashError::NoSingleOutputMatch(index));
        }

        let mut buf = Vec::with_capacity(256);
        buf.push(0x00);
        buf.push(hash_type);
        encode_to_vec(&tx.version.to_consensus_i32(), &mut buf);
        encode_to_vec(&tx.lock_time.to_consensus_u32(), &mut buf);

        if !anyone_can_pay {
            buf.extend(sha256(self.prevouts_data()));
            let mut amounts = Vec::with_capacity(self.prevouts.len() * 8);
            let mut scripts = Vec::new();
            for prevout in &self.prevouts {
                encode_to_vec(&prevout.value, &mut amounts);
                encode_to_vec(&prevout.script_pubkey, &mut scripts);
            }
            buf.extend(sha256(amounts));
            buf.extend(sha256(scripts));
            buf.extend(sha256(self.sequences_data()));
        }
        if flag == SighashFlag::All {
            buf.extend(sha256(self.outputs_data()));
        }

        let spend_type = ((leaf_hash.is_some() as u8) << 1) | annex.is_some() as u8;
        buf.push(spend_type);

        if anyone_can_pay {
            let prevout = &self.prevouts[index];
            encode_to_vec(&txin.prev_output, &mut buf);
            encode_to_vec(&prevout.value, &mut buf);
            encode_to_vec(&prevout.script_pubkey, &mut buf);
            encode_to_vec(&txin.sequence.to_consensus_u32(), &mut buf);
        } else {
            encode_to_vec(&(index as u32), &mut buf);
        }

        if let Some(annex) = annex {
            let mut data = Vec::with_capacity(annex.len() + 9);
            encode_to_vec(&annex.to_vec(), &mut data);
            buf.extend(sha256(data));
        }

        if flag == SighashFlag::Single {
            buf.extend(sha256(tx.outputs[index].consensus_serialize()));
        }

        if let Some(leaf_hash) = leaf_hash {
            buf.extend(leaf_hash);
            buf.push(0x00);
            encode_to_vec(&u32::MAX, &mut buf);
        }

        Ok(buf)
    }

    fn prevouts_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.tx.inputs.len() * 36);
        for txin in &self.tx.inputs {
            encode_to_vec(&txin.prev_output, &mut data);
        }
        data
    }

    fn sequences_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.tx.inputs.len() * 4);
        for txin in &self.tx.inputs {
            encode_to_vec(&txin.sequence.to_consensus_u32(), &mut data);
        }
        data
    }

    fn outputs_data(&self) -> Vec<u8> {
        let mut data = vec![];
        for txout in &self.tx.outputs {
            encode_to_vec(txout, &mut data);
        }
        data
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use amplify::hex::FromHex;

    use super::*;
    use crate::ConsensusDecode;

    const BIP143_P2WPKH: &str = "0100000002fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f0000000000eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac11000000";
    const BIP143_P2SH_P2WPKH: &str = "0100000001db6b1b20aa0fd7b23880be2ecbd4a98130974cf4748fb66092ac4d3ceb1a54770100000000feffffff02b8b4eb0b000000001976a914a457b684d7f0d539a46a45bbc043f35b59d0d96388ac0008af2f000000001976a914fd270b1ee6abcaea97fea7ad0402e8bd8ad6d77c88ac92040000";

    fn script(hex: &str) -> ScriptBytes { ScriptBytes::from(Vec::<u8>::from_hex(hex).unwrap()) }

    #[test]
    fn bip143_native_p2wpkh() {
        let tx = Tx::from_str(BIP143_P2WPKH).unwrap();
        let cache = SighashCache::new(&tx);
        let preimage = cache
            .segwit_v0_preimage(
                1,
                &script("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac"),
                Sats::from_sats(600000000),
                SighashType::all(),
            )
            .unwrap();
        assert_eq!(
            sha256d(&preimage).to_hex(),
            "c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670"
        );
        let again = cache
            .segwit_v0_preimage(
                1,
                &script("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac"),
                Sats::from_sats(600000000),
                SighashType::all(),
            )
            .unwrap();
        assert_eq!(preimage, again);
    }

    #[test]
    fn bip143_p2sh_p2wpkh() {
        let tx = Tx::from_str(BIP143_P2SH_P2WPKH).unwrap();
        let preimage = SighashCache::new(&tx)
            .segwit_v0_preimage(
                0,
                &script("76a91479091972186c449eb1ded22b78e40d009bdf008988ac"),
                Sats::from_sats(1000000000),
                SighashType::all(),
            )
            .unwrap();
        assert_eq!(
            sha256d(&preimage).to_hex(),
            "64f3b0f4dd2bb3aa1ce8566d220cc74dda9df97d8490cc81d89d735c92e59fb6"
        );
    }

    #[test]
    fn segwit_forkid_type() {
        let tx = Tx::from_str(BIP143_P2SH_P2WPKH).unwrap();
        let preimage = SighashCache::new(&tx)
            .segwit_v0_preimage(
                0,
                &script("76a91479091972186c449eb1ded22b78e40d009bdf008988ac"),
                Sats::from_sats(1000000000),
                SighashType::all().with_fork_id(79),
            )
            .unwrap();
        assert_eq!(&preimage[preimage.len() - 4..], &[0x41, 0x4f, 0x00, 0x00]);
    }

    fn legacy_copy(preimage: &[u8]) -> (Tx, u32) {
        let (tx, ty) = preimage.split_at(preimage.len() - 4);
        let tx = Tx::consensus_deserialize(tx).unwrap();
        (tx, u32::from_le_bytes([ty[0], ty[1], ty[2], ty[3]]))
    }

    #[test]
    fn legacy_modes() {
        let tx = Tx::from_str(BIP143_P2WPKH).unwrap();
        let cache = SighashCache::new(&tx);
        let prev = script("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac");

        let (copy, ty) = legacy_copy(&cache.legacy_preimage(1, &prev, SighashType::all()).unwrap());
        assert_eq!(ty, 1);
        assert_eq!(copy.outputs, tx.outputs);
        assert!(copy.inputs[0].sig_script.is_empty());
        assert_eq!(copy.inputs[1].sig_script.as_slice(), prev.as_slice());
        assert_eq!(copy.inputs[0].sequence, tx.inputs[0].sequence);

        let (copy, _) = legacy_copy(&cache.legacy_preimage(1, &prev, SighashType::none()).unwrap());
        assert!(copy.outputs.is_empty());
        assert_eq!(copy.inputs[0].sequence, SeqNo::from_consensus_u32(0));
        assert_eq!(copy.inputs[1].sequence, tx.inputs[1].sequence);

        let (copy, _) =
            legacy_copy(&cache.legacy_preimage(1, &prev, SighashType::single()).unwrap());
        assert_eq!(copy.outputs.len(), 2);
        assert_eq!(copy.outputs[0].value, Sats::from_sats(u64::MAX));
        assert!(copy.outputs[0].script_pubkey.is_empty());
        assert_eq!(copy.outputs[1], tx.outputs[1]);

        let ty = SighashType::all().with_anyone_can_pay();
        let (copy, ty) = legacy_copy(&cache.legacy_preimage(1, &prev, ty).unwrap());
        assert_eq!(ty, 0x81);
        assert_eq!(copy.inputs.len(), 1);
        assert_eq!(copy.inputs[0].prev_output, tx.inputs[1].prev_output);
    }

    #[test]
    fn legacy_digests() {
        let tx = Tx::from_str(BIP143_P2WPKH).unwrap();
        let cache = SighashCache::new(&tx);
        let prev = script("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac");

        let none = SighashType::none();
        let single = SighashType::single();
        let vectors = [
            (0, SighashType::all(), "47194bc3c303a30aa5f78e45c7c2980b3be1284a9d69b1ea9ec0d29aac5f6848"),
            (0, none, "2a6d4d3c2595153b3d89b15cc32d3c5082326e06aebbe56652eb94817ff6355b"),
            (0, single, "0d8ad17ba098be7eaf7efff778bb22e234805b5d370c996271a7f5ff7416f263"),
            (
                0,
                SighashType::all().with_anyone_can_pay(),
                "4e7de48ff097d47bb87912759ec9380049a160289f2b89d48a28887ee30a41d4",
            ),
            (
                0,
                none.with_anyone_can_pay(),
                "a1729e3c703f9b7e725c36d21390bade1dc9862ebbdb725919a944dd176ab23b",
            ),
            (
                0,
                single.with_anyone_can_pay(),
                "65ac1a54d06cfaf766c915d6b86b4852287e0b7ffd52994130fa941335c249c7",
            ),
            (1, SighashType::all(), "c46030820cbc48402a47cc5b5d3d41648f4e3a711f56b804d601d09dc112a6a4"),
            (1, none, "ffbbcf554debe55f76a79db7d205edc891f194184a93a660366bb8f7facb89e2"),
            (1, single, "33cd468bd6b82f04bcef180b748c521d6fdee3b11711a2f27b2e465915afaec2"),
            (
                1,
                SighashType::all().with_anyone_can_pay(),
                "8cfeea8cfe3a35332ec31f53900716682d964e0c16372b1f7689ed93f3a40756",
            ),
            (
                1,
                none.with_anyone_can_pay(),
                "bd8ca4cb1ab60a8db8451bd58bc068a9abd5ea20a08029b38934c9d50c1d6721",
            ),
            (
                1,
                single.with_anyone_can_pay(),
                "865c7791b88917498a4c402176c302f146c53a6c2f50ecda08548f515237dca6",
            ),
        ];
        for (index, ty, digest) in vectors {
            let preimage = cache.legacy_preimage(index, &prev, ty).unwrap();
            assert_eq!(sha256d(&preimage).to_hex(), digest, "input {index}, type {ty:?}");
        }
    }

    #[test]
    fn legacy_p2pk_signature() {
        // first input of the BIP-143 example is a signed P2PK spend
        let tx = Tx::from_str(BIP143_P2WPKH).unwrap();
        let pk = "03c9f4836b9a4f77fc0d81f7bcb01b7f1b35916864b9476c241ce9fc198bd25432";
        let preimage = SighashCache::new(&tx)
            .legacy_preimage(0, &script(&format!("21{pk}ac")), SighashType::all())
            .unwrap();
        let digest = sha256d(&preimage);
        assert_eq!(
            digest.to_hex(),
            "63cec688ee06a91e913875356dd4dea2f8e0f2a2659885372da2a37e32c7532e"
        );

        let sig = Vec::<u8>::from_hex(
            "30450221008b9d1dc26ba6a9cb62127b02742fa9d754cd3bebf337f7a55d114c8e5cdd30be022040529b194ba3f9281a99f2b1c0a19c0489bc22ede944ccf4ecbab4cc618ef3ed",
        )
        .unwrap();
        let sig = secp256k1::ecdsa::Signature::from_der(&sig).unwrap();
        let pk = secp256k1::PublicKey::from_slice(&Vec::<u8>::from_hex(pk).unwrap()).unwrap();
        let msg = secp256k1::Message::from_digest(digest);
        assert!(secp256k1::SECP256K1.verify_ecdsa(&msg, &sig, &pk).is_ok());
    }

    #[test]
    fn legacy_single_without_output() {
        let mut tx = Tx::from_str(BIP143_P2WPKH).unwrap();
        tx.outputs.truncate(1);
        let cache = SighashCache::new(&tx);
        assert_eq!(
            cache.legacy_preimage(1, &ScriptBytes::new(), SighashType::single()),
            Err(SighashError::NoSingleOutputMatch(1))
        );
        assert_eq!(
            cache.legacy_preimage(2, &ScriptBytes::new(), SighashType::all()),
            Err(SighashError::InvalidInputIndex {
                inputs: 2,
                index: 2
            })
        );
    }

    fn taproot_fixture() -> (Tx, Vec<TxOut>) {
        let tx = Tx::from_str(BIP143_P2WPKH).unwrap();
        let prevouts = vec![
            TxOut::new(crate::ScriptPubkey::p2tr([1u8; 32]), 10_000u64),
            TxOut::new(crate::ScriptPubkey::p2tr([2u8; 32]), 20_000u64),
        ];
        (tx, prevouts)
    }

    #[test]
    fn taproot_message_layout() {
        let (tx, prevouts) = taproot_fixture();
        let cache = SighashCache::with_prevouts(&tx, prevouts.clone()).unwrap();

        let msg = cache.taproot_preimage(0, None, None, None).unwrap();
        assert_eq!(msg.len(), 1 + 174);
        assert_eq!(&msg[..2], &[0x00, 0x00]);
        assert_eq!(msg[10 + 160], 0x00);

        let msg = cache.taproot_preimage(1, Some(SighashType::all()), None, Some(&[0x50])).unwrap();
        assert_eq!(msg[1], 0x01);
        assert_eq!(msg.len(), 1 + 174 + 32);
        assert_eq!(msg[10 + 160], 0x01);

        let acp = SighashType::none().with_anyone_can_pay();
        let msg = cache.taproot_preimage(0, Some(acp), Some([7u8; 32]), None).unwrap();
        assert_eq!(msg.len(), 1 + 174 - 49 - 32 + 37);
        assert_eq!(&msg[msg.len() - 37..msg.len() - 5], &[7u8; 32]);
        assert_eq!(&msg[msg.len() - 5..], &[0x00, 0xff, 0xff, 0xff, 0xff]);

        let msg = cache.taproot_preimage(1, Some(SighashType::single()), None, None).unwrap();
        assert_eq!(msg.len(), 1 + 174);
    }

    #[test]
    fn taproot_commits_to_prevouts() {
        let (tx, mut prevouts) = taproot_fixture();
        let cache = SighashCache::with_prevouts(&tx, prevouts.clone()).unwrap();
        let first = TapSighash::from_sig_msg(cache.taproot_preimage(0, None, None, None).unwrap());

        prevouts[1].value = Sats::from_sats(20_001);
        let cache = SighashCache::with_prevouts(&tx, prevouts).unwrap();
        let second = TapSighash::from_sig_msg(cache.taproot_preimage(0, None, None, None).unwrap());
        assert_ne!(first, second);
    }

    #[test]
    fn taproot_errors() {
        let (tx, prevouts) = taproot_fixture();
        assert_eq!(
            SighashCache::with_prevouts(&tx, prevouts[..1].to_vec()).unwrap_err(),
            SighashError::PrevoutsMismatch {
                prevouts: 1,
                inputs: 2
            }
        );
        let cache = SighashCache::with_prevouts(&tx, prevouts).unwrap();
        assert_eq!(
            cache.taproot_preimage(0, Some(SighashType::all().with_fork_id(0)), None, None),
            Err(SighashError::InvalidTaprootSighash(0x41))
        );
        let mut short = tx.clone();
        short.outputs.truncate(1);
        let cache = SighashCache::with_prevouts(&short, vec![TxOut::new(ScriptBytes::new(), 1u64); 2])
            .unwrap();
        assert_eq!(
            cache.taproot_preimage(1, Some(SighashType::single()), None, None),
            Err(SighashError::NoSingleOutputMatch(1))
        );
        let legacy_only = SighashCache::new(&tx);
        assert!(matches!(
            legacy_only.taproot_preimage(0, None, None, None),
            Err(SighashError::PrevoutsMismatch { .. })
        ));
    }
}
