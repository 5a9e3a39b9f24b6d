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

use std::fmt::{self, Debug, Display, Formatter};
use std::io::{Read, Write};
use std::str::FromStr;

use amplify::hex::{self, FromHex, ToHex};
use amplify::{IoError, Wrapper};

use crate::hashes::sha256d;
use crate::{
    ConsensusDataError, ConsensusDecode, ConsensusDecodeError, ConsensusEncode, Sats, ScriptPubkey,
    SigScript, VarInt,
};

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum TxidParseError {
    #[from]
    Hex(hex::Error),
}

/// Transaction id. Stored in wire (little-endian) byte order; displayed reversed.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
pub struct Txid([u8; 32]);

impl Txid {
    pub const fn from_byte_array(bytes: [u8; 32]) -> Self { Txid(bytes) }
    pub const fn to_byte_array(&self) -> [u8; 32] { self.0 }

    /// Computes txid from the non-witness transaction serialization.
    pub fn from_tx_bytes(bytes: impl AsRef<[u8]>) -> Self { Txid(sha256d(bytes)) }
}

impl Display for Txid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut bytes = self.0;
        bytes.reverse();
        f.write_str(&bytes.to_hex())
    }
}

impl Debug for Txid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { write!(f, "Txid({self})") }
}

impl FromStr for Txid {
    type Err = TxidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = <[u8; 32]>::from_hex(s)?;
        bytes.reverse();
        Ok(Txid(bytes))
    }
}

#[cfg(feature = "serde")]
mod _serde {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::*;

    impl Serialize for Txid {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for Txid {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            Txid::from_str(&s).map_err(D::Error::custom)
        }
    }
}

#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct Vout(u32);

impl Vout {
    pub const fn from_u32(vout: u32) -> Self { Vout(vout) }
    pub const fn to_u32(&self) -> u32 { self.0 }
    pub const fn to_usize(&self) -> usize { self.0 as usize }
}

#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From)]
#[wrapper(Deref, Display, LowerHex)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct SeqNo(u32);

impl Default for SeqNo {
    fn default() -> Self { SeqNo::FINAL }
}

impl SeqNo {
    pub const FINAL: SeqNo = SeqNo(0xFFFF_FFFF);
    /// Highest sequence number which signals replace-by-fee.
    pub const RBF: SeqNo = SeqNo(0xFFFF_FFFD);

    pub const fn from_consensus_u32(seq: u32) -> Self { SeqNo(seq) }
    pub const fn to_consensus_u32(&self) -> u32 { self.0 }
}

#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct LockTime(u32);

impl LockTime {
    pub const ZERO: LockTime = LockTime(0);

    pub const fn from_consensus_u32(lock_time: u32) -> Self { LockTime(lock_time) }
    pub const fn to_consensus_u32(&self) -> u32 { self.0 }
}

#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From)]
#[wrapper(Deref, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct TxVer(i32);

impl Default for TxVer {
    fn default() -> Self { TxVer::V2 }
}

impl TxVer {
    pub const V1: Self = TxVer(1);
    pub const V2: Self = TxVer(2);

    pub const fn from_consensus_i32(ver: i32) -> Self { TxVer(ver) }
    pub const fn to_consensus_i32(&self) -> i32 { self.0 }
}

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display("{txid}:{vout}")]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct Outpoint {
    pub txid: Txid,
    pub vout: Vout,
}

impl Outpoint {
    pub fn new(txid: Txid, vout: impl Into<Vout>) -> Self {
        Outpoint {
            txid,
            vout: vout.into(),
        }
    }
}

/// Witness stack of a transaction input.
#[derive(Wrapper, WrapperMut, Clone, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct Witness(Vec<Vec<u8>>);

impl Witness {
    pub fn new() -> Self { Self::default() }

    pub fn from_consensus_stack(stack: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Witness(stack.into_iter().collect())
    }

    pub fn push(&mut self, item: impl Into<Vec<u8>>) { self.0.push(item.into()) }

    pub fn serialized_len(&self) -> usize {
        VarInt::with(self.0.len()).len()
            + self.0.iter().map(|item| VarInt::with(item.len()).len() + item.len()).sum::<usize>()
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct TxIn {
    pub prev_output: Outpoint,
    pub sig_script: SigScript,
    pub sequence: SeqNo,
    pub witness: Witness,
}

impl TxIn {
    /// Input with empty scriptSig and witness, as used in unsigned transactions.
    pub fn unsigned(prev_output: Outpoint, sequence: SeqNo) -> Self {
        TxIn {
            prev_output,
            sig_script: none!(),
            sequence,
            witness: none!(),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct TxOut {
    pub value: Sats,
    pub script_pubkey: ScriptPubkey,
}

impl TxOut {
    pub fn new(script_pubkey: impl Into<ScriptPubkey>, value: impl Into<Sats>) -> Self {
        TxOut {
            script_pubkey: script_pubkey.into(),
            value: value.into(),
        }
    }

    /// Length of the serialized output.
    pub fn serialized_len(&self) -> usize {
        8 + VarInt::with(self.script_pubkey.len()).len() + self.script_pubkey.len()
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct Tx {
    pub version: TxVer,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: LockTime,
}

impl Tx {
    /// Whether any of the inputs carries witness data, requiring the extended
    /// serialization form.
    pub fn is_segwit(&self) -> bool { self.inputs.iter().any(|txin| !txin.witness.is_empty()) }

    pub fn txid(&self) -> Txid {
        let mut buf = Vec::with_capacity(self.base_size());
        self.encode_with(&mut buf, false).expect("in-memory encoding can't error");
        Txid::from_tx_bytes(buf)
    }

    /// Witness txid; equals [`Tx::txid`] for transactions without witness data.
    pub fn wtxid(&self) -> Txid { Txid::from_tx_bytes(self.consensus_serialize()) }

    /// Size of the serialization without witness data.
    pub fn base_size(&self) -> usize {
        let mut counter = 4 + 4;
        counter += VarInt::with(self.inputs.len()).len();
        counter += self
            .inputs
            .iter()
            .map(|txin| {
                36 + VarInt::with(txin.sig_script.len()).len() + txin.sig_script.len() + 4
            })
            .sum::<usize>();
        counter += VarInt::with(self.outputs.len()).len();
        counter += self.outputs.iter().map(TxOut::serialized_len).sum::<usize>();
        counter
    }

    /// Size of the full serialization, including segwit marker, flag and witnesses.
    pub fn total_size(&self) -> usize {
        if !self.is_segwit() {
            return self.base_size();
        }
        self.base_size()
            + 2
            + self.inputs.iter().map(|txin| txin.witness.serialized_len()).sum::<usize>()
    }

    pub fn weight(&self) -> usize { self.base_size() * 3 + self.total_size() }

    pub fn vsize(&self) -> usize { (self.weight() + 3) / 4 }

    /// Copy of the transaction with all scriptSigs and witnesses removed.
    pub fn to_unsigned(&self) -> Tx {
        let mut tx = self.clone();
        for txin in &mut tx.inputs {
            txin.sig_script = none!();
            txin.witness = none!();
        }
        tx
    }

    pub(crate) fn encode_with(
        &self,
        writer: &mut impl Write,
        segwit: bool,
    ) -> Result<usize, IoError> {
        let mut counter = self.version.to_consensus_i32().consensus_encode(writer)?;
        if segwit {
            counter += 0x00u8.consensus_encode(writer)?;
            counter += 0x01u8.consensus_encode(writer)?;
        }
        counter += VarInt::with(self.inputs.len()).consensus_encode(writer)?;
        for txin in &self.inputs {
            counter += txin.consensus_encode(writer)?;
        }
        counter += VarInt::with(self.outputs.len()).consensus_encode(writer)?;
        for txout in &self.outputs {
            counter += txout.consensus_encode(writer)?;
        }
        if segwit {
            for txin in &self.inputs {
                counter += txin.witness.as_inner().consensus_encode(writer)?;
            }
        }
        counter += self.lock_time.to_consensus_u32().consensus_encode(writer)?;
        Ok(counter)
    }
}

impl Display for Tx {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.consensus_serialize().to_hex())
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum TxParseError {
    #[from]
    Hex(hex::Error),
    #[from]
    Consensus(ConsensusDecodeError),
}

impl FromStr for Tx {
    type Err = TxParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Vec::<u8>::from_hex(s)?;
        Tx::consensus_deserialize(bytes).map_err(TxParseError::from)
    }
}

impl ConsensusEncode for Outpoint {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let counter = self.txid.to_byte_array().consensus_encode(writer)?;
        Ok(counter + self.vout.to_u32().consensus_encode(writer)?)
    }
}

impl ConsensusDecode for Outpoint {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let txid = Txid(<[u8; 32]>::consensus_decode(reader)?);
        let vout = Vout(u32::consensus_decode(reader)?);
        Ok(Outpoint { txid, vout })
    }
}

/// Encodes the non-witness part of the input.
impl ConsensusEncode for TxIn {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = self.prev_output.consensus_encode(writer)?;
        counter += self.sig_script.consensus_encode(writer)?;
        counter += self.sequence.to_consensus_u32().consensus_encode(writer)?;
        Ok(counter)
    }
}

impl ConsensusDecode for TxIn {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let prev_output = Outpoint::consensus_decode(reader)?;
        let sig_script = SigScript::consensus_decode(reader)?;
        let sequence = SeqNo(u32::consensus_decode(reader)?);
        Ok(TxIn {
            prev_output,
            sig_script,
            sequence,
            witness: none!(),
        })
    }
}

impl ConsensusEncode for TxOut {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let counter = self.value.consensus_encode(writer)?;
        Ok(counter + self.script_pubkey.consensus_encode(writer)?)
    }
}

impl ConsensusDecode for TxOut {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let value = Sats::consensus_decode(reader)?;
        let script_pubkey = ScriptPubkey::consensus_decode(reader)?;
        Ok(TxOut {
            value,
            script_pubkey,
        })
    }
}

impl ConsensusEncode for Tx {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.encode_with(writer, self.is_segwit())
    }
}

impl ConsensusDecode for Tx {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let version = TxVer(i32::consensus_decode(reader)?);
        let mut count = VarInt::consensus_decode(reader)?.to_usize();
        let segwit = count == 0;
        if segwit {
            let flag = u8::consensus_decode(reader)?;
            if flag != 0x01 {
                return Err(ConsensusDataError::InvalidSegwitFlag(flag).into());
            }
            count = VarInt::consensus_decode(reader)?.to_usize();
        }
        let mut inputs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            inputs.push(TxIn::consensus_decode(reader)?);
        }
        let count = VarInt::consensus_decode(reader)?.to_usize();
        let mut outputs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            outputs.push(TxOut::consensus_decode(reader)?);
        }
        if segwit {
            for txin in &mut inputs {
                txin.witness = Witness(Vec::<Vec<u8>>::consensus_decode(reader)?);
            }
            if inputs.iter().all(|txin| txin.witness.is_empty()) {
                return Err(ConsensusDataError::EmptyWitness.into());
            }
        }
        let lock_time = LockTime(u32::consensus_decode(reader)?);
        Ok(Tx {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}
