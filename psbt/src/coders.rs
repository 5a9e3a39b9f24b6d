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

use std::io::{self, Cursor, Read, Write};

use amplify::{IoError, Wrapper};
use bc::{
    Bip340Sig, ConsensusDataError, ConsensusDecode, ConsensusDecodeError, ConsensusEncode,
    InvalidPubkey, LegacyPk, LegacySig, NonStandardSighashType, Outpoint, RedeemScript, SeqNo,
    SigError, SigScript, SighashType, Tx, TxOut, TxVer, VarInt, Witness, WitnessScript, XOnlyPk,
    ScriptPubkey, LockTime,
};
use derive::{DerivationIndex, DerivationPath, Fingerprint, KeyOrigin};

use crate::keys::KeyValue;
use crate::{
    ByteStr, ControlBlock, KeyData, KeyMap, KeyPair, KeyType, LeafScript, Map, MapName, PropKey,
    Psbt, RawXpub, TapDerivation, TapLeaf, TapTree, UnsignedTx, UnsignedTxIn, ValueData,
};

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum DecodeError {
    #[from]
    #[from(io::Error)]
    Io(IoError),

    #[from]
    #[from(ConsensusDataError)]
    #[from(NonStandardSighashType)]
    #[from(SigError)]
    #[from(InvalidPubkey)]
    Psbt(PsbtError),
}

impl From<ConsensusDecodeError> for DecodeError {
    fn from(e: ConsensusDecodeError) -> Self {
        match e {
            ConsensusDecodeError::Io(e) => DecodeError::Io(e),
            ConsensusDecodeError::Data(data) => data.into(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PsbtError {
    /// unexpected end of data.
    UnexpectedEod,

    /// PSBT data are followed by some excessive bytes.
    DataNotConsumed,

    /// invalid magic bytes {0:02x?}.
    InvalidMagic([u8; 5]),

    /// {0} map key {1:#04x} must not contain additional key data {2}.
    NonEmptyKeyData(MapName, u8, KeyData),

    /// repeated {0} map key {1:#04x}.
    RepeatedKey(MapName, u8),

    /// repeated proprietary {0} map key {1}.
    RepeatedPropKey(MapName, PropKey),

    /// repeated unknown {0} map key {1:#04x}.
    RepeatedUnknownKey(MapName, u8),

    /// {0} map doesn't contain required key {1:#04x}.
    RequiredKeyAbsent(MapName, u8),

    /// {0} map field {1:#04x} has invalid length {2}.
    InvalidFieldLength(MapName, u8, usize),

    /// PSBT version {0} is not supported; only version 0 can be processed.
    UnsupportedVersion(u32),

    /// explicit {what} count {found} doesn't match {expected} items of the unsigned
    /// transaction.
    CountMismatch {
        what: MapName,
        expected: usize,
        found: usize,
    },

    /// input {0} of the unsigned transaction has a non-empty scriptSig.
    UnsignedTxHasScripts(usize),

    /// non-witness UTXO of input {0} doesn't match the transaction id of the spent outpoint.
    NonWitnessUtxoMismatch(usize),

    /// non-witness UTXO of input {0} doesn't contain the spent output.
    NonWitnessUtxoNoOutput(usize),

    /// key origin data have invalid length {0}.
    InvalidKeyOrigin(usize),

    /// taproot control block has invalid length {0}.
    InvalidControlBlock(usize),

    /// taproot leaf script data are empty.
    EmptyLeafScript,

    /// invalid taproot tree data.
    InvalidTapTree,

    #[from]
    #[display(inner)]
    InvalidPubkey(InvalidPubkey),

    #[from]
    #[display(inner)]
    InvalidSig(SigError),

    #[from]
    #[display(inner)]
    InvalidSighash(NonStandardSighashType),

    #[from]
    #[display(inner)]
    Consensus(ConsensusDataError),
}

impl From<DecodeError> for PsbtError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Psbt(e) => e,
            DecodeError::Io(_) => PsbtError::UnexpectedEod,
        }
    }
}

pub trait Encode {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError>;
}

impl<'a, T: Encode> Encode for &'a T {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> { (*self).encode(writer) }
}

/// PSBT field coding. Unlike the consensus coding, a field value takes all the
/// data up to the end of the field, so variable-length values carry no length
/// prefix.
pub trait Decode: Sized {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError>;

    /// Decodes the complete field; unread bytes left are an error.
    fn deserialize(data: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        let mut cursor = Cursor::new(data.as_ref());
        let value = Self::decode(&mut cursor)?;
        match cursor.position() as usize == cursor.get_ref().len() {
            true => Ok(value),
            false => Err(PsbtError::DataNotConsumed),
        }
    }
}

fn read_to_end(reader: &mut impl Read) -> Result<Vec<u8>, DecodeError> {
    let mut data = vec![];
    reader.read_to_end(&mut data)?;
    Ok(data)
}

impl Psbt {
    const MAGIC: [u8; 5] = *b"psbt\xFF";
    pub(crate) const SEPARATOR: [u8; 1] = [0x0];

    pub fn serialize(&self) -> Vec<u8> {
        let mut vec = Vec::new();
        self.encode(&mut vec).expect("in-memory encoding can't error");
        vec
    }

    /// Parses binary PSBT, failing on trailing data.
    pub fn deserialize(data: impl AsRef<[u8]>) -> Result<Self, PsbtError> {
        <Psbt as Decode>::deserialize(data)
    }
}

impl Encode for Psbt {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        writer.write_all(&Psbt::MAGIC)?;
        let mut len = Psbt::MAGIC.len() + self.encode_map(writer)?;
        for input in &self.inputs {
            len += input.encode_map(writer)?;
        }
        for output in &self.outputs {
            len += output.encode_map(writer)?;
        }
        Ok(len)
    }
}

impl Decode for Psbt {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let magic = <[u8; 5]>::decode(reader)?;
        if magic != Psbt::MAGIC {
            return Err(PsbtError::InvalidMagic(magic).into());
        }

        let mut psbt = Psbt::default();
        psbt.parse_map(Map::parse(MapName::Global, reader)?)?;
        // the global map defines how many input and output maps follow
        for input in &mut psbt.inputs {
            input.parse_map(Map::parse(MapName::Input, reader)?)?;
        }
        for output in &mut psbt.outputs {
            output.parse_map(Map::parse(MapName::Output, reader)?)?;
        }
        Ok(psbt)
    }
}

impl<T: KeyType, K: Encode, V: Encode> Encode for KeyPair<T, K, V> {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;

        counter += self.key_len().encode(writer)?;
        counter += self.key_type.to_u8().encode(writer)?;
        counter += self.key_data.encode(writer)?;

        counter += self.value_len().encode(writer)?;
        counter += self.value_data.encode(writer)?;

        Ok(counter)
    }
}

impl<T: KeyType> Decode for KeyValue<T> {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let key_len = VarInt::decode(reader)?;
        if key_len == 0u64 {
            return Ok(KeyValue::Separator);
        }

        let key_type = T::from_u8(u8::decode(reader)?);
        let key_data = read_vec(reader, key_len.to_usize() - 1)?;

        let value_len = VarInt::decode(reader)?;
        let value_data = read_vec(reader, value_len.to_usize())?;

        Ok(KeyValue::Pair(KeyPair {
            key_type,
            key_data: KeyData::from(key_data),
            value_data: ValueData::from(value_data),
        }))
    }
}

/// Reads exactly `len` bytes; the length comes from untrusted data, so the
/// buffer grows only as data arrive.
fn read_vec(reader: &mut impl Read, len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::with_capacity(len.min(4096));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

impl Encode for ByteStr {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        writer.write_all(self.as_slice())?;
        Ok(self.len())
    }
}

impl Decode for ByteStr {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        read_to_end(reader).map(ByteStr::from)
    }
}

impl Encode for PropKey {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = self.identifier.len();
        counter += VarInt::with(counter).encode(writer)?;
        writer.write_all(self.identifier.as_bytes())?;

        counter += VarInt::new(self.subtype).encode(writer)?;

        counter += self.data.len();
        writer.write_all(&self.data)?;

        Ok(counter)
    }
}

impl Decode for PropKey {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let len = VarInt::decode(reader)?;
        let identifier = read_vec(reader, len.to_usize())?;
        let identifier = String::from_utf8_lossy(&identifier).to_string();

        let subtype = VarInt::decode(reader)?.to_u64();
        let data = read_to_end(reader)?;

        Ok(PropKey {
            identifier,
            subtype,
            data,
        })
    }
}

impl Encode for UnsignedTx {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = self.version.to_consensus_i32().consensus_encode(writer)?;
        counter += VarInt::with(self.inputs.len()).consensus_encode(writer)?;
        for txin in &self.inputs {
            counter += txin.prev_output.consensus_encode(writer)?;
            counter += 0u8.consensus_encode(writer)?;
            counter += txin.sequence.to_consensus_u32().consensus_encode(writer)?;
        }
        counter += VarInt::with(self.outputs.len()).consensus_encode(writer)?;
        for txout in &self.outputs {
            counter += txout.consensus_encode(writer)?;
        }
        counter += self.lock_time.to_consensus_u32().consensus_encode(writer)?;
        Ok(counter)
    }
}

/// Unsigned transactions are always read in the non-segwit form: a zero input
/// count followed by the output count must not be taken for a segwit marker.
impl Decode for UnsignedTx {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let version = TxVer::from_consensus_i32(i32::consensus_decode(reader)?);

        let count = VarInt::consensus_decode(reader)?.to_usize();
        let mut inputs = Vec::with_capacity(count.min(4096));
        for index in 0..count {
            let prev_output = Outpoint::consensus_decode(reader)?;
            let sig_script = Vec::<u8>::consensus_decode(reader)?;
            if !sig_script.is_empty() {
                return Err(PsbtError::UnsignedTxHasScripts(index).into());
            }
            let sequence = SeqNo::from_consensus_u32(u32::consensus_decode(reader)?);
            inputs.push(UnsignedTxIn {
                prev_output,
                sequence,
            });
        }

        let count = VarInt::consensus_decode(reader)?.to_usize();
        let mut outputs = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            outputs.push(TxOut::consensus_decode(reader)?);
        }

        let lock_time = LockTime::from_consensus_u32(u32::consensus_decode(reader)?);

        Ok(UnsignedTx {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

impl Encode for RawXpub {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.as_inner().encode(writer)
    }
}

impl Decode for RawXpub {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        <[u8; 78]>::decode(reader).map(RawXpub::from)
    }
}

impl Encode for KeyOrigin {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        writer.write_all(&self.master_fp().to_byte_array())?;
        for index in self.derivation() {
            index.index().encode(writer)?;
        }
        Ok(4 + self.derivation().len() * 4)
    }
}

impl Decode for KeyOrigin {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let data = read_to_end(reader)?;
        if data.len() < 4 || data.len() % 4 != 0 {
            return Err(PsbtError::InvalidKeyOrigin(data.len()).into());
        }
        let mut fp = [0u8; 4];
        fp.copy_from_slice(&data[..4]);
        let derivation = data[4..]
            .chunks_exact(4)
            .map(|chunk| {
                let mut index = [0u8; 4];
                index.copy_from_slice(chunk);
                DerivationIndex::from_index(u32::from_le_bytes(index))
            })
            .collect::<DerivationPath>();
        Ok(KeyOrigin::new(Fingerprint::from_byte_array(fp), derivation))
    }
}

impl Encode for XOnlyPk {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.to_byte_array().encode(writer)
    }
}

impl Decode for XOnlyPk {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let data = <[u8; 32]>::decode(reader)?;
        XOnlyPk::from_byte_array(data).map_err(DecodeError::from)
    }
}

impl Encode for SighashType {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.to_consensus_u32().encode(writer)
    }
}

impl Decode for SighashType {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let val = u32::decode(reader)?;
        SighashType::from_consensus_u32(val).map_err(DecodeError::from)
    }
}

impl Encode for Witness {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.as_inner().consensus_encode(writer)
    }
}

impl Decode for Witness {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        Vec::<Vec<u8>>::consensus_decode(reader).map(Witness::from_inner).map_err(DecodeError::from)
    }
}

impl Encode for ControlBlock {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        writer.write_all(self.as_slice())?;
        Ok(self.len())
    }
}

impl Decode for ControlBlock {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let data = read_to_end(reader)?;
        ControlBlock::try_from_vec(data).map_err(DecodeError::from)
    }
}

/// Leaf script is stored without length prefix and followed by the leaf version.
impl Encode for LeafScript {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        writer.write_all(&self.script)?;
        self.version.encode(writer)?;
        Ok(self.script.len() + 1)
    }
}

impl Decode for LeafScript {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let mut data = read_to_end(reader)?;
        let version = data.pop().ok_or(PsbtError::EmptyLeafScript)?;
        Ok(LeafScript {
            version,
            script: data.into(),
        })
    }
}

impl Encode for TapDerivation {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = VarInt::with(self.leaf_hashes.len()).encode(writer)?;
        for leaf_hash in &self.leaf_hashes {
            counter += leaf_hash.encode(writer)?;
        }
        counter += self.origin.encode(writer)?;
        Ok(counter)
    }
}

impl Decode for TapDerivation {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let count = VarInt::decode(reader)?.to_usize();
        let mut leaf_hashes = Vec::with_capacity(count.min(128));
        for _ in 0..count {
            leaf_hashes.push(<[u8; 32]>::decode(reader)?);
        }
        let origin = KeyOrigin::decode(reader)?;
        Ok(TapDerivation {
            leaf_hashes,
            origin,
        })
    }
}

impl Encode for TapTree {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = 0;
        for leaf in self.leaves() {
            counter += leaf.depth.encode(writer)?;
            counter += leaf.version.encode(writer)?;
            counter += leaf.script.consensus_encode(writer)?;
        }
        Ok(counter)
    }
}

impl Decode for TapTree {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        let data = read_to_end(reader)?;
        let mut cursor = Cursor::new(data.as_slice());
        let mut leaves = Vec::new();
        while cursor.position() < data.len() as u64 {
            let depth = u8::decode(&mut cursor)?;
            let version = u8::decode(&mut cursor)?;
            let script = Vec::<u8>::consensus_decode(&mut cursor)?;
            leaves.push(TapLeaf {
                depth,
                version,
                script: script.into(),
            });
        }
        TapTree::from_leaves(leaves).ok_or(PsbtError::InvalidTapTree.into())
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        Ok(self.0.encode(writer)? + self.1.encode(writer)?)
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        Ok((A::decode(reader)?, B::decode(reader)?))
    }
}

impl<const LEN: usize> Encode for [u8; LEN] {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.consensus_encode(writer)
    }
}

impl<const LEN: usize> Decode for [u8; LEN] {
    fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
        Self::consensus_decode(reader).map_err(DecodeError::from)
    }
}

macro_rules! consensus_coded {
    ($($ty:ty),+ $(,)?) => { $(
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                self.consensus_encode(writer)
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
                <$ty>::consensus_decode(reader).map_err(DecodeError::from)
            }
        }
    )+ };
}

/// Scripts in PSBT fields are stored as raw bytes, without the length prefix
/// used by the consensus encoding.
macro_rules! raw_script_coded {
    ($($ty:ty),+ $(,)?) => { $(
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                writer.write_all(self.as_slice())?;
                Ok(self.len())
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
                read_to_end(reader).map(<$ty>::from_unsafe)
            }
        }
    )+ };
}

/// Keys and signatures take the whole field and are checked on reading.
macro_rules! slice_coded {
    ($($ty:ty),+ $(,)?) => { $(
        impl Encode for $ty {
            fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                let data = self.to_vec();
                writer.write_all(&data)?;
                Ok(data.len())
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut impl Read) -> Result<Self, DecodeError> {
                let data = read_to_end(reader)?;
                Ok(<$ty>::from_slice(&data)?)
            }
        }
    )+ };
}

consensus_coded!(Tx, TxOut, u8, u32, VarInt);
raw_script_coded!(ScriptPubkey, SigScript, RedeemScript, WitnessScript);
slice_coded!(LegacyPk, LegacySig, Bip340Sig);

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.as_ref().map_or(Ok(0), |data| data.encode(writer))
    }
}

impl Encode for () {
    fn encode(&self, _writer: &mut impl Write) -> Result<usize, IoError> { Ok(0) }
}

impl Decode for () {
    fn decode(_reader: &mut impl Read) -> Result<Self, DecodeError> { Ok(()) }
}
