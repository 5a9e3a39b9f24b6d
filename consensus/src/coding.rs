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

//! Byte cursor: consensus binary coding over [`Read`] / [`Write`] streams.
//!
//! Cursor offsets are tracked by the underlying stream (usually
//! [`std::io::Cursor`]); every short read surfaces as an I/O error, so decoding
//! never reads past the end of the provided buffer.

use std::io::{self, Cursor, Read, Write};

use amplify::IoError;

/// Number of items preallocated while decoding length-prefixed vectors.
const PREALLOC_LIMIT: usize = 4096;

/// Bitcoin compact-size unsigned integer.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, Display)]
#[display(inner)]
pub struct VarInt(pub u64);

impl VarInt {
    pub const fn new(u: u64) -> Self { VarInt(u) }
    pub fn with(u: impl Into<usize>) -> Self { VarInt(u.into() as u64) }

    /// Length of the compact-size encoding in bytes.
    pub const fn len(self) -> usize {
        match self.0 {
            0..=0xFC => 1,
            0xFD..=0xFFFF => 3,
            0x10000..=0xFFFFFFFF => 5,
            _ => 9,
        }
    }

    pub const fn to_u64(&self) -> u64 { self.0 }
    pub const fn into_u64(self) -> u64 { self.0 }
    pub fn to_usize(&self) -> usize { self.0 as usize }
}

impl PartialEq<u64> for VarInt {
    fn eq(&self, other: &u64) -> bool { self.0.eq(other) }
}

#[derive(Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(inner)]
pub enum ConsensusDecodeError {
    #[from]
    #[from(io::Error)]
    Io(IoError),

    #[from]
    Data(ConsensusDataError),
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ConsensusDataError {
    /// consensus data are followed by some excessive bytes.
    DataNotConsumed,

    /// compact-size integer {0} uses non-minimal encoding.
    NonMinimalVarInt(u64),

    /// invalid segwit flag {0:#04x}.
    InvalidSegwitFlag(u8),

    /// transaction has segwit flag set but contains no witness data.
    EmptyWitness,
}

pub trait ConsensusEncode {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError>;

    fn consensus_serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.consensus_encode(&mut buf).expect("in-memory encoding can't error");
        buf
    }
}

pub trait ConsensusDecode
where Self: Sized
{
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError>;

    fn consensus_deserialize(bytes: impl AsRef<[u8]>) -> Result<Self, ConsensusDecodeError> {
        let bytes = bytes.as_ref();
        let mut cursor = Cursor::new(bytes);
        let me = Self::consensus_decode(&mut cursor)?;
        if cursor.position() != bytes.len() as u64 {
            return Err(ConsensusDataError::DataNotConsumed.into());
        }
        Ok(me)
    }
}

pub fn consensus_serialize(data: &impl ConsensusEncode) -> Vec<u8> { data.consensus_serialize() }

pub fn consensus_deserialize<T: ConsensusDecode>(
    bytes: impl AsRef<[u8]>,
) -> Result<T, ConsensusDecodeError> {
    T::consensus_deserialize(bytes)
}

/// Reads exactly `len` bytes without trusting `len` for the allocation size.
pub(crate) fn read_exact_vec(
    reader: &mut impl Read,
    len: usize,
) -> Result<Vec<u8>, ConsensusDecodeError> {
    let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
    reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

impl ConsensusEncode for VarInt {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        match self.0 {
            0..=0xFC => {
                (self.0 as u8).consensus_encode(writer)?;
            }
            0xFD..=0xFFFF => {
                0xFDu8.consensus_encode(writer)?;
                (self.0 as u16).consensus_encode(writer)?;
            }
            0x10000..=0xFFFFFFFF => {
                0xFEu8.consensus_encode(writer)?;
                (self.0 as u32).consensus_encode(writer)?;
            }
            _ => {
                0xFFu8.consensus_encode(writer)?;
                self.0.consensus_encode(writer)?;
            }
        }
        Ok(self.len())
    }
}

impl ConsensusDecode for VarInt {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let n = u8::consensus_decode(reader)?;
        let (val, min) = match n {
            0xFF => (u64::consensus_decode(reader)?, 0x100000000),
            0xFE => (u32::consensus_decode(reader)? as u64, 0x10000),
            0xFD => (u16::consensus_decode(reader)? as u64, 0xFD),
            n => return Ok(VarInt(n as u64)),
        };
        if val < min {
            return Err(ConsensusDataError::NonMinimalVarInt(val).into());
        }
        Ok(VarInt(val))
    }
}

macro_rules! encode_int {
    ($ty:ty, $len:literal) => {
        impl ConsensusEncode for $ty {
            fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                writer.write_all(&self.to_le_bytes())?;
                Ok($len)
            }
        }

        impl ConsensusDecode for $ty {
            fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
                let mut buf = [0u8; $len];
                reader.read_exact(&mut buf)?;
                Ok(Self::from_le_bytes(buf))
            }
        }
    };
}

encode_int!(u8, 1);
encode_int!(u16, 2);
encode_int!(u32, 4);
encode_int!(u64, 8);
encode_int!(i32, 4);
encode_int!(i64, 8);

impl<const LEN: usize> ConsensusEncode for [u8; LEN] {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        writer.write_all(self)?;
        Ok(LEN)
    }
}

impl<const LEN: usize> ConsensusDecode for [u8; LEN] {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let mut buf = [0u8; LEN];
        reader.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Length-prefixed byte string.
impl ConsensusEncode for Vec<u8> {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let counter = VarInt::with(self.len()).consensus_encode(writer)?;
        writer.write_all(self)?;
        Ok(counter + self.len())
    }
}

impl ConsensusDecode for Vec<u8> {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let len = VarInt::consensus_decode(reader)?;
        read_exact_vec(reader, len.to_usize())
    }
}

/// Vector of length-prefixed byte strings, as used by witness stacks.
impl ConsensusEncode for Vec<Vec<u8>> {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut counter = VarInt::with(self.len()).consensus_encode(writer)?;
        for item in self {
            counter += item.consensus_encode(writer)?;
        }
        Ok(counter)
    }
}

impl ConsensusDecode for Vec<Vec<u8>> {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        let count = VarInt::consensus_decode(reader)?.to_usize();
        let mut items = Vec::with_capacity(count.min(PREALLOC_LIMIT));
        for _ in 0..count {
            items.push(Vec::<u8>::consensus_decode(reader)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;

    #[test]
    fn varint_boundaries() {
        for (val, hex) in [
            (0u64, "00"),
            (0xFC, "fc"),
            (0xFD, "fdfd00"),
            (0xFFFF, "fdffff"),
            (0x10000, "fe00000100"),
            (0xFFFFFFFF, "feffffffff"),
            (0x100000000, "ff0000000001000000"),
        ] {
            let bytes = Vec::<u8>::from_hex(hex).unwrap();
            let varint = VarInt(val);
            assert_eq!(varint.consensus_serialize(), bytes);
            assert_eq!(varint.len(), bytes.len());
            assert_eq!(VarInt::consensus_deserialize(&bytes).unwrap(), varint);
        }
    }

    #[test]
    fn varint_non_minimal() {
        assert_eq!(
            VarInt::consensus_deserialize([0xFD, 0x10, 0x00]),
            Err(ConsensusDataError::NonMinimalVarInt(0x10).into())
        );
    }

    #[test]
    fn short_read() {
        let err = Vec::<u8>::consensus_deserialize([0x05, 0x01, 0x02]).unwrap_err();
        assert!(matches!(err, ConsensusDecodeError::Io(_)));
        let err = u32::consensus_deserialize([0x01, 0x02]).unwrap_err();
        assert!(matches!(err, ConsensusDecodeError::Io(_)));
    }

    #[test]
    fn trailing_data() {
        assert_eq!(
            u16::consensus_deserialize([0x01, 0x02, 0x03]),
            Err(ConsensusDataError::DataNotConsumed.into())
        );
    }

    #[test]
    fn slice_vectors() {
        let stack = vec![vec![0xAAu8; 3], vec![], vec![0x01]];
        let bytes = stack.consensus_serialize();
        assert_eq!(bytes, vec![0x03, 0x03, 0xAA, 0xAA, 0xAA, 0x00, 0x01, 0x01]);
        assert_eq!(Vec::<Vec<u8>>::consensus_deserialize(bytes).unwrap(), stack);
    }
}
