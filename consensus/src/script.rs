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

use std::io::{Read, Write};

use amplify::{IoError, Wrapper};

use crate::hashes::{hash160, sha256};
use crate::opcodes::*;
use crate::{ConsensusDecode, ConsensusDecodeError, ConsensusEncode};

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum ScriptError {
    /// script length accounting mismatch: {expected} bytes were expected, but {actual} were
    /// produced.
    LengthMismatch { expected: usize, actual: usize },

    /// data push of {0} bytes exceeds the maximal push size.
    PushTooLong(usize),
}

/// Element of a script: either a single opcode or a data push.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Chunk {
    Op(u8),
    Push(Vec<u8>),
}

impl Chunk {
    pub fn push(data: impl Into<Vec<u8>>) -> Self { Chunk::Push(data.into()) }

    /// Opcode which replaces a data push under the minimal-push rules (BIP-62).
    fn minimal_opcode(data: &[u8]) -> Option<u8> {
        match data {
            [] => Some(OP_0),
            [n @ 1..=16] => Some(op_pushnum(*n)),
            [0x81] => Some(OP_1NEGATE),
            _ => None,
        }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Chunk::Op(_) => 1,
            Chunk::Push(data) if Chunk::minimal_opcode(data).is_some() => 1,
            Chunk::Push(data) => {
                let header = match data.len() {
                    0..=0x4b => 1,
                    0x4c..=0xff => 2,
                    0x100..=0xffff => 3,
                    _ => 5,
                };
                header + data.len()
            }
        }
    }

    fn write_to(&self, buf: &mut Vec<u8>) -> Result<(), ScriptError> {
        let data = match self {
            Chunk::Op(op) => {
                buf.push(*op);
                return Ok(());
            }
            Chunk::Push(data) => data,
        };
        if let Some(op) = Chunk::minimal_opcode(data) {
            buf.push(op);
            return Ok(());
        }
        let len = data.len();
        match len {
            0..=0x4b => buf.push(len as u8),
            0x4c..=0xff => {
                buf.push(OP_PUSHDATA1);
                buf.push(len as u8);
            }
            0x100..=0xffff => {
                buf.push(OP_PUSHDATA2);
                buf.extend((len as u16).to_le_bytes());
            }
            _ => {
                let len = u32::try_from(len).map_err(|_| ScriptError::PushTooLong(len))?;
                buf.push(OP_PUSHDATA4);
                buf.extend(len.to_le_bytes());
            }
        }
        buf.extend_from_slice(data);
        Ok(())
    }
}

/// Compiles chunks into the canonical script encoding, using minimal pushes.
pub fn compile(chunks: &[Chunk]) -> Result<ScriptBytes, ScriptError> {
    let expected = chunks.iter().map(Chunk::encoded_len).sum::<usize>();
    let mut buf = Vec::with_capacity(expected);
    for chunk in chunks {
        chunk.write_to(&mut buf)?;
    }
    if buf.len() != expected {
        return Err(ScriptError::LengthMismatch {
            expected,
            actual: buf.len(),
        });
    }
    Ok(ScriptBytes(buf))
}

/// Parses a script into chunks. Small-number opcodes are returned as the pushes they
/// represent. Returns an empty list if the script contains a malformed push.
pub fn decompile(script: &[u8]) -> Vec<Chunk> {
    let mut chunks = vec![];
    let mut iter = Instructions::new(script);
    for instr in &mut iter {
        let chunk = match instr {
            Instruction::Push(data) => Chunk::Push(data.to_vec()),
            Instruction::Op(OP_1NEGATE) => Chunk::Push(vec![0x81]),
            Instruction::Op(op @ OP_1..=OP_16) => Chunk::Push(vec![op - OP_1 + 1]),
            Instruction::Op(op) => Chunk::Op(op),
        };
        chunks.push(chunk);
    }
    if iter.malformed {
        return vec![];
    }
    chunks
}

enum Instruction<'s> {
    Op(u8),
    Push(&'s [u8]),
}

/// Iterator over raw script instructions, remembering the byte range of each of them.
struct Instructions<'s> {
    script: &'s [u8],
    pos: usize,
    last: usize,
    malformed: bool,
}

impl<'s> Instructions<'s> {
    fn new(script: &'s [u8]) -> Self {
        Instructions {
            script,
            pos: 0,
            last: 0,
            malformed: false,
        }
    }

    fn take(&mut self, len: usize) -> Option<&'s [u8]> {
        let end = self.pos.checked_add(len)?;
        let data = self.script.get(self.pos..end)?;
        self.pos = end;
        Some(data)
    }

    fn take_len(&mut self, width: usize) -> Option<usize> {
        let bytes = self.take(width)?;
        let mut buf = [0u8; 4];
        buf[..width].copy_from_slice(bytes);
        Some(u32::from_le_bytes(buf) as usize)
    }

    fn next_instruction(&mut self) -> Option<Instruction<'s>> {
        let op = *self.take(1)?.first()?;
        let len = match op {
            OP_0 => return Some(Instruction::Push(&[])),
            1..=OP_PUSHBYTES_75 => op as usize,
            OP_PUSHDATA1 => self.take_len(1)?,
            OP_PUSHDATA2 => self.take_len(2)?,
            OP_PUSHDATA4 => self.take_len(4)?,
            op => return Some(Instruction::Op(op)),
        };
        self.take(len).map(Instruction::Push)
    }
}

impl<'s> Iterator for Instructions<'s> {
    type Item = Instruction<'s>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.malformed || self.pos >= self.script.len() {
            return None;
        }
        self.last = self.pos;
        let instr = self.next_instruction();
        if instr.is_none() {
            self.malformed = true;
        }
        instr
    }
}

#[derive(Wrapper, WrapperMut, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct ScriptBytes(Vec<u8>);

impl From<&[u8]> for ScriptBytes {
    fn from(bytes: &[u8]) -> Self { ScriptBytes(bytes.to_vec()) }
}

impl ScriptBytes {
    pub fn new() -> Self { Self::default() }

    pub fn chunks(&self) -> Vec<Chunk> { decompile(&self.0) }

    /// Removes all `OP_CODESEPARATOR` opcodes, keeping the rest of the script byte-exact.
    /// Bytes following a malformed push are kept untouched.
    pub fn remove_codeseparators(&self) -> ScriptBytes {
        let mut cleaned = Vec::with_capacity(self.0.len());
        let mut iter = Instructions::new(&self.0);
        while let Some(instr) = iter.next() {
            if !matches!(instr, Instruction::Op(OP_CODESEPARATOR)) {
                cleaned.extend_from_slice(&self.0[iter.last..iter.pos]);
            }
        }
        if iter.malformed {
            cleaned.extend_from_slice(&self.0[iter.last..]);
        }
        ScriptBytes(cleaned)
    }
}

impl ConsensusEncode for ScriptBytes {
    fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        self.0.consensus_encode(writer)
    }
}

impl ConsensusDecode for ScriptBytes {
    fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
        Vec::<u8>::consensus_decode(reader).map(Self)
    }
}

macro_rules! script_wrapper {
    ($ty:ident) => {
        impl $ty {
            pub fn new() -> Self { Self::default() }
            pub fn from_unsafe(bytes: impl Into<Vec<u8>>) -> Self {
                Self(ScriptBytes::from_inner(bytes.into()))
            }
            pub fn as_script_bytes(&self) -> &ScriptBytes { &self.0 }
            pub fn to_vec(&self) -> Vec<u8> { self.0.to_inner() }
        }

        impl ConsensusEncode for $ty {
            fn consensus_encode(&self, writer: &mut impl Write) -> Result<usize, IoError> {
                self.0.consensus_encode(writer)
            }
        }

        impl ConsensusDecode for $ty {
            fn consensus_decode(reader: &mut impl Read) -> Result<Self, ConsensusDecodeError> {
                ScriptBytes::consensus_decode(reader).map(Self)
            }
        }
    };
}

#[derive(Wrapper, WrapperMut, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct ScriptPubkey(ScriptBytes);
script_wrapper!(ScriptPubkey);

impl ScriptPubkey {
    pub fn p2pkh(hash: [u8; 20]) -> Self {
        let mut script = Vec::with_capacity(25);
        script.extend([OP_DUP, OP_HASH160, OP_PUSHBYTES_20]);
        script.extend(hash);
        script.extend([OP_EQUALVERIFY, OP_CHECKSIG]);
        Self::from_unsafe(script)
    }

    pub fn p2sh(hash: [u8; 20]) -> Self {
        let mut script = Vec::with_capacity(23);
        script.extend([OP_HASH160, OP_PUSHBYTES_20]);
        script.extend(hash);
        script.push(OP_EQUAL);
        Self::from_unsafe(script)
    }

    pub fn p2wpkh(hash: [u8; 20]) -> Self { Self::witness_program(0, &hash) }

    pub fn p2wsh(hash: [u8; 32]) -> Self { Self::witness_program(0, &hash) }

    pub fn p2tr(output_key: [u8; 32]) -> Self { Self::witness_program(1, &output_key) }

    /// Constructs witness program output; `version` must not exceed 16.
    pub fn witness_program(version: u8, program: &[u8]) -> Self {
        debug_assert!(version <= 16 && (2..=40).contains(&program.len()));
        let mut script = Vec::with_capacity(program.len() + 2);
        script.push(op_pushnum(version));
        script.push(program.len() as u8);
        script.extend_from_slice(program);
        Self::from_unsafe(script)
    }

    pub fn is_p2pkh(&self) -> bool {
        let s = self.as_slice();
        s.len() == 25
            && s[0] == OP_DUP
            && s[1] == OP_HASH160
            && s[2] == OP_PUSHBYTES_20
            && s[23] == OP_EQUALVERIFY
            && s[24] == OP_CHECKSIG
    }

    pub fn is_p2sh(&self) -> bool {
        let s = self.as_slice();
        s.len() == 23 && s[0] == OP_HASH160 && s[1] == OP_PUSHBYTES_20 && s[22] == OP_EQUAL
    }

    pub fn is_p2wpkh(&self) -> bool {
        let s = self.as_slice();
        s.len() == 22 && s[0] == OP_0 && s[1] == OP_PUSHBYTES_20
    }

    pub fn is_p2wsh(&self) -> bool {
        let s = self.as_slice();
        s.len() == 34 && s[0] == OP_0 && s[1] == OP_PUSHBYTES_32
    }

    pub fn is_p2tr(&self) -> bool {
        let s = self.as_slice();
        s.len() == 34 && s[0] == OP_1 && s[1] == OP_PUSHBYTES_32
    }

    pub fn is_op_return(&self) -> bool { self.as_slice().first() == Some(&OP_RETURN) }

    /// Returns witness version and program if the script is a witness program.
    pub fn as_witness_program(&self) -> Option<(u8, &[u8])> {
        let s = self.as_slice();
        if !(4..=42).contains(&s.len()) || s[1] as usize != s.len() - 2 {
            return None;
        }
        match s[0] {
            OP_0 => Some((0, &s[2..])),
            op @ OP_1..=OP_16 => Some((op - OP_1 + 1, &s[2..])),
            _ => None,
        }
    }

    pub fn is_witness_program(&self) -> bool { self.as_witness_program().is_some() }

    /// Hash committed by P2PKH, P2SH or P2WPKH scripts.
    pub fn hash20(&self) -> Option<[u8; 20]> {
        let range = if self.is_p2pkh() {
            3..23
        } else if self.is_p2sh() {
            2..22
        } else if self.is_p2wpkh() {
            2..22
        } else {
            return None;
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.as_slice()[range]);
        Some(hash)
    }

    /// Output key committed by a P2TR script.
    pub fn output_key(&self) -> Option<[u8; 32]> {
        if !self.is_p2tr() {
            return None;
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.as_slice()[2..]);
        Some(key)
    }
}

#[derive(Wrapper, WrapperMut, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct SigScript(ScriptBytes);
script_wrapper!(SigScript);

impl SigScript {
    pub fn from_chunks(chunks: &[Chunk]) -> Result<Self, ScriptError> { compile(chunks).map(Self) }
}

#[derive(Wrapper, WrapperMut, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct RedeemScript(ScriptBytes);
script_wrapper!(RedeemScript);

impl RedeemScript {
    /// Redeem script of a P2SH-wrapped P2WPKH output.
    pub fn p2sh_wpkh(hash: [u8; 20]) -> Self { Self(ScriptPubkey::p2wpkh(hash).into_inner()) }

    /// Redeem script of a P2SH-wrapped P2PKH output.
    pub fn p2sh_pkh(hash: [u8; 20]) -> Self { Self(ScriptPubkey::p2pkh(hash).into_inner()) }

    pub fn to_script_pubkey(&self) -> ScriptPubkey { ScriptPubkey::p2sh(hash160(self.as_slice())) }
}

#[derive(Wrapper, WrapperMut, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct WitnessScript(ScriptBytes);
script_wrapper!(WitnessScript);

impl WitnessScript {
    pub fn to_script_pubkey(&self) -> ScriptPubkey { ScriptPubkey::p2wsh(sha256(self.as_slice())) }
}
