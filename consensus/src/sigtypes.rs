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

use std::fmt::{self, Display, Formatter};

use secp256k1::ecdsa;

/// Bit of the sighash type byte selecting ANYONECANPAY mode.
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;
/// Bit of the sighash type byte marking replay-protected fork signatures.
pub const SIGHASH_FORKID: u8 = 0x40;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display("non-standard sighash type {0:#x}.")]
pub struct NonStandardSighashType(pub u32);

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[repr(u8)]
pub enum SighashFlag {
    /// 0x1: Sign all outputs.
    #[default]
    #[display("ALL")]
    All = 0x01,
    /// 0x2: Sign no outputs --- anyone can choose the destination.
    #[display("NONE")]
    None = 0x02,
    /// 0x3: Sign the output whose index matches this input's index. If none
    /// exists, the signing payload can't be constructed.
    #[display("SINGLE")]
    Single = 0x03,
}

/// Signature hash type: base flag, ANYONECANPAY modifier and an optional fork id
/// used by replay-protected forks (encoded as `type | 0x40 | fork_id << 8`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct SighashType {
    pub flag: SighashFlag,
    pub anyone_can_pay: bool,
    pub fork_id: Option<u32>,
}

impl SighashType {
    #[inline]
    pub const fn all() -> Self {
        SighashType {
            flag: SighashFlag::All,
            anyone_can_pay: false,
            fork_id: None,
        }
    }
    #[inline]
    pub const fn none() -> Self {
        SighashType {
            flag: SighashFlag::None,
            anyone_can_pay: false,
            fork_id: None,
        }
    }
    #[inline]
    pub const fn single() -> Self {
        SighashType {
            flag: SighashFlag::Single,
            anyone_can_pay: false,
            fork_id: None,
        }
    }

    #[inline]
    pub const fn with_anyone_can_pay(mut self) -> Self {
        self.anyone_can_pay = true;
        self
    }

    #[inline]
    pub const fn with_fork_id(mut self, fork_id: u32) -> Self {
        self.fork_id = Some(fork_id);
        self
    }

    /// Byte appended to ECDSA signatures.
    pub const fn to_u8(self) -> u8 {
        let mut ty = self.flag as u8;
        if self.anyone_can_pay {
            ty |= SIGHASH_ANYONECANPAY;
        }
        if self.fork_id.is_some() {
            ty |= SIGHASH_FORKID;
        }
        ty
    }

    /// 4-byte value committed into the signing payload.
    pub const fn to_consensus_u32(self) -> u32 {
        let ty = self.to_u8() as u32;
        match self.fork_id {
            Some(fork_id) => ty | (fork_id << 8),
            None => ty,
        }
    }

    /// Parses consensus sighash value. Bits above the first byte are allowed
    /// only together with the fork id flag.
    pub fn from_consensus_u32(val: u32) -> Result<Self, NonStandardSighashType> {
        let byte = (val & 0xFF) as u8;
        let flag = match byte & !SIGHASH_ANYONECANPAY & !SIGHASH_FORKID {
            0x01 => SighashFlag::All,
            0x02 => SighashFlag::None,
            0x03 => SighashFlag::Single,
            _ => return Err(NonStandardSighashType(val)),
        };
        let fork_id = if byte & SIGHASH_FORKID != 0 {
            Some(val >> 8)
        } else if val >> 8 != 0 {
            return Err(NonStandardSighashType(val));
        } else {
            None
        };
        Ok(SighashType {
            flag,
            anyone_can_pay: byte & SIGHASH_ANYONECANPAY != 0,
            fork_id,
        })
    }

    #[inline]
    pub fn from_u8(byte: u8) -> Result<Self, NonStandardSighashType> {
        Self::from_consensus_u32(byte as u32)
    }

    /// Whether the type is valid for BIP-341 signatures (no fork id).
    pub fn is_taproot_compatible(self) -> bool { self.fork_id.is_none() }
}

impl Display for SighashType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.flag, f)?;
        if self.fork_id.is_some() {
            f.write_str("|FORKID")?;
        }
        if self.anyone_can_pay {
            f.write_str("|ANYONECANPAY")?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum SigError {
    /// signature has an empty body.
    EmptySignature,

    /// DER encoding of the signature is invalid.
    DerEncoding,

    /// compact signature encodes values outside of the curve order.
    InvalidCompact,

    /// BIP-340 signature has invalid length {0}.
    Bip340Encoding(usize),

    /// explicit sighash type 0x00 is forbidden in a 65-byte BIP-340 signature.
    ExplicitDefaultSighash,

    #[from]
    #[display(inner)]
    SighashType(NonStandardSighashType),
}

/// DER-encodes a compact `r || s` signature and appends the sighash type byte.
pub fn encode_sig(compact: &[u8; 64], sighash_type: SighashType) -> Result<Vec<u8>, SigError> {
    let sig = ecdsa::Signature::from_compact(compact).map_err(|_| SigError::InvalidCompact)?;
    Ok(LegacySig { sig, sighash_type }.to_vec())
}

/// Inverse of [`encode_sig`]: returns compact signature and the sighash type.
pub fn decode_sig(bytes: &[u8]) -> Result<([u8; 64], SighashType), SigError> {
    let sig = LegacySig::from_slice(bytes)?;
    Ok((sig.sig.serialize_compact(), sig.sighash_type))
}

/// ECDSA signature with the sighash type, as stored in a scriptSig, a witness or
/// a PSBT partial signature field.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LegacySig {
    pub sig: ecdsa::Signature,
    pub sighash_type: SighashType,
}

impl LegacySig {
    pub fn sighash_all(sig: ecdsa::Signature) -> LegacySig {
        LegacySig {
            sig,
            sighash_type: SighashType::all(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<LegacySig, SigError> {
        let (hash_ty, sig) = bytes.split_last().ok_or(SigError::EmptySignature)?;
        let sighash_type = SighashType::from_u8(*hash_ty)?;
        let sig = ecdsa::Signature::from_der(sig).map_err(|_| SigError::DerEncoding)?;
        Ok(LegacySig { sig, sighash_type })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut ser = self.sig.serialize_der().to_vec();
        ser.push(self.sighash_type.to_u8());
        ser
    }
}

/// BIP-340 signature, optionally followed by an explicit sighash type byte.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Bip340Sig {
    pub sig: [u8; 64],
    pub sighash_type: Option<SighashType>,
}

impl Bip340Sig {
    pub fn sighash_default(sig: [u8; 64]) -> Self {
        Bip340Sig {
            sig,
            sighash_type: None,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, SigError> {
        let (sig, sighash_type) = match bytes.len() {
            64 => (bytes, None),
            65 => {
                let byte = bytes[64];
                if byte == 0x00 {
                    return Err(SigError::ExplicitDefaultSighash);
                }
                let ty = SighashType::from_u8(byte)?;
                if !ty.is_taproot_compatible() {
                    return Err(NonStandardSighashType(byte as u32).into());
                }
                (&bytes[..64], Some(ty))
            }
            invalid => return Err(SigError::Bip340Encoding(invalid)),
        };
        let mut buf = [0u8; 64];
        buf.copy_from_slice(sig);
        Ok(Bip340Sig {
            sig: buf,
            sighash_type,
        })
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let mut ser = Vec::with_capacity(65);
        ser.extend_from_slice(&self.sig);
        if let Some(sighash_type) = self.sighash_type {
            ser.push(sighash_type.to_u8())
        }
        ser
    }

    /// Sighash byte committed into the BIP-341 message.
    pub fn sighash_byte(&self) -> u8 { self.sighash_type.map(SighashType::to_u8).unwrap_or(0) }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;

    #[test]
    fn sighash_bytes() {
        assert_eq!(SighashType::all().to_u8(), 0x01);
        assert_eq!(SighashType::single().with_anyone_can_pay().to_u8(), 0x83);
        assert_eq!(SighashType::all().with_fork_id(0).to_consensus_u32(), 0x41);
        assert_eq!(SighashType::all().with_fork_id(79).to_consensus_u32(), 0x4f41);
        assert_eq!(
            SighashType::from_consensus_u32(0x4f41),
            Ok(SighashType::all().with_fork_id(79))
        );
        assert_eq!(SighashType::from_u8(0x82), Ok(SighashType::none().with_anyone_can_pay()));
        assert_eq!(SighashType::from_u8(0x04), Err(NonStandardSighashType(0x04)));
        assert_eq!(SighashType::from_u8(0x80), Err(NonStandardSighashType(0x80)));
        assert_eq!(SighashType::from_consensus_u32(0x0101), Err(NonStandardSighashType(0x0101)));
        assert_eq!(SighashType::all().with_anyone_can_pay().to_string(), "ALL|ANYONECANPAY");
    }

    #[test]
    fn der_sig_coding() {
        let der = Vec::<u8>::from_hex(
            "3044022047ac8e878352d3ebbde1c94ce3a10d057c24175747116f8288e5d794d12d482f0220217f36a485cae903c713331d877c1f64677e3622ad4010726870540656fe9dcb01",
        )
        .unwrap();
        let (compact, ty) = decode_sig(&der).unwrap();
        assert_eq!(ty, SighashType::all());
        assert_eq!(encode_sig(&compact, ty).unwrap(), der);

        let mut bad = der.clone();
        *bad.last_mut().unwrap() = 0x05;
        assert_eq!(decode_sig(&bad), Err(SigError::SighashType(NonStandardSighashType(0x05))));
        let mut truncated = der[..10].to_vec();
        truncated.push(0x01);
        assert_eq!(decode_sig(&truncated), Err(SigError::DerEncoding));
        assert_eq!(decode_sig(&[]), Err(SigError::EmptySignature));
    }

    #[test]
    fn bip340_sig_coding() {
        let sig = Bip340Sig::from_slice(&[0x11; 64]).unwrap();
        assert_eq!(sig.sighash_type, None);
        assert_eq!(sig.sighash_byte(), 0x00);
        assert_eq!(sig.to_vec().len(), 64);

        let mut explicit = vec![0x11; 64];
        explicit.push(0x83);
        let sig = Bip340Sig::from_slice(&explicit).unwrap();
        assert_eq!(sig.sighash_type, Some(SighashType::single().with_anyone_can_pay()));
        assert_eq!(sig.to_vec(), explicit);

        explicit[64] = 0x00;
        assert_eq!(Bip340Sig::from_slice(&explicit), Err(SigError::ExplicitDefaultSighash));
        explicit[64] = 0x41;
        assert!(Bip340Sig::from_slice(&explicit).is_err());
        assert_eq!(Bip340Sig::from_slice(&[0; 63]), Err(SigError::Bip340Encoding(63)));
    }
}
