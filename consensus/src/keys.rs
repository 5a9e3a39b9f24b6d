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

use std::fmt::{self, Display, Formatter, LowerHex};

use amplify::hex::ToHex;
use secp256k1::{PublicKey, XOnlyPublicKey};

use crate::hashes::hash160;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum InvalidPubkey {
    /// public key has invalid length {0}.
    Length(usize),

    /// public key is not a valid secp256k1 point.
    NotOnCurve,

    /// uncompressed public key is not allowed here.
    Uncompressed,
}

/// Public key used by pre-taproot outputs, remembering its serialization form.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct LegacyPk {
    pub pubkey: PublicKey,
    pub compressed: bool,
}

impl From<PublicKey> for LegacyPk {
    fn from(pubkey: PublicKey) -> Self { LegacyPk::compressed(pubkey) }
}

impl LegacyPk {
    pub const fn compressed(pubkey: PublicKey) -> Self {
        LegacyPk {
            pubkey,
            compressed: true,
        }
    }

    pub const fn uncompressed(pubkey: PublicKey) -> Self {
        LegacyPk {
            pubkey,
            compressed: false,
        }
    }

    /// Parses 33-byte compressed or 65-byte uncompressed key.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidPubkey> {
        let compressed = match bytes.len() {
            33 => true,
            65 => false,
            len => return Err(InvalidPubkey::Length(len)),
        };
        let pubkey = PublicKey::from_slice(bytes).map_err(|_| InvalidPubkey::NotOnCurve)?;
        Ok(LegacyPk { pubkey, compressed })
    }

    /// Parses a key which must be compressed, as required by segwit outputs.
    pub fn from_compressed_slice(bytes: &[u8]) -> Result<Self, InvalidPubkey> {
        let pk = Self::from_slice(bytes)?;
        if !pk.compressed {
            return Err(InvalidPubkey::Uncompressed);
        }
        Ok(pk)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        match self.compressed {
            true => self.pubkey.serialize().to_vec(),
            false => self.pubkey.serialize_uncompressed().to_vec(),
        }
    }

    pub fn pubkey_hash(&self) -> [u8; 20] { hash160(self.to_vec()) }

    pub fn to_xonly(&self) -> XOnlyPk { XOnlyPk(self.pubkey.x_only_public_key().0) }
}

impl LowerHex for LegacyPk {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.to_vec().to_hex()) }
}

impl Display for LegacyPk {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { LowerHex::fmt(self, f) }
}

/// BIP-340 x-only public key.
#[derive(Wrapper, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, From)]
#[wrapper(Deref)]
pub struct XOnlyPk(XOnlyPublicKey);

impl XOnlyPk {
    pub fn from_byte_array(bytes: [u8; 32]) -> Result<Self, InvalidPubkey> {
        XOnlyPublicKey::from_slice(&bytes).map(XOnlyPk).map_err(|_| InvalidPubkey::NotOnCurve)
    }

    /// Accepts either a 32-byte x-only key or a 33-byte compressed key.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidPubkey> {
        match bytes.len() {
            32 => XOnlyPublicKey::from_slice(bytes)
                .map(XOnlyPk)
                .map_err(|_| InvalidPubkey::NotOnCurve),
            33 => LegacyPk::from_slice(bytes).map(|pk| pk.to_xonly()),
            len => Err(InvalidPubkey::Length(len)),
        }
    }

    pub fn to_byte_array(&self) -> [u8; 32] { self.0.serialize() }
}

impl Display for XOnlyPk {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_byte_array().to_hex())
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;

    const G: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn legacy_pk() {
        let bytes = Vec::<u8>::from_hex(G).unwrap();
        let pk = LegacyPk::from_slice(&bytes).unwrap();
        assert!(pk.compressed);
        assert_eq!(pk.to_string(), G);
        assert_eq!(pk.pubkey_hash().to_hex(), "751e76e8199196d454941c45d1b3a323f1433bd6");

        let full = LegacyPk::uncompressed(pk.pubkey);
        assert_eq!(full.to_vec().len(), 65);
        assert_eq!(LegacyPk::from_slice(&full.to_vec()), Ok(full));
        assert_eq!(
            LegacyPk::from_compressed_slice(&full.to_vec()),
            Err(InvalidPubkey::Uncompressed)
        );
        assert_eq!(LegacyPk::from_slice(&bytes[1..]), Err(InvalidPubkey::Length(32)));
    }

    #[test]
    fn xonly_pk() {
        let bytes = Vec::<u8>::from_hex(G).unwrap();
        let from_compressed = XOnlyPk::from_slice(&bytes).unwrap();
        let from_xonly = XOnlyPk::from_slice(&bytes[1..]).unwrap();
        assert_eq!(from_compressed, from_xonly);
        assert_eq!(from_xonly.to_string(), G[2..]);
        assert_eq!(XOnlyPk::from_byte_array([0xFF; 32]), Err(InvalidPubkey::NotOnCurve));
    }
}
