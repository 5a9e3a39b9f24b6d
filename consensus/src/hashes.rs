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

//! Hash functions used by consensus serialization, addresses and signatures.

use bitcoin_hashes::{hash160, ripemd160, sha256, sha256d, Hash, HashEngine};

pub fn sha256(data: impl AsRef<[u8]>) -> [u8; 32] {
    sha256::Hash::hash(data.as_ref()).to_byte_array()
}

pub fn sha256d(data: impl AsRef<[u8]>) -> [u8; 32] {
    sha256d::Hash::hash(data.as_ref()).to_byte_array()
}

pub fn ripemd160(data: impl AsRef<[u8]>) -> [u8; 20] {
    ripemd160::Hash::hash(data.as_ref()).to_byte_array()
}

pub fn hash160(data: impl AsRef<[u8]>) -> [u8; 20] {
    hash160::Hash::hash(data.as_ref()).to_byte_array()
}

/// BIP-340 tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || data...)`.
pub fn tagged_hash(tag: &str, data: &[&[u8]]) -> [u8; 32] {
    let tag_hash = sha256(tag.as_bytes());
    let mut engine = sha256::Hash::engine();
    engine.input(&tag_hash);
    engine.input(&tag_hash);
    for chunk in data {
        engine.input(chunk);
    }
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// Digest algorithm applied to a signing payload before ECDSA signing.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[display(lowercase)]
pub enum DigestAlgo {
    /// Double SHA-256, used by bitcoin and most of its forks.
    #[default]
    Sha256d,

    /// Single SHA-256.
    Sha256,
}

impl DigestAlgo {
    pub fn digest(self, data: impl AsRef<[u8]>) -> [u8; 32] {
        match self {
            DigestAlgo::Sha256d => sha256d(data),
            DigestAlgo::Sha256 => sha256(data),
        }
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::ToHex;

    use super::*;

    #[test]
    fn known_digests() {
        assert_eq!(
            sha256(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256d(b"").to_hex(),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
        assert_eq!(
            hash160(
                <Vec<u8> as amplify::hex::FromHex>::from_hex(
                    "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
                )
                .unwrap()
            )
            .to_hex(),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn digest_algos_differ() {
        assert_ne!(DigestAlgo::Sha256d.digest(b"abc"), DigestAlgo::Sha256.digest(b"abc"));
        assert_eq!(DigestAlgo::Sha256.digest(b"abc"), sha256(b"abc"));
    }

    #[test]
    fn tagged_hash_chunks() {
        let joined = tagged_hash("TapTweak", &[b"abc", b"def"]);
        let single = tagged_hash("TapTweak", &[b"abcdef"]);
        assert_eq!(joined, single);
    }
}
