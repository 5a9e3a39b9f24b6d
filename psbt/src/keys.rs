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

use std::fmt::Debug;
use std::hash::Hash;
use std::io::Sink;

use bc::VarInt;

use crate::{Encode, KeyData, ValueData};

/// Key type byte of a PSBT map, together with the rules of its key data.
pub trait KeyType: Copy + Ord + Eq + Hash + Debug + 'static {
    /// Key types with a typed representation; everything else is preserved as
    /// an unknown key.
    const STANDARD: &'static [Self];

    fn from_u8(val: u8) -> Self;
    fn into_u8(self) -> u8;
    fn to_u8(&self) -> u8 { self.into_u8() }

    /// Whether the key type carries key data, making the field a map instead
    /// of a single value.
    fn has_key_data(self) -> bool;

    /// Whether the key type must be present exactly once.
    fn is_required(self) -> bool;

    fn is_proprietary(self) -> bool;
}

pub(crate) const PROPRIETARY: u8 = 0xFC;

macro_rules! has_key_data {
    () => {
        false
    };
    (keyed) => {
        true
    };
}

/// Declares key types of a PSBT map out of the table of their bytes. Every
/// map also has proprietary (`0xFC`) and unknown keys, which carry key data.
macro_rules! key_type {
    (
        $(#[$attr:meta])*
        pub enum $name:ident {
            $( $(#[$vattr:meta])* $variant:ident = $byte:literal $([$data:ident])?, )+
        }
        $( required: $req:ident )?
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
        pub enum $name {
            $( $(#[$vattr])* $variant, )+
            Proprietary,
            Unknown(u8),
        }

        impl KeyType for $name {
            const STANDARD: &'static [Self] = &[$( Self::$variant ),+];

            fn from_u8(val: u8) -> Self {
                match val {
                    $( $byte => Self::$variant, )+
                    PROPRIETARY => Self::Proprietary,
                    unknown => Self::Unknown(unknown),
                }
            }

            fn into_u8(self) -> u8 {
                match self {
                    $( Self::$variant => $byte, )+
                    Self::Proprietary => PROPRIETARY,
                    Self::Unknown(key_type) => key_type,
                }
            }

            fn has_key_data(self) -> bool {
                match self {
                    $( Self::$variant => has_key_data!($($data)?), )+
                    Self::Proprietary | Self::Unknown(_) => true,
                }
            }

            fn is_required(self) -> bool { false $( || self == Self::$req )? }

            fn is_proprietary(self) -> bool { self == Self::Proprietary }
        }
    };
}

key_type! {
    /// Keys of the global map. Fields of PSBT version 2 are unknown keys here.
    pub enum GlobalKey {
        UnsignedTx = 0x00,
        /// Extended public key with its origin.
        Xpub = 0x01 [keyed],
        InputCount = 0x04,
        OutputCount = 0x05,
        Version = 0xFB,
    }
    required: UnsignedTx
}

key_type! {
    pub enum InputKey {
        NonWitnessUtxo = 0x00,
        WitnessUtxo = 0x01,
        PartialSig = 0x02 [keyed],
        SighashType = 0x03,
        RedeemScript = 0x04,
        WitnessScript = 0x05,
        Bip32Derivation = 0x06 [keyed],
        FinalScriptSig = 0x07,
        FinalWitness = 0x08,
        TapKeySig = 0x13,
        /// Script-path signature keyed by the x-only key and the leaf hash.
        TapScriptSig = 0x14 [keyed],
        TapLeafScript = 0x15 [keyed],
        TapBip32Derivation = 0x16 [keyed],
        TapInternalKey = 0x17,
        TapMerkleRoot = 0x18,
    }
}

key_type! {
    pub enum OutputKey {
        RedeemScript = 0x00,
        WitnessScript = 0x01,
        Bip32Derivation = 0x02 [keyed],
        TapInternalKey = 0x05,
        TapTree = 0x06,
        TapBip32Derivation = 0x07 [keyed],
    }
}

/// Single entry read from a PSBT map: either a key-value pair or the map
/// separator.
pub enum KeyValue<T: KeyType> {
    Pair(KeyPair<T, KeyData, ValueData>),
    Separator,
}

pub struct KeyPair<T: KeyType, K, V> {
    pub key_type: T,
    pub key_data: K,
    pub value_data: V,
}

impl<T: KeyType, K, V> KeyPair<T, K, V> {
    pub fn new(key_type: T, key_data: K, value_data: V) -> Self {
        Self {
            key_type,
            key_data,
            value_data,
        }
    }

    pub fn key_len(&self) -> VarInt
    where K: Encode {
        let mut sink = Sink::default();
        let count = self.key_data.encode(&mut sink).expect("sink write doesn't fail");
        let len = count + 1 /* key type byte */;
        VarInt::with(len)
    }

    pub fn value_len(&self) -> VarInt
    where V: Encode {
        let mut sink = Sink::default();
        let len = self.value_data.encode(&mut sink).expect("sink write doesn't fail");
        VarInt::with(len)
    }
}

/// Key data of a proprietary (`0xFC`) field.
#[derive(Clone, PartialOrd, Ord, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[display("{identifier} {subtype:#x}")]
pub struct PropKey {
    pub identifier: String,
    pub subtype: u64,
    pub data: Vec<u8>,
}

impl PropKey {
    pub fn new(identifier: impl ToString, subtype: u64, data: impl Into<Vec<u8>>) -> Self {
        PropKey {
            identifier: identifier.to_string(),
            subtype,
            data: data.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_type_bytes() {
        for key in InputKey::STANDARD {
            assert_eq!(InputKey::from_u8(key.to_u8()), *key);
        }
        for key in OutputKey::STANDARD {
            assert_eq!(OutputKey::from_u8(key.to_u8()), *key);
        }
        for key in GlobalKey::STANDARD {
            assert_eq!(GlobalKey::from_u8(key.to_u8()), *key);
        }
        assert_eq!(InputKey::from_u8(0x0e), InputKey::Unknown(0x0e));
        assert_eq!(GlobalKey::from_u8(0x02), GlobalKey::Unknown(0x02));
        assert_eq!(OutputKey::from_u8(0xFC), OutputKey::Proprietary);
        assert!(InputKey::TapScriptSig.has_key_data());
        assert!(!InputKey::TapKeySig.has_key_data());
        assert!(InputKey::Unknown(0x0e).has_key_data());
        assert!(GlobalKey::UnsignedTx.is_required());
        assert!(!GlobalKey::Xpub.is_required());
        assert!(!OutputKey::TapTree.is_required());
        assert_eq!(GlobalKey::Version.to_u8(), 0xFB);
    }
}
