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

//! Address-related types: payload analysis, per-coin encoding and parsing.

use std::fmt::{self, Display, Formatter};

use bc::{ScriptPubkey, XOnlyPk};
use bech32::{u5, FromBase32, ToBase32, Variant};

use crate::cashaddr::{self, CashAddrError, CashAddrType};
use crate::{base58, Coin};

/// Errors creating address from scriptPubkey.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum AddressError {
    /// scriptPubkey contains invalid BIP340 output pubkey.
    InvalidTaprootKey,

    /// scriptPubkey can't be represented with any known address standard.
    UnsupportedScriptPubkey,

    /// {0} addresses are not supported by {1}.
    UnsupportedByCoin(&'static str, Coin),
}

/// Errors parsing address strings.
#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum AddressParseError {
    /// wrong Base58 encoding of address data - {0}
    #[from]
    Base58(base58::Error),

    /// wrong Bech32 encoding of address data - {0}
    #[from]
    Bech32(bech32::Error),

    /// wrong CashAddr encoding of address data - {0}
    #[from]
    CashAddr(CashAddrError),

    /// address has an invalid version byte {0:#04x}.
    InvalidAddressVersion(u8),

    /// base58 address payload has invalid length {0}.
    InvalidLength(usize),

    /// address belongs to a different network (human-readable part '{0}').
    WrongNetwork(String),

    /// segwit address has an invalid witness version {0:#04x}.
    InvalidWitnessVersion(u8),

    /// address has an unsupported future witness version {0}.
    FutureWitnessVersion(u8),

    /// witness program of length {0} is invalid for its version.
    InvalidProgramLength(usize),

    /// address has an invalid Bech32 variant {0:?}.
    InvalidBech32Variant(Variant),

    /// wrong BIP340 public key
    WrongPublicKeyData,

    /// unrecognized address format in '{0}'.
    UnrecognizableFormat(String),

    #[display(inner)]
    #[from]
    Unsupported(AddressError),
}

/// Internal address content. Consists of serialized hashes or x-only key value.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum AddressPayload {
    /// P2PKH payload.
    Pkh([u8; 20]),

    /// P2SH payload, including nested segwit.
    Sh([u8; 20]),

    /// P2WPKH payload.
    Wpkh([u8; 20]),

    /// P2WSH payload.
    Wsh([u8; 32]),

    /// P2TR payload: tweaked output key.
    Tr([u8; 32]),
}

impl AddressPayload {
    /// Constructs payload from a given `scriptPubkey`.
    pub fn from_script(script: &ScriptPubkey) -> Result<Self, AddressError> {
        let data = script.as_slice();
        Ok(if script.is_p2pkh() {
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&data[3..23]);
            AddressPayload::Pkh(bytes)
        } else if script.is_p2sh() {
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&data[2..22]);
            AddressPayload::Sh(bytes)
        } else if script.is_p2wpkh() {
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&data[2..]);
            AddressPayload::Wpkh(bytes)
        } else if script.is_p2wsh() {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&data[2..]);
            AddressPayload::Wsh(bytes)
        } else if script.is_p2tr() {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&data[2..]);
            XOnlyPk::from_byte_array(bytes).map_err(|_| AddressError::InvalidTaprootKey)?;
            AddressPayload::Tr(bytes)
        } else {
            return Err(AddressError::UnsupportedScriptPubkey);
        })
    }

    /// Returns script corresponding to the given address.
    pub fn script_pubkey(self) -> ScriptPubkey {
        match self {
            AddressPayload::Pkh(hash) => ScriptPubkey::p2pkh(hash),
            AddressPayload::Sh(hash) => ScriptPubkey::p2sh(hash),
            AddressPayload::Wpkh(hash) => ScriptPubkey::p2wpkh(hash),
            AddressPayload::Wsh(hash) => ScriptPubkey::p2wsh(hash),
            AddressPayload::Tr(output_key) => ScriptPubkey::p2tr(output_key),
        }
    }

    fn name(self) -> &'static str {
        match self {
            AddressPayload::Pkh(_) => "P2PKH",
            AddressPayload::Sh(_) => "P2SH",
            AddressPayload::Wpkh(_) => "P2WPKH",
            AddressPayload::Wsh(_) => "P2WSH",
            AddressPayload::Tr(_) => "P2TR",
        }
    }

    fn witness_program(&self) -> Option<(u8, Variant, &[u8])> {
        match self {
            AddressPayload::Pkh(_) | AddressPayload::Sh(_) => None,
            AddressPayload::Wpkh(hash) => Some((0, Variant::Bech32, hash)),
            AddressPayload::Wsh(hash) => Some((0, Variant::Bech32, hash)),
            AddressPayload::Tr(key) => Some((1, Variant::Bech32m, key)),
        }
    }
}

impl From<AddressPayload> for ScriptPubkey {
    fn from(ap: AddressPayload) -> Self { ap.script_pubkey() }
}

/// Address of a specific coin. Construction checks that the coin is able to
/// represent the payload, so the address always has a text form.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct Address {
    /// Address payload (see [`AddressPayload`]).
    pub payload: AddressPayload,

    /// Coin the address belongs to.
    pub coin: Coin,
}

impl Address {
    pub fn new(payload: AddressPayload, coin: Coin) -> Result<Self, AddressError> {
        let params = coin.params();
        let supported = match payload {
            AddressPayload::Pkh(_) | AddressPayload::Sh(_) => true,
            AddressPayload::Wpkh(_) | AddressPayload::Wsh(_) => {
                params.segwit && params.bech32_hrp.is_some()
            }
            AddressPayload::Tr(_) => params.taproot && params.bech32_hrp.is_some(),
        };
        if !supported {
            return Err(AddressError::UnsupportedByCoin(payload.name(), coin));
        }
        Ok(Address { payload, coin })
    }

    /// Constructs compatible address for a given `scriptPubkey`.
    pub fn with(script: &ScriptPubkey, coin: Coin) -> Result<Self, AddressError> {
        Address::new(AddressPayload::from_script(script)?, coin)
    }

    /// Returns script corresponding to the given address.
    pub fn script_pubkey(self) -> ScriptPubkey { self.payload.script_pubkey() }

    /// Parses address string of the given coin.
    pub fn parse(s: &str, coin: Coin) -> Result<Self, AddressParseError> {
        let params = coin.params();

        if let Some(prefix) = params.cashaddr_prefix {
            let payload = match cashaddr::decode(prefix, s) {
                Ok((CashAddrType::P2pkh, hash)) => Some(AddressPayload::Pkh(hash)),
                Ok((CashAddrType::P2sh, hash)) => Some(AddressPayload::Sh(hash)),
                Err(err) if s.contains(':') => return Err(err.into()),
                // Legacy base58 form is accepted as well
                Err(_) => None,
            };
            if let Some(payload) = payload {
                return Ok(Address::new(payload, coin)?);
            }
        }

        if let Some(expected_hrp) = params.bech32_hrp {
            if let Ok((hrp, data, variant)) = bech32::decode(s) {
                if !hrp.eq_ignore_ascii_case(expected_hrp) {
                    return Err(AddressParseError::WrongNetwork(hrp));
                }
                return Address::from_witness_program(&data, variant, coin);
            }
        }

        match base58::decode_check(s) {
            Ok(data) => Address::from_base58_data(&data, coin),
            Err(err) if params.bech32_hrp.is_none() && params.cashaddr_prefix.is_none() => {
                Err(err.into())
            }
            Err(_) => Err(AddressParseError::UnrecognizableFormat(s.to_owned())),
        }
    }

    fn from_base58_data(data: &[u8], coin: Coin) -> Result<Self, AddressParseError> {
        let params = coin.params();
        if data.len() != 21 {
            return Err(AddressParseError::InvalidLength(data.len()));
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&data[1..]);
        let payload = match data[0] {
            ver if ver == params.pubkey_hash => AddressPayload::Pkh(hash),
            ver if ver == params.script_hash => AddressPayload::Sh(hash),
            ver => return Err(AddressParseError::InvalidAddressVersion(ver)),
        };
        Ok(Address::new(payload, coin)?)
    }

    fn from_witness_program(
        data: &[u5],
        variant: Variant,
        coin: Coin,
    ) -> Result<Self, AddressParseError> {
        let (ver, program) = data.split_first().ok_or(AddressParseError::InvalidProgramLength(0))?;
        let version = ver.to_u8();
        let program = Vec::<u8>::from_base32(program)?;
        let payload = match (version, variant, program.len()) {
            (0, Variant::Bech32, 20) => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&program);
                AddressPayload::Wpkh(hash)
            }
            (0, Variant::Bech32, 32) => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&program);
                AddressPayload::Wsh(hash)
            }
            (1, Variant::Bech32m, 32) => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&program);
                XOnlyPk::from_byte_array(key).map_err(|_| AddressParseError::WrongPublicKeyData)?;
                AddressPayload::Tr(key)
            }
            (0 | 1, Variant::Bech32, _) | (0 | 1, Variant::Bech32m, _)
                if (version == 0) != (variant == Variant::Bech32) =>
            {
                return Err(AddressParseError::InvalidBech32Variant(variant));
            }
            (0 | 1, _, len) => return Err(AddressParseError::InvalidProgramLength(len)),
            (2..=16, _, _) => return Err(AddressParseError::FutureWitnessVersion(version)),
            (invalid, _, _) => return Err(AddressParseError::InvalidWitnessVersion(invalid)),
        };
        Ok(Address::new(payload, coin)?)
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let params = self.coin.params();
        let (hash, kind, version) = match self.payload {
            AddressPayload::Pkh(hash) => (hash, CashAddrType::P2pkh, params.pubkey_hash),
            AddressPayload::Sh(hash) => (hash, CashAddrType::P2sh, params.script_hash),
            payload => {
                let (version, variant, prog) = payload.witness_program().ok_or(fmt::Error)?;
                let hrp = params.bech32_hrp.ok_or(fmt::Error)?;
                let mut bech32_writer = bech32::Bech32Writer::new(hrp, variant, f)?;
                let ver_u5 = u5::try_from_u8(version).map_err(|_| fmt::Error)?;
                bech32::WriteBase32::write_u5(&mut bech32_writer, ver_u5)?;
                return ToBase32::write_base32(&prog, &mut bech32_writer);
            }
        };

        if let Some(prefix) = params.cashaddr_prefix {
            return f.write_str(&cashaddr::encode(prefix, kind, &hash));
        }
        let mut prefixed = [0; 21];
        prefixed[0] = version;
        prefixed[1..].copy_from_slice(&hash);
        base58::encode_check_to_fmt(f, &prefixed)
    }
}

/// Decodes address of the given coin into its `scriptPubkey`.
pub fn decode(coin: Coin, address: &str) -> Result<ScriptPubkey, AddressParseError> {
    Address::parse(address, coin).map(Address::script_pubkey)
}

/// Encodes `scriptPubkey` as an address of the given coin.
pub fn encode(coin: Coin, script: &ScriptPubkey) -> Result<String, AddressError> {
    Address::with(script, coin).map(|addr| addr.to_string())
}

#[cfg(feature = "serde")]
mod _serde {
    use serde::{Serialize, Serializer};

    use super::*;

    impl Serialize for Address {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where S: Serializer {
            serializer.serialize_str(&self.to_string())
        }
    }
}

#[cfg(test)]
mod test {
    use amplify::hex::FromHex;

    use super::*;

    fn g_hash() -> [u8; 20] {
        <[u8; 20]>::from_hex("751e76e8199196d454941c45d1b3a323f1433bd6").unwrap()
    }

    #[test]
    fn per_coin_p2pkh() {
        let script = ScriptPubkey::p2pkh(g_hash());
        for (coin, addr) in [
            (Coin::Bitcoin, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"),
            (Coin::Testnet, "mrCDrCybB6J1vRfbwM5hemdJz73FwDBC8r"),
            (Coin::Litecoin, "LVuDpNCSSj6pQ7t9Pv6d6sUkLKoqDEVUnJ"),
            (Coin::Dogecoin, "DFpN6QqFfUm3gKNaxN6tNcab1FArL9cZLE"),
            (Coin::Dash, "XmN7PQYWKn5MJFna5fRYgP6mxT2F7xpekE"),
            (Coin::BitcoinGold, "GUXByHDZLvU4DnVH9imSFckt3HEQ5cFgE5"),
        ] {
            assert_eq!(encode(coin, &script).unwrap(), addr);
            assert_eq!(decode(coin, addr).unwrap(), script);
        }
    }

    #[test]
    fn per_coin_p2wpkh() {
        let script = ScriptPubkey::p2wpkh(g_hash());
        for (coin, addr) in [
            (Coin::Bitcoin, "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"),
            (Coin::Testnet, "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"),
            (Coin::Regtest, "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080"),
            (Coin::Litecoin, "ltc1qw508d6qejxtdg4y5r3zarvary0c5xw7kgmn4n9"),
            (Coin::BitcoinGold, "btg1qw508d6qejxtdg4y5r3zarvary0c5xw7k6w057a"),
        ] {
            assert_eq!(encode(coin, &script).unwrap(), addr);
            assert_eq!(decode(coin, addr).unwrap(), script);
        }
        assert_eq!(
            encode(Coin::Dogecoin, &script),
            Err(AddressError::UnsupportedByCoin("P2WPKH", Coin::Dogecoin))
        );
    }

    #[test]
    fn taproot() {
        let key = <[u8; 32]>::from_hex(
            "a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c",
        )
        .unwrap();
        let addr = "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr";
        assert_eq!(encode(Coin::Bitcoin, &ScriptPubkey::p2tr(key)).unwrap(), addr);
        assert_eq!(decode(Coin::Bitcoin, addr).unwrap(), ScriptPubkey::p2tr(key));
        assert!(matches!(
            encode(Coin::BitcoinGold, &ScriptPubkey::p2tr(key)),
            Err(AddressError::UnsupportedByCoin(..))
        ));
    }

    #[test]
    fn cashaddr_and_legacy() {
        let script =
            decode(Coin::BitcoinCash, "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a")
                .unwrap();
        assert!(script.is_p2pkh());
        assert_eq!(decode(Coin::BitcoinCash, "1BpEi6DfDAUFd7GtittLSdBeYJvcoaVggu").unwrap(), script);
        assert_eq!(
            encode(Coin::BitcoinCash, &script).unwrap(),
            "bitcoincash:qpm2qsznhks23z7629mms6s4cwef74vcwvy22gdx6a"
        );
    }

    #[test]
    fn wrong_network() {
        assert_eq!(
            decode(Coin::Bitcoin, "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"),
            Err(AddressParseError::WrongNetwork(s!("tb")))
        );
        assert_eq!(
            decode(Coin::Litecoin, "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"),
            Err(AddressParseError::InvalidAddressVersion(0x00))
        );
        assert!(matches!(
            decode(Coin::Bitcoin, "not-an-address"),
            Err(AddressParseError::UnrecognizableFormat(_))
        ));
        assert!(matches!(
            decode(Coin::Dogecoin, "DFpN6QqFfUm3gKNaxN6tNcab1FArL9cZLF"),
            Err(AddressParseError::Base58(_))
        ));
    }

    #[test]
    fn unsupported_script() {
        assert_eq!(
            Address::with(&ScriptPubkey::from_unsafe(vec![0x6a, 0x01, 0x00]), Coin::Bitcoin),
            Err(AddressError::UnsupportedScriptPubkey)
        );
    }
}
