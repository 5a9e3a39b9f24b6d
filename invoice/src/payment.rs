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

//! Payment templates: constructing `scriptPubkey`, address and redeem script
//! out of a public key or hash, and classifying existing scripts.

use std::str::FromStr;

use bc::hashes::hash160;
use bc::{taproot, InvalidPubkey, LegacyPk, RedeemScript, ScriptPubkey, TaprootError, XOnlyPk};

use crate::{Address, AddressError, AddressPayload, Coin, NetworkParams};

/// Script types which can be spent by the signing engine.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub enum ScriptType {
    #[display("p2pkh")]
    P2pkh,

    /// Bare public key hash wrapped into P2SH.
    #[display("p2sh-p2pkh")]
    P2shP2pkh,

    #[display("p2sh-p2wpkh")]
    P2shP2wpkh,

    #[display("p2wpkh")]
    P2wpkh,

    /// Taproot key-path spending.
    #[display("p2tr")]
    P2tr,
}

impl ScriptType {
    /// Script type implied by a BIP-43 purpose.
    pub fn from_purpose(purpose: u32) -> Option<Self> {
        Some(match purpose {
            44 => ScriptType::P2pkh,
            49 => ScriptType::P2shP2wpkh,
            84 => ScriptType::P2wpkh,
            86 => ScriptType::P2tr,
            _ => return None,
        })
    }

    /// Canonical BIP-43 purpose of the script type.
    pub fn purpose(self) -> u32 {
        match self {
            ScriptType::P2pkh | ScriptType::P2shP2pkh => 44,
            ScriptType::P2shP2wpkh => 49,
            ScriptType::P2wpkh => 84,
            ScriptType::P2tr => 86,
        }
    }

    /// Checks whether keys derived under the purpose may be used with the
    /// script type. P2SH-P2PKH has no purpose of its own and is accepted
    /// under both legacy and nested-segwit purposes.
    pub fn accepts_purpose(self, purpose: u32) -> bool {
        match self {
            ScriptType::P2shP2pkh => purpose == 44 || purpose == 49,
            _ => self.purpose() == purpose,
        }
    }

    pub fn is_segwit(self) -> bool {
        matches!(self, ScriptType::P2shP2wpkh | ScriptType::P2wpkh | ScriptType::P2tr)
    }

    pub fn is_taproot(self) -> bool { self == ScriptType::P2tr }

    /// Whether the spending script is nested into P2SH.
    pub fn is_wrapped(self) -> bool { matches!(self, ScriptType::P2shP2pkh | ScriptType::P2shP2wpkh) }

    /// Whether the input is signed with the legacy (pre-BIP143) algorithm.
    pub fn is_legacy(self) -> bool { matches!(self, ScriptType::P2pkh | ScriptType::P2shP2pkh) }
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("unknown script type '{0}'")]
pub struct UnknownScriptType(pub String);

impl FromStr for ScriptType {
    type Err = UnknownScriptType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "p2pkh" | "pkh" => ScriptType::P2pkh,
            "p2sh-p2pkh" | "sh-pkh" => ScriptType::P2shP2pkh,
            "p2sh-p2wpkh" | "sh-wpkh" => ScriptType::P2shP2wpkh,
            "p2wpkh" | "wpkh" => ScriptType::P2wpkh,
            "p2tr" | "tr" => ScriptType::P2tr,
            _ => return Err(UnknownScriptType(s.to_owned())),
        })
    }
}

/// Template class of a `scriptPubkey`, as it can be seen from the script
/// alone (a P2SH script doesn't reveal what it wraps).
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[display(uppercase)]
pub enum ScriptClass {
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
}

impl ScriptClass {
    /// Checks that a script of this class may be spent as the given type.
    pub fn matches(self, script_type: ScriptType) -> bool {
        match script_type {
            ScriptType::P2pkh => self == ScriptClass::P2pkh,
            ScriptType::P2shP2pkh | ScriptType::P2shP2wpkh => self == ScriptClass::P2sh,
            ScriptType::P2wpkh => self == ScriptClass::P2wpkh,
            ScriptType::P2tr => self == ScriptClass::P2tr,
        }
    }
}

/// Classifies `scriptPubkey` against the standard templates.
pub fn classify(script: &ScriptPubkey) -> Result<ScriptClass, PaymentError> {
    Ok(if script.is_p2pkh() {
        ScriptClass::P2pkh
    } else if script.is_p2sh() {
        ScriptClass::P2sh
    } else if script.is_p2wpkh() {
        ScriptClass::P2wpkh
    } else if script.is_p2wsh() {
        ScriptClass::P2wsh
    } else if script.is_p2tr() {
        ScriptClass::P2tr
    } else {
        return Err(PaymentError::NonStandardScript);
    })
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum PaymentError {
    /// exactly one of public key or hash must be provided.
    AmbiguousPaymentData,

    /// hash of length {0} is invalid for the payment type.
    InvalidHashLength(usize),

    /// invalid public key - {0}
    #[from]
    InvalidPubkey(InvalidPubkey),

    /// invalid taproot key - {0}
    #[from]
    Taproot(TaprootError),

    /// {0} payment can't be constructed from the provided data.
    UnsupportedData(&'static str),

    /// only P2PKH and P2WPKH payments may be wrapped into P2SH.
    NonWrappable,

    /// script doesn't match any of the standard templates.
    NonStandardScript,

    #[display(inner)]
    #[from]
    Address(AddressError),
}

/// Data a payment is constructed from.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum PaymentData {
    /// Serialized public key.
    PublicKey(Vec<u8>),

    /// Public key or script hash, or a taproot output key.
    Hash(Vec<u8>),
}

impl PaymentData {
    /// Constructs payment data requiring exactly one of the variants.
    pub fn new(pubkey: Option<Vec<u8>>, hash: Option<Vec<u8>>) -> Result<Self, PaymentError> {
        match (pubkey, hash) {
            (Some(pubkey), None) => Ok(PaymentData::PublicKey(pubkey)),
            (None, Some(hash)) => Ok(PaymentData::Hash(hash)),
            _ => Err(PaymentError::AmbiguousPaymentData),
        }
    }
}

fn hash20(hash: &[u8]) -> Result<[u8; 20], PaymentError> {
    <[u8; 20]>::try_from(hash).map_err(|_| PaymentError::InvalidHashLength(hash.len()))
}

/// Payment template instantiated for a coin.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Payment {
    pub address: Address,
    pub script_pubkey: ScriptPubkey,
    /// Redeem script for P2SH-wrapped payments.
    pub redeem_script: Option<RedeemScript>,
}

impl Payment {
    fn with(payload: AddressPayload, coin: Coin) -> Result<Self, PaymentError> {
        let address = Address::new(payload, coin)?;
        Ok(Payment {
            address,
            script_pubkey: payload.script_pubkey(),
            redeem_script: None,
        })
    }

    /// Pay-to-public-key-hash; accepts compressed and uncompressed keys.
    pub fn p2pkh(params: &NetworkParams, data: PaymentData) -> Result<Self, PaymentError> {
        let hash = match data {
            PaymentData::PublicKey(pk) => LegacyPk::from_slice(&pk)?.pubkey_hash(),
            PaymentData::Hash(hash) => hash20(&hash)?,
        };
        Payment::with(AddressPayload::Pkh(hash), params.coin)
    }

    /// Pay-to-script-hash out of a script hash. Use [`Payment::p2sh_wrap`] to
    /// nest other payments.
    pub fn p2sh(params: &NetworkParams, data: PaymentData) -> Result<Self, PaymentError> {
        let hash = match data {
            PaymentData::PublicKey(_) => return Err(PaymentError::UnsupportedData("P2SH")),
            PaymentData::Hash(hash) => hash20(&hash)?,
        };
        Payment::with(AddressPayload::Sh(hash), params.coin)
    }

    /// Pay-to-witness-public-key-hash; keys must be compressed.
    pub fn p2wpkh(params: &NetworkParams, data: PaymentData) -> Result<Self, PaymentError> {
        let hash = match data {
            PaymentData::PublicKey(pk) => LegacyPk::from_compressed_slice(&pk)?.pubkey_hash(),
            PaymentData::Hash(hash) => hash20(&hash)?,
        };
        Payment::with(AddressPayload::Wpkh(hash), params.coin)
    }

    /// Taproot key-path payment. Public keys (x-only or compressed) are
    /// treated as internal keys and tweaked; hashes are taken as ready output
    /// keys.
    pub fn p2tr(params: &NetworkParams, data: PaymentData) -> Result<Self, PaymentError> {
        let output_key = match data {
            PaymentData::PublicKey(pk) => {
                let internal_key = XOnlyPk::from_slice(&pk)?.to_byte_array();
                taproot::output_key(&internal_key)?
            }
            PaymentData::Hash(key) => {
                let key = <[u8; 32]>::try_from(key.as_slice())
                    .map_err(|_| PaymentError::InvalidHashLength(key.len()))?;
                XOnlyPk::from_byte_array(key)?;
                key
            }
        };
        Payment::with(AddressPayload::Tr(output_key), params.coin)
    }

    /// Nests P2PKH or P2WPKH payment into P2SH.
    pub fn p2sh_wrap(params: &NetworkParams, inner: &Payment) -> Result<Self, PaymentError> {
        let redeem_script = match inner.address.payload {
            AddressPayload::Pkh(hash) => RedeemScript::p2sh_pkh(hash),
            AddressPayload::Wpkh(hash) => RedeemScript::p2sh_wpkh(hash),
            _ => return Err(PaymentError::NonWrappable),
        };
        let mut payment =
            Payment::with(AddressPayload::Sh(hash160(redeem_script.as_slice())), params.coin)?;
        payment.redeem_script = Some(redeem_script);
        Ok(payment)
    }

    /// Constructs payment of a given script type out of the public key.
    pub fn for_script_type(
        params: &NetworkParams,
        script_type: ScriptType,
        pubkey: &[u8],
    ) -> Result<Self, PaymentError> {
        let data = PaymentData::PublicKey(pubkey.to_vec());
        match script_type {
            ScriptType::P2pkh => Payment::p2pkh(params, data),
            ScriptType::P2wpkh => Payment::p2wpkh(params, data),
            ScriptType::P2tr => Payment::p2tr(params, data),
            ScriptType::P2shP2pkh => Payment::p2sh_wrap(params, &Payment::p2pkh(params, data)?),
            ScriptType::P2shP2wpkh => {
                if !params.segwit {
                    return Err(AddressError::UnsupportedByCoin("P2SH-P2WPKH", params.coin).into());
                }
                // inner witness program needs no address form of its own
                let hash = LegacyPk::from_compressed_slice(pubkey)?.pubkey_hash();
                let inner = Payment {
                    address: Address {
                        payload: AddressPayload::Wpkh(hash),
                        coin: params.coin,
                    },
                    script_pubkey: ScriptPubkey::p2wpkh(hash),
                    redeem_script: None,
                };
                Payment::p2sh_wrap(params, &inner)
            }
        }
    }
}
