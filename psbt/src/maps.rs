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

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::io::{Read, Write};
use std::marker::PhantomData;

use amplify::hex::ToHex;
use amplify::IoError;
use bc::{
    Bip340Sig, LegacyPk, LegacySig, RedeemScript, SigScript, SighashType, Tx, TxOut, VarInt,
    Witness, WitnessScript, XOnlyPk,
};
use derive::KeyOrigin;
use indexmap::IndexMap;

use crate::keys::{KeyValue, PROPRIETARY};
use crate::{
    ControlBlock, Decode, DecodeError, Encode, GlobalKey, Input, InputKey, KeyPair, KeyType,
    LeafScript, Output, OutputKey, PropKey, Psbt, PsbtError, RawXpub, TapDerivation, TapTree,
    UnsignedTx,
};

/// Raw bytes of a PSBT key or value.
#[derive(Wrapper, WrapperMut, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref, AsSlice, BorrowSlice)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct ByteStr(Vec<u8>);

impl From<&[u8]> for ByteStr {
    fn from(slice: &[u8]) -> Self { ByteStr(slice.to_vec()) }
}

impl Display for ByteStr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

pub type KeyData = ByteStr;
pub type ValueData = ByteStr;

#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("proprietary key '{0}' is already present")]
pub struct KeyAlreadyPresent(pub PropKey);

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display(lowercase)]
pub enum MapName {
    Global,
    Input,
    Output,
}

/// Raw content of a single map, grouped by key kind. Duplicates are rejected
/// while reading, so every key here is unique.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Map<K: KeyType> {
    pub name: MapName,
    /// Standard key types without key data.
    pub fields: BTreeMap<K, ValueData>,
    /// Standard key types with key data.
    pub entries: BTreeMap<K, BTreeMap<KeyData, ValueData>>,
    pub proprietary: IndexMap<PropKey, ValueData>,
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl<K: KeyType> Map<K> {
    /// Reads pairs until the map separator, which is consumed too.
    pub fn parse(name: MapName, stream: &mut impl Read) -> Result<Self, DecodeError> {
        let mut map = Map {
            name,
            fields: empty!(),
            entries: empty!(),
            proprietary: empty!(),
            unknown: empty!(),
        };
        while let KeyValue::Pair(pair) = KeyValue::<K>::decode(stream)? {
            map.insert(pair)?;
        }
        Ok(map)
    }

    fn insert(&mut self, pair: KeyPair<K, KeyData, ValueData>) -> Result<(), DecodeError> {
        let KeyPair {
            key_type,
            key_data,
            value_data,
        } = pair;
        let name = self.name;
        let repeated = PsbtError::RepeatedKey(name, key_type.to_u8());

        if key_type.is_proprietary() {
            let prop_key = PropKey::deserialize(key_data)?;
            if self.proprietary.contains_key(&prop_key) {
                return Err(PsbtError::RepeatedPropKey(name, prop_key).into());
            }
            self.proprietary.insert(prop_key, value_data);
        } else if !K::STANDARD.contains(&key_type) {
            let submap = self.unknown.entry(key_type.to_u8()).or_default();
            if submap.contains_key(&key_data) {
                return Err(PsbtError::RepeatedUnknownKey(name, key_type.to_u8()).into());
            }
            submap.insert(key_data, value_data);
        } else if key_type.has_key_data() {
            let submap = self.entries.entry(key_type).or_default();
            if submap.insert(key_data, value_data).is_some() {
                return Err(repeated.into());
            }
        } else if !key_data.is_empty() {
            return Err(PsbtError::NonEmptyKeyData(name, key_type.to_u8(), key_data).into());
        } else if self.fields.insert(key_type, value_data).is_some() {
            return Err(repeated.into());
        }
        Ok(())
    }

    pub fn check(&self) -> Result<(), PsbtError> {
        match K::STANDARD
            .iter()
            .find(|key_type| key_type.is_required() && !self.fields.contains_key(*key_type))
        {
            Some(absent) => Err(PsbtError::RequiredKeyAbsent(self.name, absent.to_u8())),
            None => Ok(()),
        }
    }
}

/// Writes pairs of a single map, counting the bytes written.
pub struct MapWriter<'w, W: Write, K: KeyType> {
    writer: &'w mut W,
    counter: usize,
    _phantom: PhantomData<K>,
}

impl<'w, W: Write, K: KeyType> MapWriter<'w, W, K> {
    fn new(writer: &'w mut W) -> Self {
        MapWriter {
            writer,
            counter: 0,
            _phantom: PhantomData,
        }
    }

    pub fn pair(
        &mut self,
        key_type: K,
        key_data: impl Encode,
        value_data: impl Encode,
    ) -> Result<&mut Self, IoError> {
        self.counter += KeyPair::new(key_type, key_data, value_data).encode(&mut *self.writer)?;
        Ok(self)
    }

    pub fn field(&mut self, key_type: K, value: impl Encode) -> Result<&mut Self, IoError> {
        self.pair(key_type, (), value)
    }

    pub fn field_opt(
        &mut self,
        key_type: K,
        value: Option<impl Encode>,
    ) -> Result<&mut Self, IoError> {
        match value {
            Some(value) => self.field(key_type, value),
            None => Ok(self),
        }
    }

    pub fn entries<'a, D: Encode + 'a, V: Encode + 'a>(
        &mut self,
        key_type: K,
        entries: impl IntoIterator<Item = (&'a D, &'a V)>,
    ) -> Result<&mut Self, IoError> {
        for (key_data, value_data) in entries {
            self.pair(key_type, key_data, value_data)?;
        }
        Ok(self)
    }

    fn finish(self) -> Result<usize, IoError> {
        self.writer.write_all(&Psbt::SEPARATOR)?;
        Ok(self.counter + Psbt::SEPARATOR.len())
    }
}

/// Typed PSBT map: the global map, an input or an output.
pub trait KeyMap: Sized {
    type Keys: KeyType;
    const NAME: MapName;

    fn proprietary_fields(&self) -> &IndexMap<PropKey, ValueData>;
    fn proprietary_fields_mut(&mut self) -> &mut IndexMap<PropKey, ValueData>;
    fn unknown_fields(&self) -> &IndexMap<u8, IndexMap<KeyData, ValueData>>;
    fn unknown_fields_mut(&mut self) -> &mut IndexMap<u8, IndexMap<KeyData, ValueData>>;

    /// Writes the typed fields, ordered by key type.
    fn write_standard<W: Write>(
        &self,
        writer: &mut MapWriter<'_, W, Self::Keys>,
    ) -> Result<(), IoError>;

    /// Sets a typed field from a key without key data.
    fn set_field(&mut self, key_type: Self::Keys, value_data: ValueData) -> Result<(), PsbtError>;

    /// Adds an entry to a typed field keyed by the key data.
    fn add_entry(
        &mut self,
        key_type: Self::Keys,
        key_data: KeyData,
        value_data: ValueData,
    ) -> Result<(), PsbtError>;

    fn encode_map(&self, writer: &mut impl Write) -> Result<usize, IoError> {
        let mut map = MapWriter::<_, Self::Keys>::new(writer);
        self.write_standard(&mut map)?;
        for (key_type, submap) in self.unknown_fields() {
            map.entries(Self::Keys::from_u8(*key_type), submap)?;
        }
        map.entries(Self::Keys::from_u8(PROPRIETARY), self.proprietary_fields())?;
        map.finish()
    }

    fn parse_map(&mut self, map: Map<Self::Keys>) -> Result<(), PsbtError> {
        map.check()?;
        let Map {
            fields,
            entries,
            proprietary,
            unknown,
            ..
        } = map;
        for (key_type, value_data) in fields {
            self.set_field(key_type, value_data)?;
        }
        for (key_type, submap) in entries {
            for (key_data, value_data) in submap {
                self.add_entry(key_type, key_data, value_data)?;
            }
        }
        self.proprietary_fields_mut().extend(proprietary);
        for (key_type, submap) in unknown {
            self.unknown_fields_mut().entry(key_type).or_default().extend(submap);
        }
        Ok(())
    }

    fn insert_unknown(&mut self, key_type: Self::Keys, key_data: KeyData, value_data: ValueData) {
        self.unknown_fields_mut()
            .entry(key_type.to_u8())
            .or_default()
            .insert(key_data, value_data);
    }

    fn proprietary(&self, key: &PropKey) -> Option<&ValueData> {
        self.proprietary_fields().get(key)
    }

    fn has_proprietary(&self, key: &PropKey) -> bool { self.proprietary_fields().contains_key(key) }

    /// Adds the proprietary field. Returns `false` if the same value was
    /// already there.
    fn push_proprietary(
        &mut self,
        key: PropKey,
        value: impl Into<ValueData>,
    ) -> Result<bool, KeyAlreadyPresent> {
        let value = value.into();
        match self.proprietary(&key) {
            Some(existing) if *existing == value => Ok(false),
            Some(_) => Err(KeyAlreadyPresent(key)),
            None => {
                self.proprietary_fields_mut().insert(key, value);
                Ok(true)
            }
        }
    }

    fn remove_proprietary(&mut self, key: &PropKey) -> Option<ValueData> {
        self.proprietary_fields_mut().shift_remove(key)
    }
}

macro_rules! extra_fields {
    () => {
        fn proprietary_fields(&self) -> &IndexMap<PropKey, ValueData> { &self.proprietary }
        fn proprietary_fields_mut(&mut self) -> &mut IndexMap<PropKey, ValueData> {
            &mut self.proprietary
        }
        fn unknown_fields(&self) -> &IndexMap<u8, IndexMap<KeyData, ValueData>> { &self.unknown }
        fn unknown_fields_mut(&mut self) -> &mut IndexMap<u8, IndexMap<KeyData, ValueData>> {
            &mut self.unknown
        }
    };
}

/// Value of a 32-byte field.
fn bytes32(name: MapName, key_type: impl KeyType, data: &[u8]) -> Result<[u8; 32], PsbtError> {
    <[u8; 32]>::try_from(data)
        .map_err(|_| PsbtError::InvalidFieldLength(name, key_type.to_u8(), data.len()))
}

impl Psbt {
    fn check_count(&self, what: MapName, value_data: ValueData) -> Result<(), PsbtError> {
        let expected = match what {
            MapName::Input => self.inputs.len(),
            _ => self.outputs.len(),
        };
        let found = VarInt::deserialize(value_data)?.to_usize();
        if found != expected {
            return Err(PsbtError::CountMismatch {
                what,
                expected,
                found,
            });
        }
        Ok(())
    }
}

impl KeyMap for Psbt {
    type Keys = GlobalKey;
    const NAME: MapName = MapName::Global;

    extra_fields!();

    fn write_standard<W: Write>(
        &self,
        writer: &mut MapWriter<'_, W, GlobalKey>,
    ) -> Result<(), IoError> {
        writer
            .field(GlobalKey::UnsignedTx, self.to_unsigned_tx())?
            .entries(GlobalKey::Xpub, &self.xpubs)?;
        if self.explicit_counts {
            writer
                .field(GlobalKey::InputCount, VarInt::with(self.inputs.len()))?
                .field(GlobalKey::OutputCount, VarInt::with(self.outputs.len()))?;
        }
        if self.explicit_version {
            writer.field(GlobalKey::Version, Psbt::VERSION)?;
        }
        Ok(())
    }

    fn set_field(&mut self, key_type: GlobalKey, value_data: ValueData) -> Result<(), PsbtError> {
        match key_type {
            GlobalKey::UnsignedTx => {
                self.reset_from_unsigned_tx(UnsignedTx::deserialize(value_data)?)
            }
            GlobalKey::InputCount => {
                self.check_count(MapName::Input, value_data)?;
                self.explicit_counts = true;
            }
            GlobalKey::OutputCount => {
                self.check_count(MapName::Output, value_data)?;
                self.explicit_counts = true;
            }
            GlobalKey::Version => match u32::deserialize(value_data)? {
                Psbt::VERSION => self.explicit_version = true,
                version => return Err(PsbtError::UnsupportedVersion(version)),
            },
            _ => self.insert_unknown(key_type, none!(), value_data),
        }
        Ok(())
    }

    fn add_entry(
        &mut self,
        key_type: GlobalKey,
        key_data: KeyData,
        value_data: ValueData,
    ) -> Result<(), PsbtError> {
        if key_type != GlobalKey::Xpub {
            self.insert_unknown(key_type, key_data, value_data);
            return Ok(());
        }
        self.xpubs.insert(RawXpub::deserialize(key_data)?, KeyOrigin::deserialize(value_data)?);
        Ok(())
    }
}

impl KeyMap for Input {
    type Keys = InputKey;
    const NAME: MapName = MapName::Input;

    extra_fields!();

    fn write_standard<W: Write>(
        &self,
        writer: &mut MapWriter<'_, W, InputKey>,
    ) -> Result<(), IoError> {
        writer
            .field_opt(InputKey::NonWitnessUtxo, self.non_witness_tx.as_ref())?
            .field_opt(InputKey::WitnessUtxo, self.witness_utxo.as_ref())?
            .entries(InputKey::PartialSig, &self.partial_sigs)?
            .field_opt(InputKey::SighashType, self.sighash_type.as_ref())?
            .field_opt(InputKey::RedeemScript, self.redeem_script.as_ref())?
            .field_opt(InputKey::WitnessScript, self.witness_script.as_ref())?
            .entries(InputKey::Bip32Derivation, &self.bip32_derivation)?
            .field_opt(InputKey::FinalScriptSig, self.final_script_sig.as_ref())?
            .field_opt(InputKey::FinalWitness, self.final_witness.as_ref())?
            .field_opt(InputKey::TapKeySig, self.tap_key_sig.as_ref())?
            .entries(InputKey::TapScriptSig, &self.tap_script_sig)?
            .entries(InputKey::TapLeafScript, &self.tap_leaf_script)?
            .entries(InputKey::TapBip32Derivation, &self.tap_bip32_derivation)?
            .field_opt(InputKey::TapInternalKey, self.tap_internal_key.as_ref())?
            .field_opt(InputKey::TapMerkleRoot, self.tap_merkle_root.as_ref())?;
        Ok(())
    }

    fn set_field(&mut self, key_type: InputKey, value_data: ValueData) -> Result<(), PsbtError> {
        match key_type {
            InputKey::NonWitnessUtxo => {
                let tx = Tx::deserialize(value_data)?;
                let prevout = self.previous_outpoint;
                if tx.txid() != prevout.txid {
                    return Err(PsbtError::NonWitnessUtxoMismatch(self.index));
                }
                if prevout.vout.to_usize() >= tx.outputs.len() {
                    return Err(PsbtError::NonWitnessUtxoNoOutput(self.index));
                }
                self.non_witness_tx = Some(tx);
            }
            InputKey::WitnessUtxo => self.witness_utxo = Some(TxOut::deserialize(value_data)?),
            InputKey::SighashType => {
                self.sighash_type = Some(SighashType::deserialize(value_data)?)
            }
            InputKey::RedeemScript => {
                self.redeem_script = Some(RedeemScript::deserialize(value_data)?)
            }
            InputKey::WitnessScript => {
                self.witness_script = Some(WitnessScript::deserialize(value_data)?)
            }
            InputKey::FinalScriptSig => {
                self.final_script_sig = Some(SigScript::deserialize(value_data)?)
            }
            InputKey::FinalWitness => self.final_witness = Some(Witness::deserialize(value_data)?),
            InputKey::TapKeySig => self.tap_key_sig = Some(Bip340Sig::deserialize(value_data)?),
            InputKey::TapInternalKey => {
                let key = bytes32(Self::NAME, key_type, &value_data)?;
                self.tap_internal_key = Some(XOnlyPk::from_byte_array(key)?);
            }
            InputKey::TapMerkleRoot => {
                self.tap_merkle_root = Some(bytes32(Self::NAME, key_type, &value_data)?)
            }
            _ => self.insert_unknown(key_type, none!(), value_data),
        }
        Ok(())
    }

    fn add_entry(
        &mut self,
        key_type: InputKey,
        key_data: KeyData,
        value_data: ValueData,
    ) -> Result<(), PsbtError> {
        match key_type {
            InputKey::PartialSig => {
                self.partial_sigs
                    .insert(LegacyPk::deserialize(key_data)?, LegacySig::deserialize(value_data)?);
            }
            InputKey::Bip32Derivation => {
                self.bip32_derivation
                    .insert(LegacyPk::deserialize(key_data)?, KeyOrigin::deserialize(value_data)?);
            }
            InputKey::TapScriptSig => {
                if key_data.len() != 64 {
                    return Err(PsbtError::InvalidFieldLength(
                        Self::NAME,
                        key_type.to_u8(),
                        key_data.len(),
                    ));
                }
                let key = <(XOnlyPk, [u8; 32])>::deserialize(key_data)?;
                self.tap_script_sig.insert(key, Bip340Sig::deserialize(value_data)?);
            }
            InputKey::TapLeafScript => {
                self.tap_leaf_script.insert(
                    ControlBlock::deserialize(key_data)?,
                    LeafScript::deserialize(value_data)?,
                );
            }
            InputKey::TapBip32Derivation => {
                self.tap_bip32_derivation.insert(
                    XOnlyPk::deserialize(key_data)?,
                    TapDerivation::deserialize(value_data)?,
                );
            }
            _ => self.insert_unknown(key_type, key_data, value_data),
        }
        Ok(())
    }
}

impl KeyMap for Output {
    type Keys = OutputKey;
    const NAME: MapName = MapName::Output;

    extra_fields!();

    fn write_standard<W: Write>(
        &self,
        writer: &mut MapWriter<'_, W, OutputKey>,
    ) -> Result<(), IoError> {
        writer
            .field_opt(OutputKey::RedeemScript, self.redeem_script.as_ref())?
            .field_opt(OutputKey::WitnessScript, self.witness_script.as_ref())?
            .entries(OutputKey::Bip32Derivation, &self.bip32_derivation)?
            .field_opt(OutputKey::TapInternalKey, self.tap_internal_key.as_ref())?
            .field_opt(OutputKey::TapTree, self.tap_tree.as_ref())?
            .entries(OutputKey::TapBip32Derivation, &self.tap_bip32_derivation)?;
        Ok(())
    }

    fn set_field(&mut self, key_type: OutputKey, value_data: ValueData) -> Result<(), PsbtError> {
        match key_type {
            OutputKey::RedeemScript => {
                self.redeem_script = Some(RedeemScript::deserialize(value_data)?)
            }
            OutputKey::WitnessScript => {
                self.witness_script = Some(WitnessScript::deserialize(value_data)?)
            }
            OutputKey::TapInternalKey => {
                let key = bytes32(Self::NAME, key_type, &value_data)?;
                self.tap_internal_key = Some(XOnlyPk::from_byte_array(key)?);
            }
            OutputKey::TapTree => self.tap_tree = Some(TapTree::deserialize(value_data)?),
            _ => self.insert_unknown(key_type, none!(), value_data),
        }
        Ok(())
    }

    fn add_entry(
        &mut self,
        key_type: OutputKey,
        key_data: KeyData,
        value_data: ValueData,
    ) -> Result<(), PsbtError> {
        match key_type {
            OutputKey::Bip32Derivation => {
                self.bip32_derivation
                    .insert(LegacyPk::deserialize(key_data)?, KeyOrigin::deserialize(value_data)?);
            }
            OutputKey::TapBip32Derivation => {
                self.tap_bip32_derivation.insert(
                    XOnlyPk::deserialize(key_data)?,
                    TapDerivation::deserialize(value_data)?,
                );
            }
            _ => self.insert_unknown(key_type, key_data, value_data),
        }
        Ok(())
    }
}
