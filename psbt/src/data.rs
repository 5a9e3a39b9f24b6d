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

use bc::{
    Bip340Sig, LegacyPk, LegacySig, LockTime, Outpoint, RedeemScript, Sats, ScriptPubkey, SeqNo,
    SigScript, SighashType, Tx, TxIn, TxOut, TxVer, Txid, Witness, WitnessScript, XOnlyPk,
};
use derive::{KeyOrigin, ScriptType};
use indexmap::IndexMap;

pub use self::text::PsbtParseError;
use crate::{ControlBlock, KeyData, LeafScript, PropKey, TapDerivation, TapTree, ValueData};

/// Transaction skeleton stored under the global `UNSIGNED_TX` key.
///
/// Kept apart from [`Tx`]: a PSBT may be created before any input is known,
/// and a zero-input transaction is ambiguous with the segwit marker for the
/// consensus decoder.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct UnsignedTx {
    pub version: TxVer,
    pub inputs: Vec<UnsignedTxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: LockTime,
}

impl From<Tx> for UnsignedTx {
    fn from(tx: Tx) -> UnsignedTx {
        UnsignedTx {
            version: tx.version,
            inputs: tx.inputs.into_iter().map(UnsignedTxIn::from).collect(),
            outputs: tx.outputs,
            lock_time: tx.lock_time,
        }
    }
}

impl From<UnsignedTx> for Tx {
    fn from(unsigned: UnsignedTx) -> Tx {
        Tx {
            version: unsigned.version,
            inputs: unsigned.inputs.into_iter().map(TxIn::from).collect(),
            outputs: unsigned.outputs,
            lock_time: unsigned.lock_time,
        }
    }
}

impl UnsignedTx {
    pub fn txid(&self) -> Txid { Tx::from(self.clone()).txid() }
}

/// Input of [`UnsignedTx`]: scriptSig and witness are always empty.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct UnsignedTxIn {
    pub prev_output: Outpoint,
    pub sequence: SeqNo,
}

impl From<TxIn> for UnsignedTxIn {
    fn from(txin: TxIn) -> UnsignedTxIn {
        UnsignedTxIn {
            prev_output: txin.prev_output,
            sequence: txin.sequence,
        }
    }
}

impl From<UnsignedTxIn> for TxIn {
    fn from(txin: UnsignedTxIn) -> TxIn { TxIn::unsigned(txin.prev_output, txin.sequence) }
}

/// Serialized BIP-32 extended public key. Only carried through, never parsed.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, From)]
#[wrapper(Deref)]
pub struct RawXpub([u8; 78]);

/// Version 0 partially signed transaction.
///
/// The unsigned transaction is not stored as such: its inputs and outputs
/// live inside the per-input and per-output maps, and the global fields keep
/// the rest of it.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Psbt {
    pub tx_version: TxVer,
    pub lock_time: LockTime,

    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,

    /// Account-level keys with their origins.
    pub xpubs: IndexMap<RawXpub, KeyOrigin>,

    /// Emit `INPUT_COUNT` and `OUTPUT_COUNT` global fields. Set when they were
    /// present in the parsed data.
    pub explicit_counts: bool,

    /// Emit the `VERSION` global field. Set when it was present in the parsed
    /// data.
    pub explicit_version: bool,

    pub proprietary: IndexMap<PropKey, ValueData>,
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl Default for Psbt {
    fn default() -> Self { Psbt::from_tx(UnsignedTx::empty()) }
}

impl UnsignedTx {
    fn empty() -> Self {
        UnsignedTx {
            version: TxVer::V2,
            inputs: vec![],
            outputs: vec![],
            lock_time: LockTime::ZERO,
        }
    }
}

impl Psbt {
    /// PSBT version supported for both reading and writing.
    pub const VERSION: u32 = 0;

    pub fn from_tx(tx: impl Into<UnsignedTx>) -> Self {
        let tx = tx.into();
        Psbt {
            tx_version: tx.version,
            lock_time: tx.lock_time,
            inputs: tx
                .inputs
                .into_iter()
                .enumerate()
                .map(|(no, txin)| Input::new(no, txin))
                .collect(),
            outputs: tx
                .outputs
                .into_iter()
                .enumerate()
                .map(|(no, txout)| Output::new(no, txout))
                .collect(),
            xpubs: none!(),
            explicit_counts: false,
            explicit_version: false,
            proprietary: none!(),
            unknown: none!(),
        }
    }

    /// Replaces transaction data, dropping all input and output maps.
    pub(crate) fn reset_from_unsigned_tx(&mut self, tx: UnsignedTx) {
        let Psbt {
            tx_version,
            lock_time,
            inputs,
            outputs,
            ..
        } = Psbt::from_tx(tx);
        self.tx_version = tx_version;
        self.lock_time = lock_time;
        self.inputs = inputs;
        self.outputs = outputs;
    }

    pub fn to_unsigned_tx(&self) -> UnsignedTx {
        UnsignedTx {
            version: self.tx_version,
            inputs: self.inputs.iter().map(Input::to_unsigned_txin).collect(),
            outputs: self.outputs.iter().map(Output::to_txout).collect(),
            lock_time: self.lock_time,
        }
    }

    pub fn txid(&self) -> Txid { self.to_unsigned_tx().txid() }

    #[inline]
    pub fn input(&self, index: usize) -> Option<&Input> { self.inputs.get(index) }

    #[inline]
    pub fn input_mut(&mut self, index: usize) -> Option<&mut Input> { self.inputs.get_mut(index) }

    #[inline]
    pub fn output(&self, index: usize) -> Option<&Output> { self.outputs.get(index) }

    #[inline]
    pub fn output_mut(&mut self, index: usize) -> Option<&mut Output> {
        self.outputs.get_mut(index)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &Input> { self.inputs.iter() }

    pub fn inputs_mut(&mut self) -> impl Iterator<Item = &mut Input> { self.inputs.iter_mut() }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> { self.outputs.iter() }

    pub fn outputs_mut(&mut self) -> impl Iterator<Item = &mut Output> { self.outputs.iter_mut() }

    /// Adds an input spending `prev_output` and returns its index.
    pub fn push_input(&mut self, prev_output: Outpoint, sequence: SeqNo) -> usize {
        let no = self.inputs.len();
        self.inputs.push(Input::new(no, UnsignedTxIn {
            prev_output,
            sequence,
        }));
        no
    }

    /// Adds an output and returns its index.
    pub fn push_output(&mut self, txout: TxOut) -> usize {
        let no = self.outputs.len();
        self.outputs.push(Output::new(no, txout));
        no
    }

    /// Total of the spent amounts. `None` if any input has no known previous
    /// output, or on overflow.
    pub fn input_sum(&self) -> Option<Sats> {
        let mut sum = Sats::ZERO;
        for input in &self.inputs {
            sum = sum.checked_add(input.value()?)?;
        }
        Some(sum)
    }

    pub fn output_sum(&self) -> Option<Sats> {
        Sats::checked_sum(self.outputs.iter().map(Output::value))
    }

    pub fn fee(&self) -> Option<Sats> { self.input_sum()?.checked_sub(self.output_sum()?) }

    pub fn is_finalized(&self) -> bool { self.inputs.iter().all(Input::is_finalized) }
}

mod text {
    use std::fmt::{self, Display, Formatter, LowerHex};
    use std::str::FromStr;

    use amplify::hex::{self, FromHex, ToHex};
    use base64::display::Base64Display;
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;

    use super::*;
    use crate::PsbtError;

    #[derive(Clone, Debug, Display, Error, From)]
    #[display(inner)]
    pub enum PsbtParseError {
        #[from]
        Hex(hex::Error),

        #[from]
        Base64(base64::DecodeError),

        #[from]
        Psbt(PsbtError),
    }

    impl Psbt {
        pub fn from_base64(s: &str) -> Result<Psbt, PsbtParseError> {
            let data = BASE64_STANDARD.decode(s)?;
            Ok(Psbt::deserialize(data)?)
        }

        pub fn from_base16(s: &str) -> Result<Psbt, PsbtParseError> {
            let data = Vec::<u8>::from_hex(s)?;
            Ok(Psbt::deserialize(data)?)
        }

        pub fn to_base64(&self) -> String { BASE64_STANDARD.encode(self.serialize()) }

        pub fn to_base16(&self) -> String { self.serialize().to_hex() }
    }

    /// Accepts hex and Base64 strings; hex is tried first.
    impl FromStr for Psbt {
        type Err = PsbtParseError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match Psbt::from_base16(s) {
                Ok(psbt) => Ok(psbt),
                Err(_) => Psbt::from_base64(s),
            }
        }
    }

    impl Display for Psbt {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            Display::fmt(&Base64Display::new(&self.serialize(), &BASE64_STANDARD), f)
        }
    }

    impl LowerHex for Psbt {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.to_base16()) }
    }
}

/// Per-input map of a PSBT.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Input {
    /// Position inside the transaction, reported in errors.
    pub(crate) index: usize,

    pub previous_outpoint: Outpoint,
    pub sequence_number: SeqNo,

    /// Full transaction which created the spent output. Devices need it for
    /// the inputs whose amount is not committed to by the signature.
    pub non_witness_tx: Option<Tx>,

    /// Spent output, for segwit spends.
    pub witness_utxo: Option<TxOut>,

    pub partial_sigs: IndexMap<LegacyPk, LegacySig>,

    /// Sighash type the signatures must commit to. Absent means `ALL`, or
    /// `DEFAULT` for taproot.
    pub sighash_type: Option<SighashType>,

    pub redeem_script: Option<RedeemScript>,
    pub witness_script: Option<WitnessScript>,

    /// Origins of the keys which sign the input.
    pub bip32_derivation: IndexMap<LegacyPk, KeyOrigin>,

    pub final_script_sig: Option<SigScript>,
    pub final_witness: Option<Witness>,

    /// Key-path spend signature. Removed once the final witness is built.
    pub tap_key_sig: Option<Bip340Sig>,

    /// Script-path signatures, keyed by the signing key and the leaf hash.
    pub tap_script_sig: IndexMap<(XOnlyPk, [u8; 32]), Bip340Sig>,

    pub tap_leaf_script: IndexMap<ControlBlock, LeafScript>,
    pub tap_bip32_derivation: IndexMap<XOnlyPk, TapDerivation>,
    pub tap_internal_key: Option<XOnlyPk>,
    pub tap_merkle_root: Option<[u8; 32]>,

    pub proprietary: IndexMap<PropKey, ValueData>,
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl Input {
    pub fn new(index: usize, txin: impl Into<UnsignedTxIn>) -> Input {
        let UnsignedTxIn {
            prev_output,
            sequence,
        } = txin.into();
        Input {
            index,
            previous_outpoint: prev_output,
            sequence_number: sequence,
            non_witness_tx: None,
            witness_utxo: None,
            partial_sigs: none!(),
            sighash_type: None,
            redeem_script: None,
            witness_script: None,
            bip32_derivation: none!(),
            final_script_sig: None,
            final_witness: None,
            tap_key_sig: None,
            tap_script_sig: none!(),
            tap_leaf_script: none!(),
            tap_bip32_derivation: none!(),
            tap_internal_key: None,
            tap_merkle_root: None,
            proprietary: none!(),
            unknown: none!(),
        }
    }

    pub fn to_unsigned_txin(&self) -> UnsignedTxIn {
        UnsignedTxIn {
            prev_output: self.previous_outpoint,
            sequence: self.sequence_number,
        }
    }

    /// Spent output. The witness UTXO wins over the output of the non-witness
    /// transaction.
    pub fn prev_txout(&self) -> Option<&TxOut> {
        if let Some(txout) = &self.witness_utxo {
            return Some(txout);
        }
        let vout = self.previous_outpoint.vout.to_usize();
        self.non_witness_tx.as_ref()?.outputs.get(vout)
    }

    #[inline]
    pub fn value(&self) -> Option<Sats> { self.prev_txout().map(|txout| txout.value) }

    #[inline]
    pub fn index(&self) -> usize { self.index }

    pub fn is_finalized(&self) -> bool {
        self.final_script_sig.is_some() || self.final_witness.is_some()
    }

    /// Single-key script type the input spends, recognized from the spent
    /// script and, for P2SH, from the redeem script which must hash to it.
    pub fn script_type(&self) -> Option<ScriptType> {
        let spent = &self.prev_txout()?.script_pubkey;
        if spent.is_p2pkh() {
            return Some(ScriptType::P2pkh);
        }
        if spent.is_p2wpkh() {
            return Some(ScriptType::P2wpkh);
        }
        if spent.is_p2tr() {
            return Some(ScriptType::P2tr);
        }
        if !spent.is_p2sh() {
            return None;
        }
        let redeem_script = self.redeem_script.as_ref()?;
        if redeem_script.to_script_pubkey() != *spent {
            return None;
        }
        let nested = ScriptPubkey::from_unsafe(redeem_script.to_vec());
        if nested.is_p2wpkh() {
            Some(ScriptType::P2shP2wpkh)
        } else if nested.is_p2pkh() {
            Some(ScriptType::P2shP2pkh)
        } else {
            None
        }
    }
}

/// Per-output map of a PSBT.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Output {
    /// Position inside the transaction, reported in errors.
    pub(crate) index: usize,

    pub amount: Sats,
    pub script: ScriptPubkey,

    pub redeem_script: Option<RedeemScript>,
    pub witness_script: Option<WitnessScript>,

    /// Origins of the keys controlling the output; set on change outputs so
    /// the device can recognize them.
    pub bip32_derivation: IndexMap<LegacyPk, KeyOrigin>,

    pub tap_internal_key: Option<XOnlyPk>,
    pub tap_tree: Option<TapTree>,
    pub tap_bip32_derivation: IndexMap<XOnlyPk, TapDerivation>,

    pub proprietary: IndexMap<PropKey, ValueData>,
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl Output {
    pub fn new(index: usize, txout: TxOut) -> Self {
        Output {
            index,
            amount: txout.value,
            script: txout.script_pubkey,
            redeem_script: None,
            witness_script: None,
            bip32_derivation: none!(),
            tap_internal_key: None,
            tap_tree: None,
            tap_bip32_derivation: none!(),
            proprietary: none!(),
            unknown: none!(),
        }
    }

    pub fn to_txout(&self) -> TxOut { TxOut::new(self.script.clone(), self.amount) }

    #[inline]
    pub fn value(&self) -> Sats { self.amount }

    #[inline]
    pub fn index(&self) -> usize { self.index }
}
