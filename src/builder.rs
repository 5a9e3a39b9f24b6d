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

//! Transaction builder driving the signing of a transaction by a device.

use bc::{
    Bip340Sig, LegacyPk, LegacySig, Outpoint, Sats, ScriptPubkey, SighashType, TapSighash, Tx,
    TxOut, Txid, Vout, XOnlyPk,
};
use derive::{
    AddressParseError, Coin, DerivationPath, KeyOrigin, NetworkParams, Payment, PaymentError,
    ScriptType,
};
use psbt::{ExtractError, FinalizeError, Input, Output, Psbt, SignError, TapDerivation};

use crate::fees::{dust_threshold, estimate_vsize, FeeRate};
use crate::request::{
    pack_requests, BatchError, CompactFraming, ConfirmedDest, ConfirmedOutput,
    OutputConfirmation, RequestFraming, SignRequest, SigningPayload,
};
use crate::verify::{verify_bip340, verify_ecdsa, SignatureError};
use crate::BuilderConfig;

/// Phase of a transaction build. Each operation of [`TxBuilder`] is allowed
/// in a single phase only.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub enum Phase {
    /// Inputs and outputs are being added.
    #[display("built")]
    Built,

    /// Signing payloads are derived and the transaction is frozen.
    #[display("payload-derived")]
    PayloadDerived,

    /// All signatures are verified and stored.
    #[display("witnessed")]
    Witnessed,

    #[display("finalized")]
    Finalized,
}

/// Unspent output to be spent by the transaction.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct Utxo {
    pub txid: Txid,
    pub vout: Vout,
    pub amount: Sats,
    pub path: DerivationPath,
    /// Script type of the spent output; when absent it is detected from the
    /// derivation path purpose.
    pub script_type: Option<ScriptType>,
    /// Transaction containing the spent output.
    pub prev_tx: Option<Tx>,
    /// Public key at the derivation path, which may be provided later with
    /// [`TxBuilder::set_input_public_key`].
    pub public_key: Option<Vec<u8>>,
    pub sighash_type: Option<SighashType>,
}

impl Utxo {
    pub fn new(txid: Txid, vout: impl Into<Vout>, amount: Sats, path: DerivationPath) -> Self {
        Utxo {
            txid,
            vout: vout.into(),
            amount,
            path,
            script_type: None,
            prev_tx: None,
            public_key: None,
            sighash_type: None,
        }
    }

    pub fn with_script_type(mut self, script_type: ScriptType) -> Self {
        self.script_type = Some(script_type);
        self
    }

    pub fn with_prev_tx(mut self, prev_tx: Tx) -> Self {
        self.prev_tx = Some(prev_tx);
        self
    }

    pub fn with_public_key(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    pub fn with_sighash_type(mut self, sighash_type: SighashType) -> Self {
        self.sighash_type = Some(sighash_type);
        self
    }

    pub fn outpoint(&self) -> Outpoint { Outpoint::new(self.txid, self.vout) }
}

/// Destination of a transaction output.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub enum OutputDest {
    Address(String),

    Script(ScriptPubkey),

    /// Output to a key controlled by the device.
    Path {
        path: DerivationPath,
        script_type: Option<ScriptType>,
        public_key: Vec<u8>,
        /// Whether the output receives the change, and its amount has to be
        /// adjusted to the fee.
        change: bool,
    },
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct OutputSpec {
    pub amount: Sats,
    pub dest: OutputDest,
}

impl OutputSpec {
    pub fn address(address: impl ToString, amount: Sats) -> Self {
        OutputSpec {
            amount,
            dest: OutputDest::Address(address.to_string()),
        }
    }

    pub fn script(script_pubkey: ScriptPubkey, amount: Sats) -> Self {
        OutputSpec {
            amount,
            dest: OutputDest::Script(script_pubkey),
        }
    }

    pub fn path(path: DerivationPath, public_key: impl Into<Vec<u8>>, amount: Sats) -> Self {
        OutputSpec {
            amount,
            dest: OutputDest::Path {
                path,
                script_type: None,
                public_key: public_key.into(),
                change: false,
            },
        }
    }

    /// Change output; its amount is a placeholder until the fee is known.
    pub fn change(path: DerivationPath, public_key: impl Into<Vec<u8>>, amount: Sats) -> Self {
        OutputSpec {
            amount,
            dest: OutputDest::Path {
                path,
                script_type: None,
                public_key: public_key.into(),
                change: true,
            },
        }
    }

    pub fn with_script_type(mut self, script_type: ScriptType) -> Self {
        if let OutputDest::Path {
            script_type: ref mut ty,
            ..
        } = self.dest
        {
            *ty = Some(script_type);
        }
        self
    }

    pub fn is_change(&self) -> bool { matches!(self.dest, OutputDest::Path { change: true, .. }) }
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum BuildError {
    /// operation requires the builder in {expected} phase, while it is in {actual} phase.
    WrongPhase { expected: Phase, actual: Phase },

    /// derivation path {0} doesn't define a supported script type.
    UnsupportedPath(DerivationPath),

    /// derivation path {path} uses coin type {found}, while the coin requires {expected}.
    CoinTypeMismatch {
        path: DerivationPath,
        expected: u32,
        found: u32,
    },

    /// {script_type} can't be derived with purpose {purpose}.
    ScriptTypeMismatch { script_type: ScriptType, purpose: u32 },

    /// {0} is not supported by {1}.
    UnsupportedScriptType(ScriptType, Coin),

    /// input {0} requires the previous transaction.
    MissingPrevTx(usize),

    /// previous transaction {found} doesn't match the spent transaction {expected}.
    PrevTxidMismatch { expected: Txid, found: Txid },

    /// previous transaction doesn't have output {0}.
    MissingPrevOutput(Outpoint),

    /// input {index} claims {claimed} sats, while the spent output holds {actual} sats.
    AmountMismatch {
        index: usize,
        claimed: Sats,
        actual: Sats,
    },

    /// public key of input {0} is not known.
    MissingPublicKey(usize),

    /// transaction has no input {0}.
    NoInput(usize),

    /// transaction must have at least one input and one output.
    EmptyTransaction,

    /// transaction may have only a single change output.
    MultipleChange,

    /// inputs of {input} sats are not enough to pay {output} sats and {fee} sats of fee.
    InsufficientFunds { input: Sats, output: Sats, fee: Sats },

    /// fee of {fee} sats is below {required} sats estimated for {vsize} vbytes; add a change
    /// output to adjust the fee.
    FeeBelowEstimate {
        fee: Sats,
        required: Sats,
        vsize: usize,
    },

    /// output {index} of {amount} sats is below the dust threshold of {threshold} sats.
    DustOutput {
        index: usize,
        amount: Sats,
        threshold: Sats,
    },

    /// signing payload of input {input} takes {len} bytes in a request, which exceeds the
    /// maximal request size of {max} bytes.
    PayloadTooLarge { input: usize, len: usize, max: usize },

    /// {signatures} signatures and {keys} public keys are provided for {payloads} signing
    /// payloads.
    SignatureCountMismatch {
        payloads: usize,
        signatures: usize,
        keys: usize,
    },

    /// invalid signature for input {index}: {error}
    InvalidSignature { index: usize, error: SignatureError },

    /// sighash type {0} can't be used for taproot inputs.
    InvalidSighash(SighashType),

    /// transaction amounts overflow.
    AmountOverflow,

    #[from]
    #[display(inner)]
    Payment(PaymentError),

    #[from]
    #[display(inner)]
    Address(AddressParseError),

    #[from]
    #[display(inner)]
    Sign(SignError),

    #[from]
    #[display(inner)]
    Finalize(FinalizeError),

    #[from]
    #[display(inner)]
    Extract(ExtractError),
}

impl From<BatchError> for BuildError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::PayloadTooLarge { input, len, max } => {
                BuildError::PayloadTooLarge { input, len, max }
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
struct InputMeta {
    path: DerivationPath,
    script_type: ScriptType,
    amount: Sats,
    public_key: Option<Vec<u8>>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
struct OutputMeta {
    path: Option<DerivationPath>,
    change: bool,
}

enum Verified {
    Ecdsa(LegacyPk, LegacySig),
    Bip340(Bip340Sig),
}

/// Builds a transaction spending outputs controlled by a device, derives the
/// payloads the device has to sign, and turns the returned signatures into a
/// finalized transaction.
///
/// The builder goes through the [`Phase`]s in order; the transaction is
/// frozen once the signing payloads are derived.
#[derive(Clone, Debug)]
pub struct TxBuilder {
    params: &'static NetworkParams,
    config: BuilderConfig,
    phase: Phase,
    psbt: Psbt,
    inputs: Vec<InputMeta>,
    outputs: Vec<OutputMeta>,
    payloads: Vec<SigningPayload>,
}

impl TxBuilder {
    pub fn new(params: &'static NetworkParams, config: BuilderConfig) -> Self {
        let mut psbt = Psbt::default();
        psbt.tx_version = config.tx_version;
        psbt.lock_time = config.lock_time;
        TxBuilder {
            params,
            config,
            phase: Phase::Built,
            psbt,
            inputs: vec![],
            outputs: vec![],
            payloads: vec![],
        }
    }

    pub fn with_coin(coin: Coin) -> Self { TxBuilder::new(coin.params(), BuilderConfig::default()) }

    #[inline]
    pub fn params(&self) -> &'static NetworkParams { self.params }

    #[inline]
    pub fn config(&self) -> &BuilderConfig { &self.config }

    #[inline]
    pub fn phase(&self) -> Phase { self.phase }

    #[inline]
    pub fn psbt(&self) -> &Psbt { &self.psbt }

    pub fn into_psbt(self) -> Psbt { self.psbt }

    /// Payloads derived by [`TxBuilder::prepare_sign`], in input order.
    #[inline]
    pub fn payloads(&self) -> &[SigningPayload] { &self.payloads }

    pub fn unsigned_tx(&self) -> Tx { Tx::from(self.psbt.to_unsigned_tx()) }

    pub fn input_count(&self) -> usize { self.inputs.len() }

    pub fn output_count(&self) -> usize { self.outputs.len() }

    fn require_phase(&self, expected: Phase) -> Result<(), BuildError> {
        if self.phase != expected {
            return Err(BuildError::WrongPhase {
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase) {
        log::debug!("transaction build phase {} -> {phase}", self.phase);
        self.phase = phase;
    }

    fn requires_prev_tx(&self, script_type: ScriptType) -> bool {
        self.config.require_prev_tx_for_legacy && (script_type.is_legacy() || !self.params.segwit)
    }

    /// Adds an input spending the UTXO and returns its index.
    pub fn add_input(&mut self, utxo: Utxo) -> Result<usize, BuildError> {
        self.require_phase(Phase::Built)?;
        let index = self.inputs.len();
        let outpoint = utxo.outpoint();

        check_coin_type(self.params, &utxo.path)?;
        let script_type = utxo
            .script_type
            .or_else(|| utxo.path.script_type())
            .ok_or_else(|| BuildError::UnsupportedPath(utxo.path.clone()))?;
        check_support(self.params, script_type)?;

        let sighash_type = utxo.sighash_type.or(self.config.default_sighash);
        if let Some(sighash_type) = sighash_type {
            if script_type.is_taproot() && !sighash_type.is_taproot_compatible() {
                return Err(BuildError::InvalidSighash(sighash_type));
            }
        }

        let prevout = match &utxo.prev_tx {
            Some(prev_tx) => Some(check_prev_tx(index, outpoint, utxo.amount, prev_tx)?),
            None if self.requires_prev_tx(script_type) => {
                return Err(BuildError::MissingPrevTx(index));
            }
            None => None,
        };

        let payment = utxo
            .public_key
            .as_deref()
            .map(|pk| Payment::for_script_type(self.params, script_type, pk))
            .transpose()?;
        if let (Some(prevout), Some(payment)) = (&prevout, &payment) {
            warn_script_mismatch(index, &prevout.script_pubkey, &payment.script_pubkey);
        }

        let meta = InputMeta {
            path: utxo.path,
            script_type,
            amount: utxo.amount,
            public_key: utxo.public_key,
        };
        let psbt_index = self.psbt.push_input(outpoint, self.config.sequence);
        let input = self.psbt.input_mut(psbt_index).ok_or(BuildError::NoInput(psbt_index))?;
        input.sighash_type = sighash_type;
        if script_type.is_segwit() {
            input.witness_utxo = prevout;
        }
        input.non_witness_tx = utxo.prev_tx;
        if let (Some(pk), Some(payment)) = (&meta.public_key, &payment) {
            apply_payment(input, &meta, pk, payment)?;
        }

        log::debug!(
            "input {index} spends {outpoint} of {} sats as {script_type} at {}",
            meta.amount,
            meta.path
        );
        self.inputs.push(meta);
        Ok(index)
    }

    /// Provides the public key of an input added without one.
    pub fn set_input_public_key(&mut self, index: usize, pk: &[u8]) -> Result<(), BuildError> {
        self.require_phase(Phase::Built)?;
        let meta = self.inputs.get(index).ok_or(BuildError::NoInput(index))?;
        let payment = Payment::for_script_type(self.params, meta.script_type, pk)?;

        let input = self.psbt.input_mut(index).ok_or(BuildError::NoInput(index))?;
        if let Some(prevout) = input.non_witness_tx.as_ref().and_then(|tx| {
            tx.outputs.get(input.previous_outpoint.vout.to_usize())
        }) {
            warn_script_mismatch(index, &prevout.script_pubkey, &payment.script_pubkey);
        }
        apply_payment(input, meta, pk, &payment)?;

        if let Some(meta) = self.inputs.get_mut(index) {
            meta.public_key = Some(pk.to_vec());
        }
        Ok(())
    }

    /// Adds an output and returns its index.
    pub fn add_output(&mut self, spec: OutputSpec) -> Result<usize, BuildError> {
        self.require_phase(Phase::Built)?;
        if spec.is_change() && self.outputs.iter().any(|output| output.change) {
            return Err(BuildError::MultipleChange);
        }

        let (script_pubkey, payment, meta) = match spec.dest {
            OutputDest::Address(address) => {
                let script_pubkey = invoice::decode(self.params.coin, &address)?;
                (script_pubkey, None, OutputMeta {
                    path: None,
                    change: false,
                })
            }
            OutputDest::Script(script_pubkey) => (script_pubkey, None, OutputMeta {
                path: None,
                change: false,
            }),
            OutputDest::Path {
                path,
                script_type,
                public_key,
                change,
            } => {
                let script_type = path_script_type(self.params, &path, script_type)?;
                let payment = Payment::for_script_type(self.params, script_type, &public_key)?;
                let origin = KeyOrigin::with_path(path.clone());
                (payment.script_pubkey.clone(), Some((payment, public_key, origin)), OutputMeta {
                    path: Some(path),
                    change,
                })
            }
        };

        let index = self.psbt.push_output(TxOut::new(script_pubkey, spec.amount));
        if let Some((payment, public_key, origin)) = payment {
            let output = self.psbt.output_mut(index).ok_or(BuildError::EmptyTransaction)?;
            output.redeem_script = payment.redeem_script;
            if output.script.is_p2tr() {
                let internal_key = XOnlyPk::from_slice(&public_key).map_err(PaymentError::from)?;
                output.tap_internal_key = Some(internal_key);
                output
                    .tap_bip32_derivation
                    .insert(internal_key, TapDerivation::with_internal_pk(origin));
            } else {
                let pk = LegacyPk::from_slice(&public_key).map_err(PaymentError::from)?;
                output.bip32_derivation.insert(pk, origin);
            }
        }

        log::debug!(
            "output {index} pays {} sats{}",
            spec.amount,
            if meta.change { " as change" } else { "" }
        );
        self.outputs.push(meta);
        Ok(index)
    }

    /// Derives signing payloads and packs them into device requests using
    /// [`CompactFraming`].
    pub fn prepare_sign(
        &mut self,
        fee_rate: Option<FeeRate>,
    ) -> Result<Vec<SignRequest>, BuildError> {
        self.prepare_sign_with(fee_rate, &CompactFraming)
    }

    /// Freezes the transaction and derives the signing payloads.
    ///
    /// With a fee rate the change output receives what is left after the
    /// estimated fee, and dust outputs are an error; without it dust outputs
    /// are only reported to the log.
    pub fn prepare_sign_with(
        &mut self,
        fee_rate: Option<FeeRate>,
        framing: &impl RequestFraming,
    ) -> Result<Vec<SignRequest>, BuildError> {
        self.require_phase(Phase::Built)?;
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(BuildError::EmptyTransaction);
        }
        if let Some(index) = self.inputs.iter().position(|input| input.public_key.is_none()) {
            return Err(BuildError::MissingPublicKey(index));
        }

        let input_sum = self.psbt.input_sum().ok_or(BuildError::AmountOverflow)?;
        if let Some(fee_rate) = fee_rate {
            self.adjust_fee(fee_rate, input_sum)?;
        }
        let output_sum = self.psbt.output_sum().ok_or(BuildError::AmountOverflow)?;
        if output_sum > input_sum {
            return Err(BuildError::InsufficientFunds {
                input: input_sum,
                output: output_sum,
                fee: Sats::ZERO,
            });
        }
        self.check_dust(fee_rate.is_some())?;

        let mut payloads = Vec::with_capacity(self.inputs.len());
        for (index, meta) in self.inputs.iter().enumerate() {
            let bytes = self.psbt.sighash_preimage(index, meta.script_type, self.params)?;
            let input = self.psbt.input(index).ok_or(BuildError::NoInput(index))?;
            let sighash_type = match meta.script_type {
                ScriptType::P2tr => input.sighash_type,
                _ => Some(self.params.adapt_sighash(input.sighash_type.unwrap_or_default())),
            };
            log::trace!("input {index} signing payload takes {} bytes", bytes.len());
            payloads.push(SigningPayload {
                input: index,
                path: meta.path.clone(),
                script_type: meta.script_type,
                sighash_type,
                bytes,
            });
        }

        let confirmation = self.output_confirmation();
        let requests = pack_requests(
            payloads.iter().cloned(),
            &confirmation,
            framing,
            self.config.max_request_size,
        )?;
        self.payloads = payloads;
        self.set_phase(Phase::PayloadDerived);
        Ok(requests)
    }

    fn adjust_fee(&mut self, fee_rate: FeeRate, input_sum: Sats) -> Result<(), BuildError> {
        let script_types = self.inputs.iter().map(|input| input.script_type).collect::<Vec<_>>();
        let txouts = self.psbt.outputs().map(Output::to_txout).collect::<Vec<_>>();
        let vsize = estimate_vsize(&script_types, &txouts);
        let required = fee_rate.fee(vsize);
        log::debug!(
            "transaction of {vsize} vbytes at {} sat/kvB requires {required} sats of fee",
            fee_rate.sat_per_kvb()
        );

        let Some(change) = self.outputs.iter().position(|output| output.change) else {
            let output_sum = self.psbt.output_sum().ok_or(BuildError::AmountOverflow)?;
            let fee = input_sum.checked_sub(output_sum).ok_or(BuildError::InsufficientFunds {
                input: input_sum,
                output: output_sum,
                fee: required,
            })?;
            if fee < required {
                return Err(BuildError::FeeBelowEstimate {
                    fee,
                    required,
                    vsize,
                });
            }
            return Ok(());
        };

        let others = Sats::checked_sum(
            self.psbt.outputs().filter(|output| output.index() != change).map(Output::value),
        )
        .ok_or(BuildError::AmountOverflow)?;
        let spent = others.checked_add(required).ok_or(BuildError::AmountOverflow)?;
        let amount = input_sum.checked_sub(spent).ok_or(BuildError::InsufficientFunds {
            input: input_sum,
            output: others,
            fee: required,
        })?;
        log::debug!("change output {change} receives {amount} sats");
        let output = self.psbt.output_mut(change).ok_or(BuildError::EmptyTransaction)?;
        output.amount = amount;
        Ok(())
    }

    fn check_dust(&self, strict: bool) -> Result<(), BuildError> {
        for output in self.psbt.outputs() {
            let threshold = dust_threshold(self.params, &output.script);
            if output.amount >= threshold {
                continue;
            }
            if strict {
                return Err(BuildError::DustOutput {
                    index: output.index(),
                    amount: output.amount,
                    threshold,
                });
            }
            log::warn!(
                "output {} of {} sats is below the dust threshold of {threshold} sats",
                output.index(),
                output.amount
            );
        }
        Ok(())
    }

    fn output_confirmation(&self) -> OutputConfirmation {
        let outputs = self
            .psbt
            .outputs()
            .zip(&self.outputs)
            .map(|(output, meta)| ConfirmedOutput {
                amount: output.amount,
                dest: match &meta.path {
                    Some(path) => ConfirmedDest::Path(path.clone()),
                    None => ConfirmedDest::Script(output.script.clone()),
                },
            })
            .collect();
        OutputConfirmation(outputs)
    }

    /// Verifies signatures returned by the device, one per signing payload
    /// in payload order, together with the public keys which made them.
    ///
    /// Signatures are stored only if all of them are valid.
    pub fn append_signatures<S: AsRef<[u8]>, K: AsRef<[u8]>>(
        &mut self,
        signatures: &[S],
        public_keys: &[K],
    ) -> Result<(), BuildError> {
        self.require_phase(Phase::PayloadDerived)?;
        if signatures.len() != self.payloads.len() || public_keys.len() != self.payloads.len() {
            return Err(BuildError::SignatureCountMismatch {
                payloads: self.payloads.len(),
                signatures: signatures.len(),
                keys: public_keys.len(),
            });
        }

        let mut verified = Vec::with_capacity(self.payloads.len());
        for ((payload, sig), pk) in self.payloads.iter().zip(signatures).zip(public_keys) {
            let index = payload.input;
            let invalid = |error: SignatureError| BuildError::InvalidSignature { index, error };
            let input = self.psbt.input(index).ok_or(BuildError::NoInput(index))?;

            if payload.script_type == ScriptType::P2tr {
                let digest = TapSighash::from_sig_msg(&payload.bytes).to_byte_array();
                let spent =
                    &input.prev_txout().ok_or(SignError::NoPrevout(index))?.script_pubkey;
                let sighash_type = payload.sighash_type;
                let sig = verify_bip340(digest, sig.as_ref(), pk.as_ref(), spent, sighash_type)
                    .map_err(invalid)?;
                verified.push((index, Verified::Bip340(sig)));
            } else {
                let digest = self.params.sighash_digest.digest(&payload.bytes);
                let pk = LegacyPk::from_slice(pk.as_ref())
                    .map_err(SignatureError::from)
                    .map_err(invalid)?;
                if !input.bip32_derivation.contains_key(&pk) {
                    return Err(invalid(SignatureError::KeyMismatch));
                }
                let sighash_type = payload.sighash_type.unwrap_or_default();
                let sig = verify_ecdsa(digest, sig.as_ref(), &pk, sighash_type).map_err(invalid)?;
                verified.push((index, Verified::Ecdsa(pk, sig)));
            }
            log::trace!("signature for input {index} is valid");
        }

        for (index, verified) in verified {
            match verified {
                Verified::Ecdsa(pk, sig) => self.psbt.set_partial_sig(index, pk, sig)?,
                Verified::Bip340(sig) => self.psbt.set_tap_key_sig(index, sig)?,
            }
        }
        self.set_phase(Phase::Witnessed);
        Ok(())
    }

    /// Turns stored signatures into the final scriptSig and witness of each
    /// input.
    pub fn finalize_all_inputs(&mut self) -> Result<(), BuildError> {
        self.require_phase(Phase::Witnessed)?;
        let script_types = self.inputs.iter().map(|input| input.script_type).collect::<Vec<_>>();
        self.psbt.finalize_all(&script_types)?;
        self.set_phase(Phase::Finalized);
        Ok(())
    }

    /// Extracts the signed transaction, checking that it pays at least one
    /// satoshi per virtual byte.
    pub fn extract_transaction(&self) -> Result<Tx, BuildError> {
        self.require_phase(Phase::Finalized)?;
        Ok(self.psbt.extract()?)
    }
}

fn check_coin_type(params: &NetworkParams, path: &DerivationPath) -> Result<(), BuildError> {
    let found = path.coin_type().ok_or_else(|| BuildError::UnsupportedPath(path.clone()))?;
    if found != params.coin_type {
        return Err(BuildError::CoinTypeMismatch {
            path: path.clone(),
            expected: params.coin_type,
            found,
        });
    }
    Ok(())
}

fn check_support(params: &NetworkParams, script_type: ScriptType) -> Result<(), BuildError> {
    let supported = match script_type {
        ScriptType::P2tr => params.taproot,
        ty if ty.is_segwit() => params.segwit,
        _ => true,
    };
    if !supported {
        return Err(BuildError::UnsupportedScriptType(script_type, params.coin));
    }
    Ok(())
}

/// Script type of a key at the path, which must agree with the path purpose
/// and be supported by the coin.
pub(crate) fn path_script_type(
    params: &NetworkParams,
    path: &DerivationPath,
    script_type: Option<ScriptType>,
) -> Result<ScriptType, BuildError> {
    let purpose = path.purpose().ok_or_else(|| BuildError::UnsupportedPath(path.clone()))?;
    let script_type = script_type
        .or_else(|| ScriptType::from_purpose(purpose))
        .ok_or_else(|| BuildError::UnsupportedPath(path.clone()))?;
    if !script_type.accepts_purpose(purpose) {
        return Err(BuildError::ScriptTypeMismatch {
            script_type,
            purpose,
        });
    }
    check_support(params, script_type)?;
    check_coin_type(params, path)?;
    Ok(script_type)
}

fn check_prev_tx(
    index: usize,
    outpoint: Outpoint,
    amount: Sats,
    prev_tx: &Tx,
) -> Result<TxOut, BuildError> {
    let txid = prev_tx.txid();
    if txid != outpoint.txid {
        return Err(BuildError::PrevTxidMismatch {
            expected: outpoint.txid,
            found: txid,
        });
    }
    let txout = prev_tx
        .outputs
        .get(outpoint.vout.to_usize())
        .ok_or(BuildError::MissingPrevOutput(outpoint))?;
    if txout.value != amount {
        return Err(BuildError::AmountMismatch {
            index,
            claimed: amount,
            actual: txout.value,
        });
    }
    Ok(txout.clone())
}

fn warn_script_mismatch(index: usize, spent: &ScriptPubkey, derived: &ScriptPubkey) {
    if spent != derived {
        log::warn!(
            "input {index} spends script {spent:?} while its key produces script {derived:?}"
        );
    }
}

fn apply_payment(
    input: &mut Input,
    meta: &InputMeta,
    pk: &[u8],
    payment: &Payment,
) -> Result<(), BuildError> {
    if meta.script_type.is_segwit() || input.non_witness_tx.is_none() {
        input.witness_utxo = Some(TxOut::new(payment.script_pubkey.clone(), meta.amount));
    }
    input.redeem_script = payment.redeem_script.clone();
    let origin = KeyOrigin::with_path(meta.path.clone());
    if meta.script_type.is_taproot() {
        let internal_key = XOnlyPk::from_slice(pk).map_err(PaymentError::from)?;
        input.tap_internal_key = Some(internal_key);
        input.tap_bip32_derivation.clear();
        input.tap_bip32_derivation.insert(internal_key, TapDerivation::with_internal_pk(origin));
    } else {
        let pk = LegacyPk::from_slice(pk).map_err(PaymentError::from)?;
        input.bip32_derivation.clear();
        input.bip32_derivation.insert(pk, origin);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use bc::{LockTime, SeqNo, TxIn, TxVer, Witness};
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    use super::*;

    fn pubkey(byte: u8) -> Vec<u8> {
        let sk = SecretKey::from_slice(&[byte; 32]).unwrap();
        PublicKey::from_secret_key(SECP256K1, &sk).serialize().to_vec()
    }

    fn path(s: &str) -> DerivationPath { DerivationPath::from_str(s).unwrap() }

    fn prev_tx(script_pubkey: ScriptPubkey, value: u64) -> Tx {
        Tx {
            version: TxVer::V2,
            inputs: vec![TxIn {
                prev_output: Outpoint::new(Txid::from_byte_array([7; 32]), 0u32),
                sig_script: none!(),
                sequence: SeqNo::FINAL,
                witness: Witness::default(),
            }],
            outputs: vec![TxOut::new(script_pubkey, Sats::from_sats(value))],
            lock_time: LockTime::ZERO,
        }
    }

    #[test]
    fn phases() {
        let mut builder = TxBuilder::with_coin(Coin::Bitcoin);
        assert_eq!(builder.phase(), Phase::Built);
        assert_eq!(
            builder.finalize_all_inputs(),
            Err(BuildError::WrongPhase {
                expected: Phase::Witnessed,
                actual: Phase::Built
            })
        );
        assert_eq!(builder.prepare_sign(None), Err(BuildError::EmptyTransaction));
        assert_eq!(
            builder.extract_transaction().unwrap_err().to_string(),
            "operation requires the builder in finalized phase, while it is in built phase."
        );
    }

    #[test]
    fn input_path_checks() {
        let mut builder = TxBuilder::with_coin(Coin::Bitcoin);
        let txid = Txid::from_byte_array([1; 32]);

        let utxo = Utxo::new(txid, 0u32, Sats::from_sats(1000), path("m/84'/2'/0'/0/0"));
        assert_eq!(
            builder.add_input(utxo),
            Err(BuildError::CoinTypeMismatch {
                path: path("m/84'/2'/0'/0/0"),
                expected: 0,
                found: 2
            })
        );

        let utxo = Utxo::new(txid, 0u32, Sats::from_sats(1000), path("m/45'/0'/0'/0/0"));
        assert_eq!(
            builder.add_input(utxo),
            Err(BuildError::UnsupportedPath(path("m/45'/0'/0'/0/0")))
        );

        let utxo = Utxo::new(txid, 0u32, Sats::from_sats(1000), path("m/44'/0'/0'/0/0"));
        assert_eq!(builder.add_input(utxo), Err(BuildError::MissingPrevTx(0)));

        let utxo = Utxo::new(txid, 0u32, Sats::from_sats(1000), path("m/45'/0'/0'/0/0"))
            .with_script_type(ScriptType::P2wpkh)
            .with_public_key(pubkey(1));
        assert_eq!(builder.add_input(utxo), Ok(0));
        assert_eq!(builder.input_count(), 1);
    }

    #[test]
    fn prev_tx_checks() {
        let mut builder = TxBuilder::with_coin(Coin::Bitcoin);
        let pk = pubkey(1);
        let script = Payment::for_script_type(Coin::Bitcoin.params(), ScriptType::P2pkh, &pk)
            .unwrap()
            .script_pubkey;
        let tx = prev_tx(script, 5000);
        let txid = tx.txid();
        let path = path("m/44'/0'/0'/0/0");

        let wrong = Txid::from_byte_array([1; 32]);
        let utxo = Utxo::new(wrong, 0u32, Sats::from_sats(5000), path.clone()).with_prev_tx(tx.clone());
        assert_eq!(
            builder.add_input(utxo),
            Err(BuildError::PrevTxidMismatch {
                expected: wrong,
                found: txid
            })
        );

        let utxo = Utxo::new(txid, 1u32, Sats::from_sats(5000), path.clone()).with_prev_tx(tx.clone());
        assert_eq!(
            builder.add_input(utxo),
            Err(BuildError::MissingPrevOutput(Outpoint::new(txid, 1u32)))
        );

        let utxo = Utxo::new(txid, 0u32, Sats::from_sats(4000), path.clone()).with_prev_tx(tx.clone());
        assert_eq!(
            builder.add_input(utxo),
            Err(BuildError::AmountMismatch {
                index: 0,
                claimed: Sats::from_sats(4000),
                actual: Sats::from_sats(5000)
            })
        );

        let utxo = Utxo::new(txid, 0u32, Sats::from_sats(5000), path).with_prev_tx(tx);
        assert_eq!(builder.add_input(utxo), Ok(0));
        assert_eq!(builder.prepare_sign(None), Err(BuildError::EmptyTransaction));
        let spec = OutputSpec::script(ScriptPubkey::p2wpkh([3; 20]), Sats::from_sats(4000));
        builder.add_output(spec).unwrap();
        assert_eq!(builder.prepare_sign(None), Err(BuildError::MissingPublicKey(0)));

        builder.set_input_public_key(0, &pk).unwrap();
        let requests = builder.prepare_sign(None).unwrap();
        assert_eq!(requests.len(), 1);
        // P2PKH-led requests carry no output confirmation
        assert_eq!(requests[0].confirmation, None);
        assert_eq!(builder.phase(), Phase::PayloadDerived);
    }

    #[test]
    fn output_checks() {
        let mut builder = TxBuilder::with_coin(Coin::Bitcoin);
        let pk = pubkey(2);

        let spec = OutputSpec::path(path("m/84'/0'/0'/0/0"), pk.clone(), Sats::from_sats(1000))
            .with_script_type(ScriptType::P2tr);
        assert_eq!(
            builder.add_output(spec),
            Err(BuildError::ScriptTypeMismatch {
                script_type: ScriptType::P2tr,
                purpose: 84
            })
        );

        let spec = OutputSpec::path(path("m/86'/0'/0'/0/0"), pk.clone(), Sats::from_sats(1000));
        assert_eq!(builder.add_output(spec), Ok(0));
        let output = builder.psbt().output(0).unwrap();
        assert!(output.script.is_p2tr());
        assert!(output.tap_internal_key.is_some());

        let spec = OutputSpec::address("not an address", Sats::from_sats(1));
        assert!(builder.add_output(spec).is_err());
        assert_eq!(
            builder.add_output(OutputSpec::address(
                "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
                Sats::from_sats(1000)
            )),
            Ok(1)
        );

        let change = OutputSpec::change(path("m/84'/0'/0'/1/0"), pk.clone(), Sats::ZERO);
        assert_eq!(builder.add_output(change.clone()), Ok(2));
        assert_eq!(builder.add_output(change), Err(BuildError::MultipleChange));
    }

    #[test]
    fn taproot_unsupported() {
        let mut builder = TxBuilder::with_coin(Coin::Dogecoin);
        let utxo = Utxo::new(
            Txid::from_byte_array([1; 32]),
            0u32,
            Sats::from_sats(1000),
            path("m/86'/3'/0'/0/0"),
        );
        assert_eq!(
            builder.add_input(utxo),
            Err(BuildError::UnsupportedScriptType(ScriptType::P2tr, Coin::Dogecoin))
        );
    }
}
