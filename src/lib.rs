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

//! Transaction construction and signing engine for hardware wallets.
//!
//! The device holds the keys and signs payloads derived here; the engine
//! builds the transaction, frames the signing requests under the device size
//! limit, verifies the returned signatures and finalizes the transaction.

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod config;
mod fees;
mod request;
mod verify;
mod builder;
mod coin;

pub use bc::*;
pub use builder::{BuildError, OutputDest, OutputSpec, Phase, TxBuilder, Utxo};
pub use coin::CoinApp;
pub use config::{BuilderConfig, DEFAULT_MAX_REQUEST_SIZE};
pub use derive::*;
pub use fees::{
    dust_threshold, estimate_dust_threshold, estimate_vsize, estimate_weight, input_base_weight,
    input_witness_weight, template_script, FeeRate,
};
pub use psbt::{
    ExtractError, FinalizeError, Input as PsbtInput, Output as PsbtOutput, Psbt, PsbtError,
    PsbtParseError, SignError,
};
pub use request::{
    pack_requests, BatchError, CompactFraming, ConfirmedDest, ConfirmedOutput, KeyRequest,
    OutputConfirmation, RequestFraming, SignRequest, SigningPayload,
};
pub use verify::{verify_bip340, verify_ecdsa, SignatureError};
