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

//! Consensus-level data structures and algorithms used by the signing engine:
//! binary coding, scripts, transactions, signature hashes and taproot
//! primitives.

#[macro_use]
extern crate amplify;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod coding;
pub mod hashes;
pub mod opcodes;
mod script;
mod sigtypes;
mod sats;
mod keys;
mod tx;
mod sighash;
pub mod taproot;

pub use coding::{
    consensus_deserialize, consensus_serialize, ConsensusDataError, ConsensusDecode,
    ConsensusDecodeError, ConsensusEncode, VarInt,
};
pub use hashes::DigestAlgo;
pub use keys::{InvalidPubkey, LegacyPk, XOnlyPk};
pub use sats::{Sats, SatsParseError};
pub use script::{
    compile, decompile, Chunk, RedeemScript, ScriptBytes, ScriptError, ScriptPubkey, SigScript,
    WitnessScript,
};
pub use sighash::{SighashCache, SighashError, TapSighash};
pub use sigtypes::{
    decode_sig, encode_sig, Bip340Sig, LegacySig, NonStandardSighashType, SigError, SighashFlag,
    SighashType, SIGHASH_ANYONECANPAY, SIGHASH_FORKID,
};
pub use taproot::TaprootError;
pub use tx::{
    LockTime, Outpoint, SeqNo, Tx, TxIn, TxOut, TxParseError, TxVer, Txid, TxidParseError, Vout,
    Witness,
};
