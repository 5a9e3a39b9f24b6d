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

use bc::{LockTime, SeqNo, SighashType, TxVer};

/// Size of a single device request, in bytes, used unless configured otherwise.
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024;

/// Runtime configuration of a transaction build.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct BuilderConfig {
    /// Ceiling for the framed size of a single signing request.
    pub max_request_size: usize,

    /// Whether inputs spending P2PKH and P2SH-P2PKH outputs must carry the
    /// full previous transaction.
    pub require_prev_tx_for_legacy: bool,

    pub sequence: SeqNo,
    pub lock_time: LockTime,
    pub tx_version: TxVer,

    /// Sighash type applied to inputs which don't request their own. When
    /// absent the coin default is used.
    pub default_sighash: Option<SighashType>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            require_prev_tx_for_legacy: true,
            sequence: SeqNo::FINAL,
            lock_time: LockTime::ZERO,
            tx_version: TxVer::V2,
            default_sighash: None,
        }
    }
}

impl BuilderConfig {
    pub fn with_max_request_size(max_request_size: usize) -> Self {
        BuilderConfig {
            max_request_size,
            ..BuilderConfig::default()
        }
    }
}
