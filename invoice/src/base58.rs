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

//! Base58check encoding of version-prefixed payloads.

use std::fmt;

pub use bs58::decode::Error;

pub fn encode_check(data: &[u8]) -> String { bs58::encode(data).with_check().into_string() }

pub fn encode_check_to_fmt(f: &mut dyn fmt::Write, data: &[u8]) -> fmt::Result {
    f.write_str(&encode_check(data))
}

/// Decodes base58check string, returning the payload without the checksum.
pub fn decode_check(s: &str) -> Result<Vec<u8>, Error> { bs58::decode(s).with_check(None).into_vec() }
