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

use std::fmt::{self, Display, Formatter};
use std::num::ParseIntError;
use std::str::FromStr;

use crate::{ConsensusDecode, ConsensusDecodeError, ConsensusEncode};

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum SatsParseError {
    /// empty string can't be parsed as a satoshi amount.
    Empty,

    /// invalid satoshi amount '{0}': {1}
    InvalidNumber(String, ParseIntError),
}

/// Amount of satoshis. Values larger than 2^53 often arrive from clients as
/// numeric strings, so the type parses from decimal text.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct Sats(u64);

impl Sats {
    pub const ZERO: Self = Sats(0);

    pub const fn from_sats(sats: u64) -> Self { Sats(sats) }
    pub const fn sats(self) -> u64 { self.0 }

    pub fn checked_add(self, other: impl Into<Sats>) -> Option<Sats> {
        self.0.checked_add(other.into().0).map(Sats)
    }
    pub fn checked_sub(self, other: impl Into<Sats>) -> Option<Sats> {
        self.0.checked_sub(other.into().0).map(Sats)
    }
    pub fn saturating_sub(self, other: impl Into<Sats>) -> Sats {
        Sats(self.0.saturating_sub(other.into().0))
    }

    /// Sums amounts, returning `None` on overflow.
    pub fn checked_sum(iter: impl IntoIterator<Item = Sats>) -> Option<Sats> {
        iter.into_iter().try_fold(Sats::ZERO, |sum, sats| sum.checked_add(sats))
    }
}

impl Display for Sats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { Display::fmt(&self.0, f) }
}

impl FromStr for Sats {
    type Err = SatsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SatsParseError::Empty);
        }
        u64::from_str(s)
            .map(Sats)
            .map_err(|err| SatsParseError::InvalidNumber(s.to_owned(), err))
    }
}

impl ConsensusEncode for Sats {
    fn consensus_encode(&self, writer: &mut impl std::io::Write) -> Result<usize, amplify::IoError> {
        self.0.consensus_encode(writer)
    }
}

impl ConsensusDecode for Sats {
    fn consensus_decode(reader: &mut impl std::io::Read) -> Result<Self, ConsensusDecodeError> {
        u64::consensus_decode(reader).map(Sats)
    }
}
