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

/// Indexes at or above the boundary are hardened.
pub const HARDENED_INDEX_BOUNDARY: u32 = 1 << 31;

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum IndexParseError {
    /// child number {0} exceeds the maximal value of 2147483647.
    OutOfRange(u32),

    #[from]
    /// invalid index string representation - {0}
    Parse(ParseIntError),
}

/// Single segment of a derivation path, kept in the BIP32 serialized form in
/// which the devices receive it.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct DerivationIndex(u32);

impl DerivationIndex {
    pub const fn normal(child_number: u16) -> Self { DerivationIndex(child_number as u32) }

    pub const fn hardened(child_number: u16) -> Self {
        DerivationIndex(child_number as u32 | HARDENED_INDEX_BOUNDARY)
    }

    pub fn try_normal(child_number: u32) -> Result<Self, IndexParseError> {
        if child_number >= HARDENED_INDEX_BOUNDARY {
            return Err(IndexParseError::OutOfRange(child_number));
        }
        Ok(DerivationIndex(child_number))
    }

    pub fn try_hardened(child_number: u32) -> Result<Self, IndexParseError> {
        let normal = DerivationIndex::try_normal(child_number)?;
        Ok(DerivationIndex(normal.0 | HARDENED_INDEX_BOUNDARY))
    }

    /// Constructs index out of its BIP32 serialized `u32` value.
    pub const fn from_index(value: u32) -> Self { DerivationIndex(value) }

    /// BIP32 serialized value, with the highest bit set for hardened indexes.
    #[inline]
    pub const fn index(&self) -> u32 { self.0 }

    /// Index value without the hardened flag.
    #[inline]
    pub const fn child_number(&self) -> u32 { self.0 & !HARDENED_INDEX_BOUNDARY }

    #[inline]
    pub const fn is_hardened(&self) -> bool { self.0 >= HARDENED_INDEX_BOUNDARY }
}

impl From<u32> for DerivationIndex {
    fn from(value: u32) -> Self { DerivationIndex(value) }
}

impl From<DerivationIndex> for u32 {
    fn from(index: DerivationIndex) -> Self { index.0 }
}

impl Display for DerivationIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.child_number(), f)?;
        if self.is_hardened() {
            f.write_str("'")?;
        }
        Ok(())
    }
}

impl FromStr for DerivationIndex {
    type Err = IndexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_suffix(['h', 'H', '\'']) {
            Some(child) => DerivationIndex::try_hardened(u32::from_str(child)?),
            None => DerivationIndex::try_normal(u32::from_str(s)?),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn index_values() {
        assert_eq!(DerivationIndex::from_index(0x8000_0054), DerivationIndex::hardened(84));
        assert_eq!(DerivationIndex::from_index(0x7FFF_FFFF).index(), 0x7FFF_FFFF);
        assert_eq!(DerivationIndex::hardened(0).index(), HARDENED_INDEX_BOUNDARY);
        assert_eq!(DerivationIndex::hardened(84).child_number(), 84);
        assert!(!DerivationIndex::normal(1).is_hardened());
        assert_eq!(u32::from(DerivationIndex::hardened(1)), 0x8000_0001);
    }

    #[test]
    fn parse_display() {
        assert_eq!(DerivationIndex::from_str("84'"), Ok(DerivationIndex::hardened(84)));
        assert_eq!(DerivationIndex::from_str("84h"), Ok(DerivationIndex::hardened(84)));
        assert_eq!(DerivationIndex::from_str("7"), Ok(DerivationIndex::normal(7)));
        assert_eq!(DerivationIndex::hardened(84).to_string(), "84'");
        assert_eq!(DerivationIndex::normal(5).to_string(), "5");
        assert_eq!(
            DerivationIndex::from_str("2147483648"),
            Err(IndexParseError::OutOfRange(2147483648))
        );
        assert_eq!(
            DerivationIndex::from_str("2147483648'"),
            Err(IndexParseError::OutOfRange(2147483648))
        );
        assert!(matches!(DerivationIndex::from_str("x"), Err(IndexParseError::Parse(_))));
        assert!(matches!(DerivationIndex::from_str(""), Err(IndexParseError::Parse(_))));
    }
}
