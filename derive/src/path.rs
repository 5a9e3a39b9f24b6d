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
use std::str::FromStr;

use invoice::ScriptType;

use crate::{DerivationIndex, IndexParseError};

#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum DerivationParseError {
    /// unable to parse derivation path '{0}' - {1}
    InvalidIndex(String, IndexParseError),
    /// invalid derivation path format '{0}'
    InvalidFormat(String),
}

/// Derivation path, which may mix hardened and unhardened indexes.
///
/// Text form is `m/84'/0'/0'/1/0`; the leading `m` is optional when parsing
/// and both `'` and `h` hardened markers are accepted.
#[derive(Wrapper, WrapperMut, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref)]
#[wrapper_mut(DerefMut)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct DerivationPath(Vec<DerivationIndex>);

impl From<&[DerivationIndex]> for DerivationPath {
    fn from(path: &[DerivationIndex]) -> Self { Self(path.to_vec()) }
}

impl From<&[u32]> for DerivationPath {
    fn from(path: &[u32]) -> Self { path.iter().copied().map(DerivationIndex::from_index).collect() }
}

impl Display for DerivationPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("m")?;
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = DerivationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.trim();
        let path = match path.strip_prefix(['m', 'M']) {
            Some("") => return Ok(DerivationPath::new()),
            Some(rest) => rest
                .strip_prefix('/')
                .ok_or_else(|| DerivationParseError::InvalidFormat(s.to_owned()))?,
            None => path.strip_prefix('/').unwrap_or(path),
        };
        if path.is_empty() {
            return Err(DerivationParseError::InvalidFormat(s.to_owned()));
        }
        path.split('/')
            .map(DerivationIndex::from_str)
            .collect::<Result<_, _>>()
            .map_err(|err| DerivationParseError::InvalidIndex(s.to_owned(), err))
    }
}

impl<'path> IntoIterator for &'path DerivationPath {
    type Item = DerivationIndex;
    type IntoIter = std::iter::Copied<std::slice::Iter<'path, DerivationIndex>>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter().copied() }
}

impl FromIterator<DerivationIndex> for DerivationPath {
    fn from_iter<T: IntoIterator<Item = DerivationIndex>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl DerivationPath {
    /// Constructs empty derivation path.
    pub fn new() -> Self { Self(vec![]) }

    /// BIP32 serialized form of all path indexes.
    pub fn to_u32_vec(&self) -> Vec<u32> { self.0.iter().map(DerivationIndex::index).collect() }

    fn hardened_at(&self, pos: usize) -> Option<u32> {
        self.0.get(pos).filter(|idx| idx.is_hardened()).map(DerivationIndex::child_number)
    }

    /// BIP-43 purpose, if the first index is hardened.
    pub fn purpose(&self) -> Option<u32> { self.hardened_at(0) }

    /// BIP-44 coin type, if the second index is hardened.
    pub fn coin_type(&self) -> Option<u32> { self.hardened_at(1) }

    /// BIP-44 account number, if the third index is hardened.
    pub fn account(&self) -> Option<u32> { self.hardened_at(2) }

    /// Detects change (internal) keychain of a full BIP-44 path.
    pub fn is_change(&self) -> bool {
        self.0.len() == 5 && self.0[3] == DerivationIndex::normal(1)
    }

    /// Script type implied by the path purpose.
    pub fn script_type(&self) -> Option<ScriptType> { self.purpose().and_then(ScriptType::from_purpose) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_forms() {
        let path1 = DerivationPath::from_str("m/84'/0'/0'/1/0").unwrap();
        let path2 = DerivationPath::from_str("84h/0h/0h/1/0").unwrap();
        let path3 = DerivationPath::from_str("/84'/0h/0'/1/0").unwrap();
        assert_eq!(path1, path2);
        assert_eq!(path1, path3);
        assert_eq!(path1.to_string(), "m/84'/0'/0'/1/0");
        assert_eq!(path1.to_u32_vec(), vec![0x8000_0054, 0x8000_0000, 0x8000_0000, 1, 0]);
        assert_eq!(DerivationPath::from(&path1.to_u32_vec()[..]), path1);
        assert_eq!(DerivationPath::from_str("m"), Ok(DerivationPath::new()));
        assert_eq!(DerivationPath::new().to_string(), "m");
    }

    #[test]
    fn bip44_fields() {
        let path = DerivationPath::from_str("m/86'/1'/3'/1/7").unwrap();
        assert_eq!(path.purpose(), Some(86));
        assert_eq!(path.coin_type(), Some(1));
        assert_eq!(path.account(), Some(3));
        assert!(path.is_change());
        assert_eq!(path.script_type(), Some(ScriptType::P2tr));

        let unhardened = DerivationPath::from_str("m/84/0").unwrap();
        assert_eq!(unhardened.purpose(), None);
        assert_eq!(unhardened.script_type(), None);
        assert!(!unhardened.is_change());
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            DerivationPath::from_str("m/84'/x"),
            Err(DerivationParseError::InvalidIndex(..))
        ));
        assert!(matches!(
            DerivationPath::from_str("m84'"),
            Err(DerivationParseError::InvalidFormat(_))
        ));
        assert!(matches!(DerivationPath::from_str(""), Err(DerivationParseError::InvalidFormat(_))));
        assert!(matches!(
            DerivationPath::from_str("m/84'//0"),
            Err(DerivationParseError::InvalidIndex(..))
        ));
    }
}
