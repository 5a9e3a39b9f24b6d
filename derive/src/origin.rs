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

use amplify::hex::{self, FromHex, ToHex};

use crate::{DerivationParseError, DerivationPath};

/// Fingerprint of the master key a derivation starts from.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct Fingerprint(#[from] [u8; 4]);

impl Fingerprint {
    pub const fn from_byte_array(bytes: [u8; 4]) -> Self { Fingerprint(bytes) }

    pub const fn to_byte_array(&self) -> [u8; 4] { self.0 }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result { f.write_str(&self.0.to_hex()) }
}

impl FromStr for Fingerprint {
    type Err = hex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> { <[u8; 4]>::from_hex(s).map(Fingerprint) }
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum OriginParseError {
    /// invalid derivation path - {0}
    #[from]
    DerivationPath(DerivationParseError),

    /// invalid master key fingerprint - {0}
    #[from]
    InvalidMasterFp(hex::Error),
}

/// Origin of a key: master key fingerprint and full derivation path.
#[derive(Getters, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display("{master_fp}/{derivation}")]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct KeyOrigin {
    #[getter(as_copy)]
    master_fp: Fingerprint,
    derivation: DerivationPath,
}

impl KeyOrigin {
    pub fn new(master_fp: Fingerprint, derivation: DerivationPath) -> Self {
        KeyOrigin {
            master_fp,
            derivation,
        }
    }

    /// Key origin with an unknown (zero) master fingerprint.
    pub fn with_path(derivation: DerivationPath) -> Self {
        KeyOrigin::new(Fingerprint::default(), derivation)
    }
}

impl FromStr for KeyOrigin {
    type Err = OriginParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (master_fp, path) = match s.split_once('/') {
            Some(("00000000", p)) | Some(("m", p)) => (Fingerprint::default(), p),
            Some((fp, p)) => (Fingerprint::from_str(fp)?, p),
            None => (Fingerprint::default(), s.trim_start_matches('m')),
        };
        let derivation = match path {
            "" => DerivationPath::new(),
            path => DerivationPath::from_str(path)?,
        };
        Ok(KeyOrigin {
            master_fp,
            derivation,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_parse() {
        let origin = KeyOrigin::from_str("d34db33f/84'/0'/0'/1/0").unwrap();
        assert_eq!(origin.master_fp().to_byte_array(), [0xd3, 0x4d, 0xb3, 0x3f]);
        assert_eq!(origin.derivation().purpose(), Some(84));
        assert_eq!(origin.to_string(), "d34db33f/m/84'/0'/0'/1/0");

        let unknown = KeyOrigin::from_str("m/86'/0'/0'/0/0").unwrap();
        assert_eq!(unknown.master_fp(), Fingerprint::default());
        assert!(matches!(
            KeyOrigin::from_str("zz/84'"),
            Err(OriginParseError::InvalidMasterFp(_))
        ));
    }
}
