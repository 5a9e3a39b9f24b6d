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

use std::ops::Deref;

use bc::ScriptBytes;
use derive::KeyOrigin;

use crate::PsbtError;

/// Leaf version of tapscript (BIP-342).
pub const TAPROOT_LEAF_TAPSCRIPT: u8 = 0xC0;

const TAPROOT_MAX_DEPTH: u8 = 128;

/// Taproot control block: leaf version with output key parity, internal key
/// and the merkle path. Kept as raw bytes since script-path spending is not
/// performed; only the length is validated.
///
/// Can only be constructed through [`ControlBlock::try_from_vec`], so the
/// accessors may rely on the minimal length of 33 bytes.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct ControlBlock(Vec<u8>);

impl Deref for ControlBlock {
    type Target = [u8];
    fn deref(&self) -> &Self::Target { &self.0 }
}

impl AsRef<[u8]> for ControlBlock {
    fn as_ref(&self) -> &[u8] { &self.0 }
}

impl ControlBlock {
    pub fn try_from_vec(data: Vec<u8>) -> Result<Self, PsbtError> {
        let len = data.len();
        if len < 33 || (len - 33) % 32 != 0 || (len - 33) / 32 > TAPROOT_MAX_DEPTH as usize {
            return Err(PsbtError::InvalidControlBlock(len));
        }
        Ok(ControlBlock(data))
    }

    pub fn leaf_version(&self) -> u8 { self.0[0] & 0xFE }

    pub fn internal_key(&self) -> [u8; 32] {
        let mut key = [0u8; 32];
        key.copy_from_slice(&self.0[1..33]);
        key
    }

    pub fn merkle_path_len(&self) -> usize { (self.0.len() - 33) / 32 }

    pub fn as_slice(&self) -> &[u8] { &self.0 }

    pub fn into_vec(self) -> Vec<u8> { self.0 }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct LeafScript {
    pub version: u8,
    pub script: ScriptBytes,
}

impl LeafScript {
    pub fn tapscript(script: impl Into<ScriptBytes>) -> Self {
        LeafScript {
            version: TAPROOT_LEAF_TAPSCRIPT,
            script: script.into(),
        }
    }
}

/// Leaf hashes a key participates in, together with the key origin.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TapDerivation {
    pub leaf_hashes: Vec<[u8; 32]>,
    pub origin: KeyOrigin,
}

impl TapDerivation {
    /// Derivation of a key-path-only key, which has no leaf hashes.
    pub fn with_internal_pk(origin: KeyOrigin) -> Self {
        TapDerivation {
            leaf_hashes: vec![],
            origin,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TapLeaf {
    pub depth: u8,
    pub version: u8,
    pub script: ScriptBytes,
}

/// Taproot script tree as a depth-first list of leaves.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct TapTree(Vec<TapLeaf>);

impl TapTree {
    /// Checks that the leaves, given in depth-first order, form a complete
    /// binary tree.
    pub fn from_leaves(leaves: Vec<TapLeaf>) -> Option<Self> {
        let mut stack = Vec::<u8>::with_capacity(TAPROOT_MAX_DEPTH as usize);
        for leaf in &leaves {
            if leaf.depth > TAPROOT_MAX_DEPTH {
                return None;
            }
            let mut depth = leaf.depth;
            while stack.last() == Some(&depth) {
                stack.pop();
                depth = depth.checked_sub(1)?;
            }
            if stack.last() == Some(&0) || (depth == 0 && !stack.is_empty()) {
                return None;
            }
            stack.push(depth);
        }
        if stack != [0] {
            return None;
        }
        Some(TapTree(leaves))
    }

    pub fn leaves(&self) -> &[TapLeaf] { &self.0 }
}
