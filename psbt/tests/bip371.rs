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

use std::str::FromStr;

use psbt::{Psbt, PsbtError, PsbtParseError};

/// Parses the PSBT and checks that it serializes back into the same bytes.
fn parse_roundtrip(s: &str) -> Psbt {
    let s = s.trim();
    let psbt = Psbt::from_str(s).unwrap();
    assert_eq!(psbt.to_base16(), s);
    assert_eq!(Psbt::from_str(&psbt.to_string()).unwrap(), psbt);
    psbt
}

/// Case: PSBT with one P2TR key only input with internal key and its derivation path.
#[test]
fn keyonly_in() {
    let psbt = parse_roundtrip(include_str!("valid.tr/keyonly_in.psbt"));
    let input = psbt.input(0).unwrap();
    assert!(input.tap_internal_key.is_some());
    assert_eq!(input.tap_bip32_derivation.len(), 1);
    assert!(input.tap_key_sig.is_none());
}

/// Case: PSBT with one P2TR key only input with internal key, its derivation path, and signature.
#[test]
fn keyonly_signed() {
    let psbt = parse_roundtrip(include_str!("valid.tr/keyonly_signed.psbt"));
    let sig = psbt.input(0).unwrap().tap_key_sig.unwrap();
    assert_eq!(sig.sighash_type, None);
}

/// Case: PSBT with one P2TR key only output with internal key and its derivation path.
#[test]
fn keyonly_out() {
    let psbt = parse_roundtrip(include_str!("valid.tr/keyonly_out.psbt"));
    let output = psbt.output(0).unwrap();
    assert!(output.tap_internal_key.is_some());
    assert_eq!(output.tap_bip32_derivation.len(), 1);
}

/// Case: PSBT with one P2TR script path only input with dummy internal key, scripts, derivation
/// paths for keys in the scripts, and merkle root.
#[test]
fn script_in() {
    let psbt = parse_roundtrip(include_str!("valid.tr/script_in.psbt"));
    let input = psbt.input(0).unwrap();
    assert_eq!(input.tap_leaf_script.len(), 3);
    assert_eq!(input.tap_bip32_derivation.len(), 4);
    assert!(input.tap_merkle_root.is_some());
    let depths = input.tap_leaf_script.keys().map(|cb| (cb.len() - 33) / 32).collect::<Vec<_>>();
    assert_eq!(depths, vec![2, 1, 2]);
    assert!(input.tap_leaf_script.keys().all(|cb| cb.leaf_version() == 0xC0));
}

/// Case: PSBT with one P2TR script path only output with dummy internal key, taproot tree, and
/// script key derivation paths.
#[test]
fn script_out() {
    let psbt = parse_roundtrip(include_str!("valid.tr/script_out.psbt"));
    let output = psbt.output(0).unwrap();
    assert_eq!(output.tap_tree.as_ref().unwrap().leaves().len(), 3);
    assert_eq!(output.tap_bip32_derivation.len(), 4);
}

/// Case: PSBT with one P2TR script path only input with dummy internal key, scripts, script key
/// derivation paths, merkle root, and script path signatures.
#[test]
fn script_signed() {
    let psbt = parse_roundtrip(include_str!("valid.tr/script_signed.psbt"));
    assert_eq!(psbt.input(0).unwrap().tap_script_sig.len(), 3);
}

fn parse_err(s: &str) -> PsbtError {
    match Psbt::from_str(s.trim()) {
        Err(PsbtParseError::Psbt(err)) => err,
        other => panic!("unexpected parse result {other:?}"),
    }
}

/// Case: PSBT with a P2TR input whose internal key has key data.
#[test]
fn internal_key_len() { parse_err(include_str!("invalid.tr/internal_key_len.psbt")); }

/// Case: PSBT with a P2TR input with a 66 byte key path signature.
#[test]
fn key_sig_len() { parse_err(include_str!("invalid.tr/key_sig_len.psbt")); }

/// Case: PSBT with a P2TR input whose taproot derivation key is 33 bytes.
#[test]
fn derivation_key_len() { parse_err(include_str!("invalid.tr/derivation_key_len.psbt")); }

/// Case: PSBT with a P2TR output whose internal key has key data.
#[test]
fn out_internal_key_len() { parse_err(include_str!("invalid.tr/out_internal_key_len.psbt")); }

/// Case: PSBT with a P2TR output whose taproot derivation key is 33 bytes.
#[test]
fn out_derivation_key_len() { parse_err(include_str!("invalid.tr/out_derivation_key_len.psbt")); }

/// Case: PSBT with a P2TR input whose script signature key is 65 bytes.
#[test]
fn script_sig_key_len() { parse_err(include_str!("invalid.tr/script_sig_key_len.psbt")); }

/// Case: PSBT with a P2TR input with a 66 byte script path signature.
#[test]
fn script_sig_len() { parse_err(include_str!("invalid.tr/script_sig_len.psbt")); }

/// Case: PSBT with a P2TR input with a truncated script path signature.
#[test]
fn script_sig_short() { parse_err(include_str!("invalid.tr/script_sig_short.psbt")); }

/// Case: PSBT with a P2TR input whose control block is one byte longer than a single merkle step.
#[test]
fn control_block_len() {
    assert_eq!(
        parse_err(include_str!("invalid.tr/control_block_len.psbt")),
        PsbtError::InvalidControlBlock(98)
    );
}

/// Case: PSBT with a P2TR input whose control block is one byte shorter than two merkle steps.
#[test]
fn control_block_short() {
    assert_eq!(
        parse_err(include_str!("invalid.tr/control_block_short.psbt")),
        PsbtError::InvalidControlBlock(96)
    );
}
