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

//! Virtual size estimation and fee & dust policy.

use bc::{ScriptPubkey, Sats, TxOut, VarInt};
use invoice::{NetworkParams, ScriptType};

/// Fee rate, in satoshis per 1000 virtual bytes.
#[derive(Wrapper, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Default, Debug, From)]
#[wrapper(Deref)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct FeeRate(u64);

impl FeeRate {
    pub const fn from_sat_per_kvb(rate: u64) -> Self { FeeRate(rate) }

    pub const fn from_sat_per_vb(rate: u64) -> Self { FeeRate(rate.saturating_mul(1000)) }

    pub const fn sat_per_kvb(self) -> u64 { self.0 }

    /// Fee for a transaction of the given virtual size, rounded up.
    pub fn fee(self, vsize: usize) -> Sats {
        Sats::from_sats((self.0.saturating_mul(vsize as u64)).div_ceil(1000))
    }
}

/// Non-witness weight of an input spending the script type, with a
/// 72-byte DER signature and a compressed public key.
pub const fn input_base_weight(script_type: ScriptType) -> usize {
    match script_type {
        // outpoint 36 + script length 1 + scriptSig 107 + sequence 4
        ScriptType::P2pkh => 148 * 4,
        // scriptSig additionally pushes the 25-byte redeem script
        ScriptType::P2shP2pkh => 174 * 4,
        // scriptSig pushes the 22-byte witness program
        ScriptType::P2shP2wpkh => 64 * 4,
        ScriptType::P2wpkh | ScriptType::P2tr => 41 * 4,
    }
}

/// Weight of the witness of an input spending the script type.
pub const fn input_witness_weight(script_type: ScriptType) -> usize {
    match script_type {
        ScriptType::P2pkh | ScriptType::P2shP2pkh => 0,
        // item count, signature with its length, public key with its length
        ScriptType::P2shP2wpkh | ScriptType::P2wpkh => 1 + 1 + 72 + 1 + 33,
        ScriptType::P2tr => 1 + 1 + 64,
    }
}

/// Estimated weight of a transaction spending inputs of the given types.
pub fn estimate_weight(inputs: &[ScriptType], outputs: &[TxOut]) -> usize {
    let segwit = inputs.iter().any(|ty| ty.is_segwit());
    let mut weight = (4 + 4) * 4;
    weight += VarInt::with(inputs.len()).len() * 4;
    weight += VarInt::with(outputs.len()).len() * 4;
    if segwit {
        // marker and flag
        weight += 2;
    }
    for script_type in inputs {
        weight += input_base_weight(*script_type) + input_witness_weight(*script_type);
        if segwit && !script_type.is_segwit() {
            // empty witness stack
            weight += 1;
        }
    }
    weight + outputs.iter().map(|txout| txout.serialized_len() * 4).sum::<usize>()
}

/// Estimated virtual size of a transaction spending inputs of the given types.
pub fn estimate_vsize(inputs: &[ScriptType], outputs: &[TxOut]) -> usize {
    estimate_weight(inputs, outputs).div_ceil(4)
}

const DUST_SPEND_SIZE_LEGACY: u64 = 148;
const DUST_SPEND_SIZE_WITNESS: u64 = 67;

/// Minimal value of an output with the script which is not dust under the
/// coin relay policy.
///
/// The cost of spending the output is approximated by a fixed input size: a
/// P2PKH input for non-witness scripts and a P2WPKH input for witness
/// programs, whatever the actual script is. Unspendable `OP_RETURN` outputs
/// have no threshold.
pub fn dust_threshold(params: &NetworkParams, script_pubkey: &ScriptPubkey) -> Sats {
    if script_pubkey.is_op_return() {
        return Sats::ZERO;
    }
    let spend_size = match script_pubkey.is_witness_program() {
        true => DUST_SPEND_SIZE_WITNESS,
        false => DUST_SPEND_SIZE_LEGACY,
    };
    let output_size = TxOut::new(script_pubkey.clone(), Sats::ZERO).serialized_len() as u64;
    Sats::from_sats((output_size + spend_size) * params.dust_relay_fee / 1000)
}

/// Template script of the type, used where only the type of an output is known.
pub fn template_script(script_type: ScriptType) -> ScriptPubkey {
    match script_type {
        ScriptType::P2pkh => ScriptPubkey::p2pkh([0; 20]),
        ScriptType::P2shP2pkh | ScriptType::P2shP2wpkh => ScriptPubkey::p2sh([0; 20]),
        ScriptType::P2wpkh => ScriptPubkey::p2wpkh([0; 20]),
        ScriptType::P2tr => ScriptPubkey::p2tr([0; 32]),
    }
}

/// Dust threshold of an output of the given script type.
pub fn estimate_dust_threshold(params: &NetworkParams, script_type: ScriptType) -> Sats {
    dust_threshold(params, &template_script(script_type))
}
