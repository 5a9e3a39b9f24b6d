// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2023 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2023 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2023 Dr Maxim Orlovsky. All rights reserved.
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

use derive::{
    Bip340Sig, Coin, ConsensusEncode, KeyOrigin, LegacyPk, LegacySig, LockTime, Outpoint,
    RedeemScript, Sats, ScriptPubkey, ScriptType, SeqNo, Tx, TxIn, TxOut, TxVer, Txid, XOnlyPk,
};
use psbt::{
    ExtractError, FinalizeError, KeyMap, MapName, PropKey, Psbt, PsbtError, SignError,
    TapDerivation,
};
use secp256k1::{Keypair, Message, PublicKey, SecretKey, SECP256K1};

fn secret(byte: u8) -> SecretKey { SecretKey::from_slice(&[byte; 32]).unwrap() }

fn legacy_pk(byte: u8) -> LegacyPk {
    LegacyPk::from(PublicKey::from_secret_key(SECP256K1, &secret(byte)))
}

fn funding_tx(script_pubkey: ScriptPubkey, value: u64) -> Tx {
    Tx {
        version: TxVer::V2,
        inputs: vec![TxIn::unsigned(
            Outpoint::new(Txid::from_byte_array([0xAB; 32]), 3u32),
            SeqNo::FINAL,
        )],
        outputs: vec![
            TxOut::new(ScriptPubkey::p2wpkh([0x77; 20]), Sats::from_sats(1)),
            TxOut::new(script_pubkey, Sats::from_sats(value)),
        ],
        lock_time: LockTime::ZERO,
    }
}

/// PSBT spending output 1 of the funding transaction into a single output.
fn spending_psbt(funding: &Tx, amount: u64) -> Psbt {
    let mut psbt = Psbt::default();
    let index = psbt.push_input(Outpoint::new(funding.txid(), 1u32), SeqNo::RBF);
    psbt.push_output(TxOut::new(ScriptPubkey::p2wpkh([0x22; 20]), Sats::from_sats(amount)));
    let input = psbt.input_mut(index).unwrap();
    input.witness_utxo = Some(funding.outputs[1].clone());
    let origin = KeyOrigin::from_str("d90c6a4f/84'/0'/0'/0/5").unwrap();
    input.bip32_derivation.insert(legacy_pk(1), origin);
    psbt
}

fn sign_ecdsa(psbt: &mut Psbt, index: usize, script_type: ScriptType, byte: u8) {
    let digest = psbt.sighash_digest(index, script_type, Coin::Bitcoin.params()).unwrap();
    let sig = SECP256K1.sign_ecdsa(&Message::from_digest(digest), &secret(byte));
    psbt.set_partial_sig(index, legacy_pk(byte), LegacySig::sighash_all(sig)).unwrap();
}

#[test]
fn serialization_roundtrip() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);
    let mut psbt = spending_psbt(&funding, 9_000);
    psbt.push_proprietary(PropKey::new("hwsign", 1, vec![0xAA]), vec![1, 2, 3]).unwrap();

    let data = psbt.serialize();
    assert_eq!(&data[..5], b"psbt\xFF");
    let decoded = Psbt::deserialize(&data).unwrap();
    assert_eq!(decoded, psbt);
    assert_eq!(decoded.serialize(), data);

    let base64 = psbt.to_base64();
    assert_eq!(Psbt::from_str(&base64).unwrap(), psbt);
    assert_eq!(Psbt::from_str(&psbt.to_base16()).unwrap(), psbt);
    assert_eq!(psbt.to_string(), base64);
}

#[test]
fn partial_sigs_survive_roundtrip() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);
    let mut psbt = spending_psbt(&funding, 9_000);
    sign_ecdsa(&mut psbt, 0, ScriptType::P2wpkh, 1);

    let decoded = Psbt::deserialize(psbt.serialize()).unwrap();
    assert_eq!(decoded.input(0).unwrap().partial_sigs.len(), 1);
    assert_eq!(decoded, psbt);
}

#[test]
fn malformed_data() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);
    let data = spending_psbt(&funding, 9_000).serialize();

    let mut bad_magic = data.clone();
    bad_magic[3] = b'u';
    assert_eq!(Psbt::deserialize(&bad_magic), Err(PsbtError::InvalidMagic(*b"psbu\xFF")));

    let mut trailing = data.clone();
    trailing.push(0x00);
    assert_eq!(Psbt::deserialize(&trailing), Err(PsbtError::DataNotConsumed));

    assert_eq!(Psbt::deserialize(&data[..data.len() - 1]), Err(PsbtError::UnexpectedEod));
    assert_eq!(Psbt::deserialize(&data[..3]), Err(PsbtError::UnexpectedEod));
}

#[test]
fn repeated_and_missing_keys() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);
    let psbt = spending_psbt(&funding, 9_000);
    let tx = Tx::from(psbt.to_unsigned_tx()).consensus_serialize();
    let mut pair = vec![0x01, 0x00, tx.len() as u8];
    pair.extend(&tx);

    let mut repeated = b"psbt\xFF".to_vec();
    repeated.extend(&pair);
    repeated.extend(&pair);
    repeated.push(0x00);
    assert_eq!(Psbt::deserialize(&repeated), Err(PsbtError::RepeatedKey(MapName::Global, 0x00)));

    assert_eq!(
        Psbt::deserialize(b"psbt\xFF\x00"),
        Err(PsbtError::RequiredKeyAbsent(MapName::Global, 0x00))
    );
}

#[test]
fn unsupported_version() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);
    let mut psbt = spending_psbt(&funding, 9_000);
    psbt.explicit_version = true;
    let mut data = psbt.serialize();
    assert!(Psbt::deserialize(&data).unwrap().explicit_version);

    // version is the last global field: `01 fb 04 00000000 00`
    let pos = data.windows(3).position(|w| w == [0x01, 0xFB, 0x04]).unwrap();
    data[pos + 3] = 2;
    assert_eq!(Psbt::deserialize(&data), Err(PsbtError::UnsupportedVersion(2)));
}

#[test]
fn non_witness_utxo_must_match() {
    let funding = funding_tx(ScriptPubkey::p2pkh(legacy_pk(1).pubkey_hash()), 10_000);
    let mut psbt = spending_psbt(&funding, 9_000);
    let input = psbt.input_mut(0).unwrap();
    input.witness_utxo = None;
    input.non_witness_tx = Some(funding.clone());
    let decoded = Psbt::deserialize(psbt.serialize()).unwrap();
    assert_eq!(decoded.input(0).unwrap().value(), Some(Sats::from_sats(10_000)));
    assert_eq!(decoded.input(0).unwrap().script_type(), Some(ScriptType::P2pkh));

    let other = funding_tx(ScriptPubkey::p2pkh(legacy_pk(2).pubkey_hash()), 10_000);
    psbt.input_mut(0).unwrap().non_witness_tx = Some(other);
    assert_eq!(Psbt::deserialize(psbt.serialize()), Err(PsbtError::NonWitnessUtxoMismatch(0)));
}

#[test]
fn p2wpkh_finalize_extract() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);
    let mut psbt = spending_psbt(&funding, 9_000);
    assert_eq!(psbt.fee(), Some(Sats::from_sats(1_000)));

    assert_eq!(psbt.extract(), Err(ExtractError::NotFinalized(0)));
    assert_eq!(
        psbt.finalize_input(0, ScriptType::P2wpkh),
        Err(FinalizeError::NoSignature(0))
    );

    sign_ecdsa(&mut psbt, 0, ScriptType::P2wpkh, 1);
    assert_eq!(
        psbt.finalize_all(&[ScriptType::P2wpkh, ScriptType::P2wpkh]),
        Err(FinalizeError::TypesMismatch {
            expected: 1,
            found: 2
        })
    );
    psbt.finalize_all(&[ScriptType::P2wpkh]).unwrap();

    let input = psbt.input(0).unwrap();
    assert!(input.is_finalized());
    assert!(input.partial_sigs.is_empty());
    assert!(input.bip32_derivation.is_empty());
    assert!(input.witness_utxo.is_some());

    let tx = psbt.extract().unwrap();
    assert!(tx.is_segwit());
    assert_eq!(tx.inputs[0].witness.len(), 2);
    assert_eq!(tx.inputs[0].witness[1], legacy_pk(1).to_vec());
    assert!(tx.inputs[0].sig_script.is_empty());
    assert_eq!(tx.txid(), psbt.txid());

    // finalized PSBT still round-trips
    assert_eq!(Psbt::deserialize(psbt.serialize()).unwrap(), psbt);
}

#[test]
fn foreign_signature_is_rejected() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);
    let mut psbt = spending_psbt(&funding, 9_000);
    sign_ecdsa(&mut psbt, 0, ScriptType::P2wpkh, 2);
    assert_eq!(
        psbt.finalize_input(0, ScriptType::P2wpkh),
        Err(FinalizeError::NoMatchingKey(0))
    );
    assert_eq!(
        psbt.finalize_input(0, ScriptType::P2tr),
        Err(FinalizeError::ScriptTypeMismatch {
            index: 0,
            expected: ScriptType::P2tr
        })
    );
    assert_eq!(psbt.finalize_input(1, ScriptType::P2wpkh), Err(FinalizeError::NoInput(1)));
}

#[test]
fn nested_segwit_finalize() {
    let pk = legacy_pk(3);
    let redeem_script = RedeemScript::p2sh_wpkh(pk.pubkey_hash());
    let funding = funding_tx(redeem_script.to_script_pubkey(), 20_000);
    let mut psbt = spending_psbt(&funding, 19_000);
    psbt.input_mut(0).unwrap().redeem_script = Some(redeem_script.clone());
    assert_eq!(psbt.input(0).unwrap().script_type(), Some(ScriptType::P2shP2wpkh));

    sign_ecdsa(&mut psbt, 0, ScriptType::P2shP2wpkh, 3);
    psbt.finalize_input(0, ScriptType::P2shP2wpkh).unwrap();
    assert!(psbt.input(0).unwrap().redeem_script.is_none());

    let tx = psbt.extract().unwrap();
    let mut expected_sig_script = vec![redeem_script.len() as u8];
    expected_sig_script.extend(redeem_script.to_vec());
    assert_eq!(tx.inputs[0].sig_script.to_vec(), expected_sig_script);
    assert_eq!(tx.inputs[0].witness.len(), 2);
}

#[test]
fn legacy_finalize() {
    let pk = legacy_pk(4);
    let funding = funding_tx(ScriptPubkey::p2pkh(pk.pubkey_hash()), 50_000);
    let mut psbt = spending_psbt(&funding, 40_000);
    let input = psbt.input_mut(0).unwrap();
    input.witness_utxo = None;
    input.non_witness_tx = Some(funding);

    sign_ecdsa(&mut psbt, 0, ScriptType::P2pkh, 4);
    psbt.finalize_input(0, ScriptType::P2pkh).unwrap();
    let tx = psbt.extract().unwrap();
    assert!(!tx.is_segwit());
    assert!(!tx.inputs[0].sig_script.is_empty());
}

#[test]
fn taproot_key_path_finalize() {
    let keypair = Keypair::from_secret_key(SECP256K1, &secret(5));
    let xonly = XOnlyPk::from(keypair.x_only_public_key().0);
    let funding = funding_tx(ScriptPubkey::p2tr(xonly.to_byte_array()), 30_000);
    let mut psbt = spending_psbt(&funding, 29_000);
    let origin = KeyOrigin::from_str("d90c6a4f/86'/0'/0'/0/0").unwrap();
    let input = psbt.input_mut(0).unwrap();
    input.tap_internal_key = Some(xonly);
    input.tap_bip32_derivation.insert(xonly, TapDerivation::with_internal_pk(origin));
    assert_eq!(Psbt::deserialize(psbt.serialize()).unwrap(), psbt);

    assert_eq!(
        psbt.sighash_digest(0, ScriptType::P2wpkh, Coin::Bitcoin.params()),
        Err(SignError::ScriptTypeMismatch {
            index: 0,
            expected: ScriptType::P2wpkh
        })
    );
    let digest = psbt.sighash_digest(0, ScriptType::P2tr, Coin::Bitcoin.params()).unwrap();
    let sig = SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(digest), &keypair);
    psbt.set_tap_key_sig(0, Bip340Sig::sighash_default(sig.serialize())).unwrap();
    assert_eq!(Psbt::deserialize(psbt.serialize()).unwrap(), psbt);

    psbt.finalize_input(0, ScriptType::P2tr).unwrap();
    let input = psbt.input(0).unwrap();
    assert!(input.tap_key_sig.is_none());
    assert!(input.tap_internal_key.is_none());
    assert!(input.tap_bip32_derivation.is_empty());

    let tx = psbt.extract().unwrap();
    assert_eq!(tx.inputs[0].witness.len(), 1);
    assert_eq!(tx.inputs[0].witness[0], sig.serialize().to_vec());
}

#[test]
fn fee_floor() {
    let funding = funding_tx(ScriptPubkey::p2wpkh(legacy_pk(1).pubkey_hash()), 10_000);

    let mut psbt = spending_psbt(&funding, 9_950);
    sign_ecdsa(&mut psbt, 0, ScriptType::P2wpkh, 1);
    psbt.finalize_input(0, ScriptType::P2wpkh).unwrap();
    assert!(matches!(
        psbt.extract(),
        Err(ExtractError::InsufficientFee { fee, .. }) if fee == Sats::from_sats(50)
    ));

    let mut psbt = spending_psbt(&funding, 10_001);
    sign_ecdsa(&mut psbt, 0, ScriptType::P2wpkh, 1);
    psbt.finalize_input(0, ScriptType::P2wpkh).unwrap();
    assert_eq!(
        psbt.extract(),
        Err(ExtractError::Overspend {
            input: Sats::from_sats(10_000),
            output: Sats::from_sats(10_001)
        })
    );
}
