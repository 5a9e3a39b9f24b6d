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

//! Verification of signatures returned by the device.

use bc::{
    taproot, Bip340Sig, InvalidPubkey, LegacyPk, LegacySig, ScriptPubkey, SigError, SighashType,
    TaprootError, XOnlyPk,
};
use secp256k1::{ecdsa, Message, SECP256K1};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum SignatureError {
    /// invalid signature encoding - {0}
    #[from]
    Encoding(SigError),

    /// invalid public key - {0}
    #[from]
    Pubkey(InvalidPubkey),

    /// signature is made for sighash type {found:#04x} instead of {expected:#04x}.
    SighashMismatch { expected: u8, found: u8 },

    /// ECDSA signature doesn't match the signing payload and the public key.
    EcdsaMismatch,

    /// public key doesn't match the key of the spent output.
    KeyMismatch,

    #[from]
    #[display(inner)]
    Taproot(TaprootError),
}

fn parse_ecdsa(sig: &[u8], sighash_type: SighashType) -> Result<ecdsa::Signature, SignatureError> {
    if sig.len() == 64 {
        return ecdsa::Signature::from_compact(sig).map_err(|_| SigError::InvalidCompact.into());
    }
    if let Ok(sig) = ecdsa::Signature::from_der(sig) {
        return Ok(sig);
    }
    let (byte, der) = sig.split_last().ok_or(SigError::EmptySignature)?;
    if *byte != sighash_type.to_u8() {
        return Err(SignatureError::SighashMismatch {
            expected: sighash_type.to_u8(),
            found: *byte,
        });
    }
    ecdsa::Signature::from_der(der).map_err(|_| SigError::DerEncoding.into())
}

/// Checks ECDSA signature of the payload digest. The device may return the
/// signature in compact or DER form, optionally followed by the sighash byte.
pub fn verify_ecdsa(
    digest: [u8; 32],
    sig: &[u8],
    pk: &LegacyPk,
    sighash_type: SighashType,
) -> Result<LegacySig, SignatureError> {
    let mut sig = parse_ecdsa(sig, sighash_type)?;
    sig.normalize_s();
    SECP256K1
        .verify_ecdsa(&Message::from_digest(digest), &sig, &pk.pubkey)
        .map_err(|_| SignatureError::EcdsaMismatch)?;
    Ok(LegacySig { sig, sighash_type })
}

/// Checks taproot key-path signature of the payload digest.
///
/// The public key is the internal key: it is tweaked and must match the
/// output key of the spent script, and the signature is checked against the
/// tweaked key. A bare 64-byte signature takes the explicit sighash type of
/// the input, if any, so the stored signature carries the sighash byte.
pub fn verify_bip340(
    digest: [u8; 32],
    sig: &[u8],
    internal_key: &[u8],
    spent: &ScriptPubkey,
    sighash_type: Option<SighashType>,
) -> Result<Bip340Sig, SignatureError> {
    let mut sig = Bip340Sig::from_slice(sig)?;
    if sig.sighash_type.is_none() {
        sig.sighash_type = sighash_type.filter(|ty| ty.is_taproot_compatible());
    }
    let expected = sighash_type.map(SighashType::to_u8).unwrap_or(0);
    if sig.sighash_byte() != expected {
        return Err(SignatureError::SighashMismatch {
            expected,
            found: sig.sighash_byte(),
        });
    }

    let internal_key = XOnlyPk::from_slice(internal_key)?.to_byte_array();
    let output_key = taproot::output_key(&internal_key)?;
    if spent.output_key() != Some(output_key) {
        return Err(SignatureError::KeyMismatch);
    }
    taproot::verify_schnorr(&sig.sig, &digest, &output_key)?;
    Ok(sig)
}

#[cfg(test)]
mod test {
    use secp256k1::{Keypair, PublicKey, Scalar, SecretKey};

    use super::*;

    const DIGEST: [u8; 32] = [0x5A; 32];

    fn secret() -> SecretKey { SecretKey::from_slice(&[0x42; 32]).unwrap() }

    #[test]
    fn ecdsa_forms() {
        let pk = LegacyPk::from(PublicKey::from_secret_key(SECP256K1, &secret()));
        let sig = SECP256K1.sign_ecdsa(&Message::from_digest(DIGEST), &secret());
        let all = SighashType::all();

        let expected = LegacySig { sig, sighash_type: all };
        assert_eq!(verify_ecdsa(DIGEST, &sig.serialize_compact(), &pk, all), Ok(expected));
        assert_eq!(verify_ecdsa(DIGEST, &sig.serialize_der(), &pk, all), Ok(expected));
        assert_eq!(verify_ecdsa(DIGEST, &expected.to_vec(), &pk, all), Ok(expected));

        let none = SighashType::none();
        assert_eq!(
            verify_ecdsa(DIGEST, &expected.to_vec(), &pk, none),
            Err(SignatureError::SighashMismatch {
                expected: 0x02,
                found: 0x01
            })
        );
        assert_eq!(
            verify_ecdsa([0x5B; 32], &sig.serialize_compact(), &pk, all),
            Err(SignatureError::EcdsaMismatch)
        );
        assert_eq!(
            verify_ecdsa(DIGEST, &[], &pk, all),
            Err(SignatureError::Encoding(SigError::EmptySignature))
        );
    }

    #[test]
    fn bip340_tweaked_key() {
        let keypair = Keypair::from_secret_key(SECP256K1, &secret());
        let internal_key = keypair.x_only_public_key().0.serialize();
        let tweak = taproot::tap_tweak_hash(&internal_key, None);
        let tweaked = keypair
            .add_xonly_tweak(SECP256K1, &Scalar::from_be_bytes(tweak).unwrap())
            .unwrap();
        let output_key = taproot::output_key(&internal_key).unwrap();
        assert_eq!(tweaked.x_only_public_key().0.serialize(), output_key);
        let spent = ScriptPubkey::p2tr(output_key);

        let sig = SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(DIGEST), &tweaked);
        let sig = sig.serialize();
        assert_eq!(
            verify_bip340(DIGEST, &sig, &internal_key, &spent, None),
            Ok(Bip340Sig::sighash_default(sig))
        );

        // compressed form of the internal key is accepted too
        let compressed = PublicKey::from_secret_key(SECP256K1, &secret()).serialize();
        assert!(verify_bip340(DIGEST, &sig, &compressed, &spent, None).is_ok());

        assert_eq!(
            verify_bip340(DIGEST, &sig, &output_key, &spent, None),
            Err(SignatureError::KeyMismatch)
        );
        assert_eq!(
            verify_bip340([0; 32], &sig, &internal_key, &spent, None),
            Err(SignatureError::Taproot(TaprootError::InvalidSignature))
        );
        let all = Some(SighashType::all());
        assert_eq!(verify_bip340(DIGEST, &sig, &internal_key, &spent, all), Ok(Bip340Sig {
            sig,
            sighash_type: all
        }));
        let mut with_none = sig.to_vec();
        with_none.push(0x02);
        assert_eq!(
            verify_bip340(DIGEST, &with_none, &internal_key, &spent, all),
            Err(SignatureError::SighashMismatch {
                expected: 0x01,
                found: 0x02
            })
        );
        with_none[64] = 0x01;
        assert_eq!(
            verify_bip340(DIGEST, &with_none, &internal_key, &spent, None),
            Err(SignatureError::SighashMismatch {
                expected: 0x00,
                found: 0x01
            })
        );

        // signature made by the untweaked key is rejected
        let untweaked = SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(DIGEST), &keypair);
        assert!(verify_bip340(DIGEST, &untweaked.serialize(), &internal_key, &spent, None).is_err());
    }
}
