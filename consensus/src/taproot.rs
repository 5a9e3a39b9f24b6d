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

//! Taproot key primitives: x-only point lifting, key tweaking (BIP-341) and
//! Schnorr signature verification (BIP-340).

use secp256k1::{Parity, PublicKey, Scalar, SecretKey, XOnlyPublicKey, SECP256K1};

use crate::hashes::tagged_hash;

/// Secp256k1 field prime, big-endian.
const FIELD_PRIME: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF, 0xFF, 0xFC, 0x2F,
];

/// Secp256k1 curve order, big-endian.
const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum TaprootError {
    /// x coordinate doesn't correspond to a point on the secp256k1 curve.
    NotOnCurve,

    /// tweak value is not a valid scalar or produces the point at infinity.
    InvalidTweak,

    /// Schnorr signature is invalid.
    InvalidSignature,
}

/// Lifts x-only key to the curve point with even y coordinate.
pub fn lift_x(x: &[u8; 32]) -> Result<PublicKey, TaprootError> {
    let xonly = XOnlyPublicKey::from_slice(x).map_err(|_| TaprootError::NotOnCurve)?;
    Ok(PublicKey::from_x_only_public_key(xonly, Parity::Even))
}

/// Returns x coordinate of `lift_x(key) + tweak·G`.
pub fn tweak(key: &[u8; 32], tweak: &[u8; 32]) -> Result<[u8; 32], TaprootError> {
    let xonly = XOnlyPublicKey::from_slice(key).map_err(|_| TaprootError::NotOnCurve)?;
    let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| TaprootError::InvalidTweak)?;
    let (tweaked, _) = xonly.add_tweak(SECP256K1, &scalar).map_err(|_| TaprootError::InvalidTweak)?;
    Ok(tweaked.serialize())
}

/// `TapTweak` tagged hash of the internal key and an optional script tree root.
pub fn tap_tweak_hash(internal_key: &[u8; 32], merkle_root: Option<&[u8; 32]>) -> [u8; 32] {
    match merkle_root {
        Some(root) => tagged_hash("TapTweak", &[internal_key, root]),
        None => tagged_hash("TapTweak", &[internal_key]),
    }
}

/// Output key of a key-path-only taproot output (BIP-86).
pub fn output_key(internal_key: &[u8; 32]) -> Result<[u8; 32], TaprootError> {
    tweak(internal_key, &tap_tweak_hash(internal_key, None))
}

fn is_zero(val: &[u8; 32]) -> bool { val.iter().all(|b| *b == 0) }

/// Reduces a 256-bit big-endian value modulo curve order. A single subtraction
/// suffices since the value is below `2·n`.
fn reduce_mod_order(mut val: [u8; 32]) -> [u8; 32] {
    if val < CURVE_ORDER {
        return val;
    }
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut digit = val[i] as i16 - CURVE_ORDER[i] as i16 - borrow;
        borrow = 0;
        if digit < 0 {
            digit += 256;
            borrow = 1;
        }
        val[i] = digit as u8;
    }
    val
}

fn mul_generator(scalar: &[u8; 32]) -> Result<Option<PublicKey>, TaprootError> {
    if is_zero(scalar) {
        return Ok(None);
    }
    let sk = SecretKey::from_slice(scalar).map_err(|_| TaprootError::InvalidSignature)?;
    Ok(Some(PublicKey::from_secret_key(SECP256K1, &sk)))
}

/// Verifies BIP-340 signature of a 32-byte message under an x-only key.
pub fn verify_schnorr(
    sig: &[u8; 64],
    msg: &[u8; 32],
    key: &[u8; 32],
) -> Result<(), TaprootError> {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&sig[..32]);
    s.copy_from_slice(&sig[32..]);
    if r >= FIELD_PRIME || s >= CURVE_ORDER {
        return Err(TaprootError::InvalidSignature);
    }

    let point = lift_x(key)?;
    let e = reduce_mod_order(tagged_hash("BIP0340/challenge", &[&r, key, msg]));

    // R = s·G - e·P
    let s_g = mul_generator(&s)?;
    let minus_e_p = if is_zero(&e) {
        None
    } else {
        let scalar = Scalar::from_be_bytes(e).map_err(|_| TaprootError::InvalidSignature)?;
        let e_p = point.mul_tweak(SECP256K1, &scalar).map_err(|_| TaprootError::InvalidSignature)?;
        Some(e_p.negate(SECP256K1))
    };
    let big_r = match (s_g, minus_e_p) {
        (Some(a), Some(b)) => a.combine(&b).map_err(|_| TaprootError::InvalidSignature)?,
        (Some(p), None) | (None, Some(p)) => p,
        (None, None) => return Err(TaprootError::InvalidSignature),
    };

    let (x, parity) = big_r.x_only_public_key();
    if parity != Parity::Even || x.serialize() != r {
        return Err(TaprootError::InvalidSignature);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use amplify::hex::{FromHex, ToHex};
    use secp256k1::{Keypair, Message};

    use super::*;

    fn arr<const N: usize>(hex: &str) -> [u8; N] {
        Vec::<u8>::from_hex(hex).unwrap().try_into().unwrap()
    }

    #[test]
    fn bip340_vectors() {
        let key = arr("f9308a019258c31049344f85f89d5229b531c845836f99b08601f113bce036f9");
        let msg = [0u8; 32];
        let sig = arr(
            "e907831f80848d1069a5371b402410364bdf1c5f8307b0084c55f1ce2dca821525f66a4a85ea8b71e482a74f382d2ce5ebeee8fdb2172f477df4900d310536c0",
        );
        assert_eq!(verify_schnorr(&sig, &msg, &key), Ok(()));

        let key = arr("dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659");
        let msg = arr("243f6a8885a308d313198a2e03707344a4093822299f31d0082efa98ec4e6c89");
        let sig = arr(
            "6896bd60eeae296db48a229ff71dfe071bde413e6d43f917dc8dcf8c78de33418906d11ac976abccb20b091292bff4ea897efcb639ea871cfa95f6de339e4b0a",
        );
        assert_eq!(verify_schnorr(&sig, &msg, &key), Ok(()));

        let mut wrong = msg;
        wrong[0] ^= 1;
        assert_eq!(verify_schnorr(&sig, &wrong, &key), Err(TaprootError::InvalidSignature));

        let mut sig_r_overflow = sig;
        sig_r_overflow[..32].copy_from_slice(&FIELD_PRIME);
        assert_eq!(
            verify_schnorr(&sig_r_overflow, &msg, &key),
            Err(TaprootError::InvalidSignature)
        );
        let mut sig_s_overflow = sig;
        sig_s_overflow[32..].copy_from_slice(&CURVE_ORDER);
        assert_eq!(
            verify_schnorr(&sig_s_overflow, &msg, &key),
            Err(TaprootError::InvalidSignature)
        );
    }

    #[test]
    fn bip86_output_key() {
        let internal = arr("cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115");
        assert_eq!(
            output_key(&internal).unwrap().to_hex(),
            "a60869f0dbcf1dc659c9cecbaf8050135ea9e8cdc487053f1dc6880949dc684c"
        );
    }

    #[test]
    fn lift_and_tweak_errors() {
        assert_eq!(lift_x(&[0xFF; 32]), Err(TaprootError::NotOnCurve));
        let key = arr("dff1d77f2a671c5f36183726db2341be58feae1da2deced843240f7b502ba659");
        assert_eq!(tweak(&key, &CURVE_ORDER), Err(TaprootError::InvalidTweak));
        assert_eq!(lift_x(&key).unwrap().serialize()[0], 0x02);
    }

    #[test]
    fn tweaked_signature_verifies() {
        let sk = SecretKey::from_slice(&[0x42; 32]).unwrap();
        let keypair = Keypair::from_secret_key(SECP256K1, &sk);
        let (internal, _) = keypair.x_only_public_key();
        let internal = internal.serialize();
        let tweak_hash = tap_tweak_hash(&internal, None);
        let tweaked = keypair
            .add_xonly_tweak(SECP256K1, &Scalar::from_be_bytes(tweak_hash).unwrap())
            .unwrap();
        let output = output_key(&internal).unwrap();
        assert_eq!(tweaked.x_only_public_key().0.serialize(), output);

        let msg = [0x5Au8; 32];
        let signature =
            SECP256K1.sign_schnorr_no_aux_rand(&Message::from_digest(msg), &tweaked);
        let mut sig = [0u8; 64];
        sig.copy_from_slice(signature.as_ref());
        assert_eq!(verify_schnorr(&sig, &msg, &output), Ok(()));
        assert_eq!(verify_schnorr(&sig, &msg, &internal), Err(TaprootError::InvalidSignature));
    }

    #[test]
    fn order_reduction() {
        let mut above = CURVE_ORDER;
        above[31] += 5;
        let mut expected = [0u8; 32];
        expected[31] = 5;
        assert_eq!(reduce_mod_order(above), expected);
        assert_eq!(reduce_mod_order([0x11; 32]), [0x11; 32]);
    }
}
