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

//! CashAddr address encoding (Bitcoin Cash).

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const CHECKSUM_LEN: usize = 8;

#[derive(Clone, PartialEq, Eq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum CashAddrError {
    /// CashAddr string mixes upper and lower case characters.
    MixedCase,

    /// CashAddr prefix '{0}' doesn't match the network.
    InvalidPrefix(String),

    /// invalid CashAddr character '{0}'.
    InvalidChar(char),

    /// CashAddr checksum is invalid.
    InvalidChecksum,

    /// CashAddr payload has invalid length {0}.
    InvalidLength(usize),

    /// CashAddr payload has non-zero padding.
    InvalidPadding,

    /// unsupported CashAddr version byte {0:#04x}.
    InvalidVersion(u8),
}

/// Kind of the hash carried by a CashAddr address.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum CashAddrType {
    P2pkh = 0,
    P2sh = 1,
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u64 {
    const GENERATORS: [u64; 5] =
        [0x98f2bc8e61, 0x79b76d99e2, 0xf33e5fb3c4, 0xae2eabe2a8, 0x1e4f43e470];

    let mut c = 1u64;
    for v in values {
        let c0 = c >> 35;
        c = ((c & 0x07_ffff_ffff) << 5) ^ v as u64;
        for (i, gen) in GENERATORS.iter().enumerate() {
            if (c0 >> i) & 1 != 0 {
                c ^= gen;
            }
        }
    }
    c ^ 1
}

fn prefix_values(prefix: &str) -> impl Iterator<Item = u8> + '_ {
    prefix.bytes().map(|b| b & 0x1f).chain([0])
}

fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, CashAddrError> {
    let mut acc = 0u32;
    let mut bits = 0u32;
    let max = (1u32 << to) - 1;
    let mut ret = Vec::with_capacity(data.len() * from as usize / to as usize + 1);
    for value in data {
        acc = (acc << from) | *value as u32;
        bits += from;
        while bits >= to {
            bits -= to;
            ret.push(((acc >> bits) & max) as u8);
        }
    }
    if pad {
        if bits > 0 {
            ret.push(((acc << (to - bits)) & max) as u8);
        }
    } else if bits >= from || (acc << (to - bits)) & max != 0 {
        return Err(CashAddrError::InvalidPadding);
    }
    Ok(ret)
}

/// Encodes a 20-byte hash into a CashAddr string with the given prefix.
pub fn encode(prefix: &str, kind: CashAddrType, hash: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push((kind as u8) << 3);
    payload.extend_from_slice(hash);
    let mut data = convert_bits(&payload, 8, 5, true).expect("padding conversion never fails");

    let checksum = polymod(prefix_values(prefix).chain(data.iter().copied()).chain([0; 8]));
    data.extend((0..CHECKSUM_LEN).map(|i| ((checksum >> (5 * (7 - i))) & 0x1f) as u8));

    let mut s = String::with_capacity(prefix.len() + 1 + data.len());
    s.push_str(prefix);
    s.push(':');
    s.extend(data.into_iter().map(|v| CHARSET[v as usize] as char));
    s
}

/// Decodes CashAddr string. The prefix is optional in the input; if present, it
/// must match the expected one.
pub fn decode(prefix: &str, s: &str) -> Result<(CashAddrType, [u8; 20]), CashAddrError> {
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(CashAddrError::MixedCase);
    }
    let s = s.to_ascii_lowercase();
    let body = match s.split_once(':') {
        Some((given, body)) if given == prefix => body,
        Some((given, _)) => return Err(CashAddrError::InvalidPrefix(given.to_owned())),
        None => s.as_str(),
    };

    let data = body
        .chars()
        .map(|c| {
            CHARSET
                .iter()
                .position(|x| *x as char == c)
                .map(|pos| pos as u8)
                .ok_or(CashAddrError::InvalidChar(c))
        })
        .collect::<Result<Vec<u8>, _>>()?;
    if data.len() <= CHECKSUM_LEN {
        return Err(CashAddrError::InvalidLength(data.len()));
    }
    if polymod(prefix_values(prefix).chain(data.iter().copied())) != 0 {
        return Err(CashAddrError::InvalidChecksum);
    }

    let payload = convert_bits(&data[..data.len() - CHECKSUM_LEN], 5, 8, false)?;
    if payload.len() != 21 {
        return Err(CashAddrError::InvalidLength(payload.len()));
    }
    let kind = match payload[0] {
        0x00 => CashAddrType::P2pkh,
        0x08 => CashAddrType::P2sh,
        other => return Err(CashAddrError::InvalidVersion(other)),
    };
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[1..]);
    Ok((kind, hash))
}
