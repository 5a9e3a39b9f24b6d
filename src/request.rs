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

//! Device signing requests and their batching under the transport size limit.

use bc::{ConsensusEncode, Sats, ScriptPubkey, SighashType, VarInt};
use derive::{DerivationPath, ScriptType};

/// Payload which has to be signed by the device for a single input.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct SigningPayload {
    pub input: usize,
    pub path: DerivationPath,
    pub script_type: ScriptType,
    /// Sighash type committed by the payload; `None` for the taproot default.
    pub sighash_type: Option<SighashType>,
    pub bytes: Vec<u8>,
}

/// Destination of an output as the device shows it to the user.
#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub enum ConfirmedDest {
    Script(ScriptPubkey),
    /// Output controlled by the device, identified by the derivation path.
    Path(DerivationPath),
}

#[derive(Clone, Eq, PartialEq, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct ConfirmedOutput {
    pub amount: Sats,
    pub dest: ConfirmedDest,
}

/// Outputs of the transaction which the device displays for confirmation.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
pub struct OutputConfirmation(pub Vec<ConfirmedOutput>);

/// Single request sent to the device.
#[derive(Clone, Eq, PartialEq, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
pub struct SignRequest {
    pub payloads: Vec<SigningPayload>,
    pub confirmation: Option<OutputConfirmation>,
}

impl SignRequest {
    /// Framed form of the request.
    pub fn to_bytes(&self, framing: &impl RequestFraming) -> Vec<u8> { framing.frame(self) }
}

/// Request of a public key or an address at a derivation path.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct KeyRequest {
    pub path: DerivationPath,
    /// Script type of the address the device should display.
    pub script_type: Option<ScriptType>,
    pub display: bool,
}

impl KeyRequest {
    pub fn to_bytes(&self, framing: &impl RequestFraming) -> Vec<u8> { framing.frame_key(self) }
}

/// Encoding of requests for the device transport. The engine never talks to
/// the device itself; it only produces the framed bytes.
pub trait RequestFraming {
    fn frame(&self, request: &SignRequest) -> Vec<u8>;

    fn frame_key(&self, request: &KeyRequest) -> Vec<u8>;

    /// Length of the framed request.
    fn request_len(&self, request: &SignRequest) -> usize { self.frame(request).len() }
}

/// Default framing of requests.
///
/// Sign request: flags byte (bit 0 is set when the output confirmation is
/// present), optional confirmation (output count, then for each output the
/// amount and either `0x00` with the length-prefixed script or `0x01` with
/// the path), payload count, then for each payload the path, the script type
/// code and the length-prefixed payload bytes. Paths are encoded as the depth
/// byte followed by big-endian indexes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct CompactFraming;

const FLAG_CONFIRMATION: u8 = 0x01;
const FLAG_DISPLAY: u8 = 0x01;

fn script_type_code(script_type: Option<ScriptType>) -> u8 {
    match script_type {
        None => 0x00,
        Some(ScriptType::P2pkh) => 0x01,
        Some(ScriptType::P2shP2pkh) => 0x02,
        Some(ScriptType::P2shP2wpkh) => 0x03,
        Some(ScriptType::P2wpkh) => 0x04,
        Some(ScriptType::P2tr) => 0x05,
    }
}

fn path_len(path: &DerivationPath) -> usize { 1 + path.to_u32_vec().len() * 4 }

fn push_path(buf: &mut Vec<u8>, path: &DerivationPath) {
    let indexes = path.to_u32_vec();
    buf.push(indexes.len() as u8);
    for index in indexes {
        buf.extend(index.to_be_bytes());
    }
}

fn push_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend(VarInt::with(data.len()).consensus_serialize());
    buf.extend(data);
}

impl CompactFraming {
    fn confirmation_len(confirmation: &OutputConfirmation) -> usize {
        VarInt::with(confirmation.0.len()).len()
            + confirmation
                .0
                .iter()
                .map(|output| {
                    8 + 1
                        + match &output.dest {
                            ConfirmedDest::Script(script) => {
                                VarInt::with(script.len()).len() + script.len()
                            }
                            ConfirmedDest::Path(path) => path_len(path),
                        }
                })
                .sum::<usize>()
    }

    fn payload_len(payload: &SigningPayload) -> usize {
        path_len(&payload.path) + 1 + VarInt::with(payload.bytes.len()).len() + payload.bytes.len()
    }
}

impl RequestFraming for CompactFraming {
    fn frame(&self, request: &SignRequest) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.request_len(request));
        match &request.confirmation {
            None => buf.push(0),
            Some(confirmation) => {
                buf.push(FLAG_CONFIRMATION);
                buf.extend(VarInt::with(confirmation.0.len()).consensus_serialize());
                for output in &confirmation.0 {
                    buf.extend(output.amount.sats().to_le_bytes());
                    match &output.dest {
                        ConfirmedDest::Script(script) => {
                            buf.push(0x00);
                            push_bytes(&mut buf, script.as_slice());
                        }
                        ConfirmedDest::Path(path) => {
                            buf.push(0x01);
                            push_path(&mut buf, path);
                        }
                    }
                }
            }
        }
        buf.extend(VarInt::with(request.payloads.len()).consensus_serialize());
        for payload in &request.payloads {
            push_path(&mut buf, &payload.path);
            buf.push(script_type_code(Some(payload.script_type)));
            push_bytes(&mut buf, &payload.bytes);
        }
        buf
    }

    fn frame_key(&self, request: &KeyRequest) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + path_len(&request.path));
        buf.push(if request.display { FLAG_DISPLAY } else { 0 });
        buf.push(script_type_code(request.script_type));
        push_path(&mut buf, &request.path);
        buf
    }

    fn request_len(&self, request: &SignRequest) -> usize {
        1 + request.confirmation.as_ref().map(Self::confirmation_len).unwrap_or_default()
            + VarInt::with(request.payloads.len()).len()
            + request.payloads.iter().map(Self::payload_len).sum::<usize>()
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error)]
#[display(doc_comments)]
pub enum BatchError {
    /// signing payload of input {input} takes {len} bytes in a request, which exceeds the
    /// maximal request size of {max} bytes.
    PayloadTooLarge { input: usize, len: usize, max: usize },
}

/// Greedily packs payloads, keeping their order, into requests which fit
/// into `max` bytes once framed.
///
/// A request carries the output confirmation unless its first payload spends
/// a P2PKH output.
pub fn pack_requests(
    payloads: impl IntoIterator<Item = SigningPayload>,
    confirmation: &OutputConfirmation,
    framing: &impl RequestFraming,
    max: usize,
) -> Result<Vec<SignRequest>, BatchError> {
    let mut requests = Vec::<SignRequest>::new();
    let mut current: Option<SignRequest> = None;

    for payload in payloads {
        if let Some(request) = current.as_mut() {
            request.payloads.push(payload);
            if framing.request_len(request) <= max {
                continue;
            }
            let payload = request.payloads.pop();
            if let Some(request) = current.take() {
                log::trace!(
                    "closing request with {} payloads of {} bytes",
                    request.payloads.len(),
                    framing.request_len(&request)
                );
                requests.push(request);
            }
            let Some(payload) = payload else { continue };
            current = Some(open_request(payload, confirmation, framing, max)?);
        } else {
            current = Some(open_request(payload, confirmation, framing, max)?);
        }
    }
    requests.extend(current);

    log::debug!("signing payloads packed into {} request(s)", requests.len());
    Ok(requests)
}

fn open_request(
    payload: SigningPayload,
    confirmation: &OutputConfirmation,
    framing: &impl RequestFraming,
    max: usize,
) -> Result<SignRequest, BatchError> {
    let input = payload.input;
    let confirmation = match payload.script_type {
        ScriptType::P2pkh => None,
        _ => Some(confirmation.clone()),
    };
    let request = SignRequest {
        payloads: vec![payload],
        confirmation,
    };
    let len = framing.request_len(&request);
    if len > max {
        return Err(BatchError::PayloadTooLarge { input, len, max });
    }
    Ok(request)
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    fn payload(input: usize, script_type: ScriptType, len: usize) -> SigningPayload {
        SigningPayload {
            input,
            path: DerivationPath::from_str("m/84'/0'/0'/0/0").unwrap(),
            script_type,
            sighash_type: None,
            bytes: vec![input as u8; len],
        }
    }

    fn confirmation() -> OutputConfirmation {
        OutputConfirmation(vec![
            ConfirmedOutput {
                amount: Sats::from_sats(500),
                dest: ConfirmedDest::Script(ScriptPubkey::p2wpkh([1; 20])),
            },
            ConfirmedOutput {
                amount: Sats::from_sats(50),
                dest: ConfirmedDest::Path(DerivationPath::from_str("m/84'/0'/0'/1/0").unwrap()),
            },
        ])
    }

    #[test]
    fn framed_length() {
        let request = SignRequest {
            payloads: vec![payload(0, ScriptType::P2wpkh, 182), payload(1, ScriptType::P2wpkh, 300)],
            confirmation: Some(confirmation()),
        };
        let bytes = request.to_bytes(&CompactFraming);
        assert_eq!(bytes.len(), CompactFraming.request_len(&request));
        assert_eq!(bytes[0], FLAG_CONFIRMATION);

        let key = KeyRequest {
            path: DerivationPath::from_str("m/44'/0'/0'/0/0").unwrap(),
            script_type: Some(ScriptType::P2pkh),
            display: true,
        };
        assert_eq!(key.to_bytes(&CompactFraming), vec![
            0x01, 0x01, 0x05, 0x80, 0, 0, 44, 0x80, 0, 0, 0, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0
        ]);
    }

    #[test]
    fn batching_keeps_order() {
        // each payload takes 21 + 1 + 3 + 300 bytes
        let payloads = (0..5).map(|i| payload(i, ScriptType::P2wpkh, 300)).collect::<Vec<_>>();
        let conf_len = CompactFraming::confirmation_len(&confirmation());
        let max = 1 + conf_len + 1 + 2 * 325;

        let requests = pack_requests(payloads.clone(), &confirmation(), &CompactFraming, max).unwrap();
        assert_eq!(requests.len(), 3);
        for request in &requests {
            assert!(CompactFraming.request_len(request) <= max);
            assert_eq!(request.confirmation, Some(confirmation()));
        }
        let flattened =
            requests.into_iter().flat_map(|request| request.payloads).collect::<Vec<_>>();
        assert_eq!(flattened, payloads);
    }

    #[test]
    fn p2pkh_requests_skip_confirmation() {
        let payloads = vec![payload(0, ScriptType::P2pkh, 200), payload(1, ScriptType::P2wpkh, 200)];
        let requests = pack_requests(payloads, &confirmation(), &CompactFraming, 1000).unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].confirmation, None);
        assert_eq!(requests[0].payloads.len(), 2);
    }

    #[test]
    fn oversized_payload() {
        let payloads = vec![payload(0, ScriptType::P2wpkh, 100), payload(1, ScriptType::P2pkh, 2000)];
        assert_eq!(
            pack_requests(payloads, &confirmation(), &CompactFraming, 1024),
            Err(BatchError::PayloadTooLarge {
                input: 1,
                len: 1 + 1 + 21 + 1 + 3 + 2000,
                max: 1024
            })
        );
        assert_eq!(pack_requests(vec![], &confirmation(), &CompactFraming, 10), Ok(vec![]));
    }
}
