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

use bc::{LegacyPk, Sats, ScriptPubkey, Tx, TxOut};
use derive::{
    Address, AddressParseError, Coin, DerivationPath, NetworkParams, Payment, PaymentError,
    ScriptType,
};

use crate::builder::path_script_type;
use crate::fees::{estimate_dust_threshold, estimate_vsize, FeeRate};
use crate::request::{CompactFraming, KeyRequest, RequestFraming};
use crate::{BuildError, BuilderConfig, OutputSpec, TxBuilder, Utxo};

/// Entry point for the operations a wallet runs against a device for a
/// single coin. Produces framed device requests and turns device responses
/// into addresses, keys and signed transactions.
#[derive(Clone, Debug)]
pub struct CoinApp<F: RequestFraming = CompactFraming> {
    params: &'static NetworkParams,
    config: BuilderConfig,
    framing: F,
}

impl CoinApp {
    pub fn new(coin: Coin) -> Self { CoinApp::with_config(coin, BuilderConfig::default()) }

    pub fn with_config(coin: Coin, config: BuilderConfig) -> Self {
        CoinApp::with_framing(coin, config, CompactFraming)
    }
}

impl<F: RequestFraming> CoinApp<F> {
    pub fn with_framing(coin: Coin, config: BuilderConfig, framing: F) -> Self {
        CoinApp {
            params: coin.params(),
            config,
            framing,
        }
    }

    #[inline]
    pub fn coin(&self) -> Coin { self.params.coin }

    #[inline]
    pub fn params(&self) -> &'static NetworkParams { self.params }

    #[inline]
    pub fn config(&self) -> &BuilderConfig { &self.config }

    /// Request for the device to derive and optionally display the address at
    /// the path.
    pub fn prepare_address(
        &self,
        path: &DerivationPath,
        script_type: Option<ScriptType>,
        display: bool,
    ) -> Result<Vec<u8>, BuildError> {
        let script_type = path_script_type(self.params, path, script_type)?;
        let request = KeyRequest {
            path: path.clone(),
            script_type: Some(script_type),
            display,
        };
        Ok(request.to_bytes(&self.framing))
    }

    /// Address out of the public key the device returned for
    /// [`CoinApp::prepare_address`].
    pub fn resolve_address(
        &self,
        path: &DerivationPath,
        script_type: Option<ScriptType>,
        public_key: &[u8],
    ) -> Result<Address, BuildError> {
        let script_type = path_script_type(self.params, path, script_type)?;
        self.address_from_public_key(public_key, script_type)
    }

    /// Address of the given type for an already derived public key.
    pub fn address_from_public_key(
        &self,
        public_key: &[u8],
        script_type: ScriptType,
    ) -> Result<Address, BuildError> {
        Ok(Payment::for_script_type(self.params, script_type, public_key)?.address)
    }

    pub fn prepare_public_key(
        &self,
        path: &DerivationPath,
        display: bool,
    ) -> Result<Vec<u8>, BuildError> {
        let found = path.coin_type();
        if found != Some(self.params.coin_type) {
            return Err(match found {
                Some(found) => BuildError::CoinTypeMismatch {
                    path: path.clone(),
                    expected: self.params.coin_type,
                    found,
                },
                None => BuildError::UnsupportedPath(path.clone()),
            });
        }
        let request = KeyRequest {
            path: path.clone(),
            script_type: None,
            display,
        };
        Ok(request.to_bytes(&self.framing))
    }

    /// Checks the public key returned by the device.
    pub fn resolve_public_key(&self, response: &[u8]) -> Result<LegacyPk, BuildError> {
        Ok(LegacyPk::from_slice(response).map_err(PaymentError::from)?)
    }

    /// Builds the transaction and returns it together with the framed
    /// requests which have to be sent to the device, in order.
    pub fn prepare_sign(
        &self,
        utxos: impl IntoIterator<Item = Utxo>,
        outputs: impl IntoIterator<Item = OutputSpec>,
        fee_rate: Option<FeeRate>,
    ) -> Result<(TxBuilder, Vec<Vec<u8>>), BuildError> {
        let mut builder = TxBuilder::new(self.params, self.config);
        for utxo in utxos {
            builder.add_input(utxo)?;
        }
        for output in outputs {
            builder.add_output(output)?;
        }
        let requests = builder.prepare_sign_with(fee_rate, &self.framing)?;
        let requests =
            requests.iter().map(|request| request.to_bytes(&self.framing)).collect::<Vec<_>>();
        log::debug!(
            "{} {} transaction needs {} device request(s)",
            self.params.coin,
            builder.unsigned_tx().txid(),
            requests.len()
        );
        Ok((builder, requests))
    }

    /// Applies signatures collected from all device responses and returns
    /// the signed transaction.
    pub fn resolve_transaction<S: AsRef<[u8]>, K: AsRef<[u8]>>(
        &self,
        builder: &mut TxBuilder,
        signatures: &[S],
        public_keys: &[K],
    ) -> Result<Tx, BuildError> {
        builder.append_signatures(signatures, public_keys)?;
        builder.finalize_all_inputs()?;
        builder.extract_transaction()
    }

    pub fn estimate_virtual_size(&self, inputs: &[ScriptType], outputs: &[TxOut]) -> usize {
        estimate_vsize(inputs, outputs)
    }

    pub fn estimate_dust_threshold(&self, script_type: ScriptType) -> Sats {
        estimate_dust_threshold(self.params, script_type)
    }

    /// Parses the address, failing if it doesn't belong to the coin.
    pub fn validate_address(&self, address: &str) -> Result<ScriptPubkey, AddressParseError> {
        invoice::decode(self.params.coin, address)
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use amplify::hex::FromHex;

    use super::*;

    fn path(s: &str) -> DerivationPath { DerivationPath::from_str(s).unwrap() }

    #[test]
    fn addresses() {
        let app = CoinApp::new(Coin::Bitcoin);

        let pk = Vec::<u8>::from_hex(
            "0330d54fd0dd420a6e5f8d3624f5f3482cae350f79d5f0753bf5beef9c2d91af3c",
        )
        .unwrap();
        let address = app.resolve_address(&path("m/84'/0'/0'/0/0"), None, &pk).unwrap();
        assert_eq!(address.to_string(), "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");

        let internal_key = Vec::<u8>::from_hex(
            "cc8a4bc64d897bddc5fbc2f670f7a8ba0b386779106cf1223c6fc5d7cd6fc115",
        )
        .unwrap();
        let address = app.address_from_public_key(&internal_key, ScriptType::P2tr).unwrap();
        assert_eq!(
            address.to_string(),
            "bc1p5cyxnuxmeuwuvkwfem96lqzszd02n6xdcjrs20cac6yqjjwudpxqkedrcr"
        );

        let testnet = CoinApp::new(Coin::Testnet);
        let pk = Vec::<u8>::from_hex(
            "03a1af804ac108a8a51782198c2d034b28bf90c8803f5a53f76276fa69a4eae77f",
        )
        .unwrap();
        let address = testnet.resolve_address(&path("m/49'/1'/0'/0/0"), None, &pk).unwrap();
        assert_eq!(address.to_string(), "2Mww8dCYPUpKHofjgcXcBCEGmniw9CoaiD2");

        assert!(app.validate_address("bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu").is_ok());
        assert!(testnet.validate_address("bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu").is_err());
    }

    #[test]
    fn key_requests() {
        let app = CoinApp::new(Coin::Bitcoin);
        let request = app.prepare_address(&path("m/84'/0'/0'/0/1"), None, true).unwrap();
        assert_eq!(&request[..3], &[0x01, 0x04, 0x05]);

        assert_eq!(
            app.prepare_address(&path("m/84'/0'/0'/0/1"), Some(ScriptType::P2pkh), false),
            Err(BuildError::ScriptTypeMismatch {
                script_type: ScriptType::P2pkh,
                purpose: 84
            })
        );
        assert_eq!(
            app.prepare_public_key(&path("m/44'/1'/0'"), false),
            Err(BuildError::CoinTypeMismatch {
                path: path("m/44'/1'/0'"),
                expected: 0,
                found: 1
            })
        );
        let request = app.prepare_public_key(&path("m/44'/0'/0'"), false).unwrap();
        assert_eq!(request, vec![0x00, 0x00, 0x03, 0x80, 0, 0, 44, 0x80, 0, 0, 0, 0x80, 0, 0, 0]);

        assert!(app.resolve_public_key(&[0x04; 33]).is_err());
        assert!(app.resolve_public_key(&[0x02; 32]).is_err());
    }

    #[test]
    fn estimates() {
        let app = CoinApp::new(Coin::Bitcoin);
        assert_eq!(app.estimate_dust_threshold(ScriptType::P2wpkh), Sats::from_sats(294));
        let outputs = [TxOut::new(ScriptPubkey::p2wpkh([1; 20]), Sats::from_sats(1000))];
        assert_eq!(app.estimate_virtual_size(&[ScriptType::P2wpkh], &outputs), 110);

        let doge = CoinApp::new(Coin::Dogecoin);
        assert_eq!(doge.estimate_dust_threshold(ScriptType::P2pkh), Sats::from_sats(182_000));
    }
}
