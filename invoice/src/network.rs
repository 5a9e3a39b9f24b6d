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

use bc::{DigestAlgo, SighashType};

/// Coin (chain and network) supported by the signing engine.
#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[display(lowercase)]
pub enum Coin {
    /// Bitcoin mainnet
    Bitcoin,

    /// Bitcoin testnet and signet
    Testnet,

    /// Bitcoin regtest networks
    Regtest,

    Litecoin,

    Dogecoin,

    Dash,

    /// Bitcoin Cash, using CashAddr and replay-protected signatures
    #[display("bitcoincash")]
    BitcoinCash,

    /// Bitcoin Gold, using replay-protected signatures
    #[display("bitcoingold")]
    BitcoinGold,
}

impl Coin {
    pub const ALL: [Coin; 8] = [
        Coin::Bitcoin,
        Coin::Testnet,
        Coin::Regtest,
        Coin::Litecoin,
        Coin::Dogecoin,
        Coin::Dash,
        Coin::BitcoinCash,
        Coin::BitcoinGold,
    ];

    pub fn params(self) -> &'static NetworkParams {
        match self {
            Coin::Bitcoin => &BITCOIN,
            Coin::Testnet => &TESTNET,
            Coin::Regtest => &REGTEST,
            Coin::Litecoin => &LITECOIN,
            Coin::Dogecoin => &DOGECOIN,
            Coin::Dash => &DASH,
            Coin::BitcoinCash => &BITCOIN_CASH,
            Coin::BitcoinGold => &BITCOIN_GOLD,
        }
    }

    /// Detects whether the coin is a kind of test network (testnet, signet,
    /// regtest).
    pub fn is_testnet(self) -> bool { matches!(self, Coin::Testnet | Coin::Regtest) }
}

#[derive(Clone, Eq, PartialEq, Debug, Display, Error)]
#[display("unknown coin '{0}'")]
pub struct UnknownCoin(pub String);

impl FromStr for Coin {
    type Err = UnknownCoin;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "bitcoin" | "mainnet" | "btc" => Coin::Bitcoin,
            "testnet" | "testnet3" | "signet" | "test" => Coin::Testnet,
            "regtest" => Coin::Regtest,
            "litecoin" | "ltc" => Coin::Litecoin,
            "dogecoin" | "doge" => Coin::Dogecoin,
            "dash" => Coin::Dash,
            "bitcoincash" | "bch" => Coin::BitcoinCash,
            "bitcoingold" | "btg" => Coin::BitcoinGold,
            _ => return Err(UnknownCoin(s.to_owned())),
        })
    }
}

/// Static capability record of a coin. Code paths branch on these fields and
/// never on the coin identity.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct NetworkParams {
    pub coin: Coin,
    /// Prefix of signed messages, including the length byte.
    pub message_prefix: &'static str,
    /// Human-readable part of segwit addresses, if the coin has segwit addresses.
    pub bech32_hrp: Option<&'static str>,
    /// CashAddr prefix for coins encoding base addresses with CashAddr.
    pub cashaddr_prefix: Option<&'static str>,
    pub xpub_version: u32,
    pub xprv_version: u32,
    /// Base58 version byte of P2PKH addresses.
    pub pubkey_hash: u8,
    /// Base58 version byte of P2SH addresses.
    pub script_hash: u8,
    pub wif: u8,
    /// BIP-44 coin type.
    pub coin_type: u32,
    /// Digest applied to legacy and segwit v0 signing payloads.
    pub sighash_digest: DigestAlgo,
    /// SIGHASH_FORKID value for replay-protected forks.
    pub fork_id: Option<u32>,
    /// Dust relay fee, in satoshis per 1000 virtual bytes.
    pub dust_relay_fee: u64,
    pub segwit: bool,
    pub taproot: bool,
}

impl NetworkParams {
    /// Sighash type used unless the caller requests a different one.
    pub fn default_sighash(&self) -> SighashType {
        match self.fork_id {
            Some(fork_id) => SighashType::all().with_fork_id(fork_id),
            None => SighashType::all(),
        }
    }

    /// Adds coin-specific replay protection to a requested sighash type.
    pub fn adapt_sighash(&self, sighash_type: SighashType) -> SighashType {
        SighashType {
            fork_id: self.fork_id,
            ..sighash_type
        }
    }
}

const BITCOIN: NetworkParams = NetworkParams {
    coin: Coin::Bitcoin,
    message_prefix: "\x18Bitcoin Signed Message:\n",
    bech32_hrp: Some("bc"),
    cashaddr_prefix: None,
    xpub_version: 0x0488b21e,
    xprv_version: 0x0488ade4,
    pubkey_hash: 0x00,
    script_hash: 0x05,
    wif: 0x80,
    coin_type: 0,
    sighash_digest: DigestAlgo::Sha256d,
    fork_id: None,
    dust_relay_fee: 3000,
    segwit: true,
    taproot: true,
};

const TESTNET: NetworkParams = NetworkParams {
    coin: Coin::Testnet,
    bech32_hrp: Some("tb"),
    xpub_version: 0x043587cf,
    xprv_version: 0x04358394,
    pubkey_hash: 0x6f,
    script_hash: 0xc4,
    wif: 0xef,
    coin_type: 1,
    ..BITCOIN
};

const REGTEST: NetworkParams = NetworkParams {
    coin: Coin::Regtest,
    bech32_hrp: Some("bcrt"),
    ..TESTNET
};

const LITECOIN: NetworkParams = NetworkParams {
    coin: Coin::Litecoin,
    message_prefix: "\x19Litecoin Signed Message:\n",
    bech32_hrp: Some("ltc"),
    xpub_version: 0x019da462,
    xprv_version: 0x019d9cfe,
    pubkey_hash: 0x30,
    script_hash: 0x32,
    wif: 0xb0,
    coin_type: 2,
    ..BITCOIN
};

const DOGECOIN: NetworkParams = NetworkParams {
    coin: Coin::Dogecoin,
    message_prefix: "\x19Dogecoin Signed Message:\n",
    bech32_hrp: None,
    xpub_version: 0x02facafd,
    xprv_version: 0x02fac398,
    pubkey_hash: 0x1e,
    script_hash: 0x16,
    wif: 0x9e,
    coin_type: 3,
    dust_relay_fee: 1_000_000,
    segwit: false,
    taproot: false,
    ..BITCOIN
};

const DASH: NetworkParams = NetworkParams {
    coin: Coin::Dash,
    message_prefix: "\x19DarkCoin Signed Message:\n",
    bech32_hrp: None,
    pubkey_hash: 0x4c,
    script_hash: 0x10,
    wif: 0xcc,
    coin_type: 5,
    segwit: false,
    taproot: false,
    ..BITCOIN
};

const BITCOIN_CASH: NetworkParams = NetworkParams {
    coin: Coin::BitcoinCash,
    bech32_hrp: None,
    cashaddr_prefix: Some("bitcoincash"),
    coin_type: 145,
    fork_id: Some(0),
    segwit: false,
    taproot: false,
    ..BITCOIN
};

const BITCOIN_GOLD: NetworkParams = NetworkParams {
    coin: Coin::BitcoinGold,
    message_prefix: "\x1dBitcoin Gold Signed Message:\n",
    bech32_hrp: Some("btg"),
    pubkey_hash: 38,
    script_hash: 23,
    coin_type: 156,
    fork_id: Some(79),
    taproot: false,
    ..BITCOIN
};

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn params_lookup() {
        for coin in Coin::ALL {
            assert_eq!(coin.params().coin, coin);
            assert_eq!(Coin::from_str(&coin.to_string()), Ok(coin));
        }
        assert_eq!(Coin::from_str("BTG"), Ok(Coin::BitcoinGold));
        assert_eq!(Coin::from_str("zcash"), Err(UnknownCoin(s!("zcash"))));
    }

    #[test]
    fn capabilities() {
        let bch = Coin::BitcoinCash.params();
        assert!(!bch.segwit);
        assert_eq!(bch.default_sighash().to_consensus_u32(), 0x41);
        let btg = Coin::BitcoinGold.params();
        assert!(btg.segwit && !btg.taproot);
        assert_eq!(btg.default_sighash().to_consensus_u32(), 0x4f41);
        assert_eq!(
            btg.adapt_sighash(SighashType::single()).to_consensus_u32(),
            0x4f43
        );
        assert_eq!(Coin::Bitcoin.params().default_sighash(), SighashType::all());
        assert_eq!(Coin::Regtest.params().pubkey_hash, 0x6f);
        assert_eq!(Coin::Regtest.params().bech32_hrp, Some("bcrt"));
    }
}
