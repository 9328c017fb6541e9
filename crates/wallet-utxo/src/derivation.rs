use std::fmt;

use bitcoin::address::Address;
use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::NetworkKind;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Supported networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Convert to the `bitcoin` crate's `Network` type.
    pub fn to_bitcoin_network(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Address schemes the engine can derive and estimate sizes for.
///
/// The scheme-to-encoding mapping is a closed table: every variant must be
/// covered here and in the size table in `fees.rs`, so adding a scheme
/// without both contracts is a compile error rather than a silent gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressScheme {
    /// P2PKH, BIP-44.
    Legacy,
    /// P2SH-wrapped P2WPKH, BIP-49.
    Segwit,
    /// P2WPKH (bech32), BIP-84.
    NativeSegwit,
    /// P2TR (bech32m), BIP-86.
    Taproot,
}

impl AddressScheme {
    /// BIP purpose level conventionally paired with this scheme.
    pub fn purpose(self) -> u32 {
        match self {
            AddressScheme::Legacy => 44,
            AddressScheme::Segwit => 49,
            AddressScheme::NativeSegwit => 84,
            AddressScheme::Taproot => 86,
        }
    }
}

impl fmt::Display for AddressScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressScheme::Legacy => write!(f, "legacy"),
            AddressScheme::Segwit => write!(f, "segwit"),
            AddressScheme::NativeSegwit => write!(f, "native_segwit"),
            AddressScheme::Taproot => write!(f, "taproot"),
        }
    }
}

/// Receive (external) or change (internal) derivation chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainType {
    External,
    Internal,
}

impl ChainType {
    /// BIP-32 child number of this chain under the account key.
    pub fn child_number(self) -> u32 {
        match self {
            ChainType::External => 0,
            ChainType::Internal => 1,
        }
    }
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainType::External => write!(f, "external"),
            ChainType::Internal => write!(f, "internal"),
        }
    }
}

/// An address derived from an account-level extended public key.
///
/// Derivation is deterministic: the same (chain type, index) always maps to
/// the same address for a given key and scheme. Once derived and recorded,
/// a `DerivedAddress` is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub chain_type: ChainType,
    pub index: u32,
    pub address: String,
    pub scheme: AddressScheme,
}

/// An account-level extended public key plus the context needed to derive
/// addresses from it. Holds no secret material.
#[derive(Debug, Clone)]
pub struct ExtendedPubKey {
    xpub: Xpub,
    raw: String,
    pub scheme: AddressScheme,
    pub network: Network,
    /// Account-level derivation path, e.g. `44'/0'/0'`.
    pub account_path: String,
}

impl ExtendedPubKey {
    /// Parse and validate an extended public key string.
    ///
    /// The key's embedded network kind must agree with `network`; a
    /// mismatch is a configuration error, surfaced here rather than at
    /// first use.
    pub fn new(
        raw: &str,
        scheme: AddressScheme,
        network: Network,
        account_path: &str,
    ) -> Result<Self, WalletError> {
        let xpub: Xpub = raw
            .parse()
            .map_err(|e| WalletError::Derivation(format!("failed to parse xpub: {e}")))?;

        let expected = match network {
            Network::Mainnet => NetworkKind::Main,
            Network::Testnet => NetworkKind::Test,
        };
        if xpub.network != expected {
            return Err(WalletError::Derivation(format!(
                "xpub network kind does not match {network}"
            )));
        }

        Ok(Self {
            xpub,
            raw: raw.to_string(),
            scheme,
            network,
            account_path: account_path.to_string(),
        })
    }

    /// The original serialized key string. Also used as the account id.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Full derivation path string for an address of this account,
    /// e.g. `44'/0'/0'/1/3`.
    pub fn derivation_path(&self, chain_type: ChainType, index: u32) -> String {
        format!(
            "{}/{}/{}",
            self.account_path,
            chain_type.child_number(),
            index
        )
    }

    /// Derive the address at (chain type, index). Pure and deterministic.
    pub fn derive_address(
        &self,
        chain_type: ChainType,
        index: u32,
    ) -> Result<DerivedAddress, WalletError> {
        let secp = Secp256k1::verification_only();
        let path = [
            ChildNumber::from_normal_idx(chain_type.child_number())
                .map_err(|e| WalletError::Derivation(e.to_string()))?,
            ChildNumber::from_normal_idx(index)
                .map_err(|e| WalletError::Derivation(format!("invalid index {index}: {e}")))?,
        ];
        let child = self
            .xpub
            .derive_pub(&secp, &path)
            .map_err(|e| WalletError::Derivation(format!("child derivation failed: {e}")))?;

        let net = self.network.to_bitcoin_network();
        let address = match self.scheme {
            AddressScheme::Legacy => Address::p2pkh(child.to_pub().pubkey_hash(), net),
            AddressScheme::Segwit => Address::p2shwpkh(&child.to_pub(), net),
            AddressScheme::NativeSegwit => Address::p2wpkh(&child.to_pub(), net),
            AddressScheme::Taproot => Address::p2tr(&secp, child.to_x_only_pub(), None, net),
        };

        Ok(DerivedAddress {
            chain_type,
            index,
            address: address.to_string(),
            scheme: self.scheme,
        })
    }
}

/// Validate a destination address against the account's network.
///
/// Accepts any scheme the network understands (P2PKH, P2SH, P2WPKH, P2WSH,
/// P2TR); rejects unparseable strings and wrong-network addresses.
pub fn validate_destination(address: &str, network: Network) -> Result<(), WalletError> {
    let parsed = address
        .parse::<Address<bitcoin::address::NetworkUnchecked>>()
        .map_err(|e| WalletError::InvalidDestination(format!("failed to parse address: {e}")))?;

    if !parsed.is_valid_for_network(network.to_bitcoin_network()) {
        return Err(WalletError::InvalidDestination(format!(
            "address is not valid for {network}"
        )));
    }
    Ok(())
}
