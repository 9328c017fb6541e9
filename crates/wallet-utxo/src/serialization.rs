//! Flat persisted representation of an account.
//!
//! The record round-trips exactly: importing an exported account yields a
//! ledger whose address list, UTXO set, and cursor are field-for-field
//! equal. Satoshi values cross the boundary as decimal strings, never as
//! native floats, and optional fields encode absence explicitly so that
//! "unknown height" can never be confused with height zero.

use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountConfig, Utxo};
use crate::derivation::{AddressScheme, ChainType, DerivedAddress, ExtendedPubKey, Network};
use crate::error::WalletError;

/// Persisted account, the unit handed to the `Storage` capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub xpub: String,
    pub scheme: AddressScheme,
    pub network: Network,
    pub path: String,
    pub addresses: Vec<AddressRecord>,
    pub utxos: Vec<UtxoRecord>,
    pub cursor: CursorRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub chain_type: ChainType,
    pub index: u32,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoRecord {
    pub hash: String,
    pub output_index: u32,
    pub block_height: Option<u32>,
    pub address: String,
    pub path: String,
    /// Satoshi value as a decimal string.
    pub value: String,
    pub rbf: bool,
    pub is_change: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRecord {
    pub external: u32,
    pub internal: u32,
    pub block_height: Option<u32>,
}

/// Flatten an account into its persisted record.
pub fn export_account(account: &Account) -> AccountRecord {
    AccountRecord {
        xpub: account.key.as_str().to_string(),
        scheme: account.key.scheme,
        network: account.key.network,
        path: account.key.account_path.clone(),
        addresses: account
            .addresses
            .iter()
            .map(|a| AddressRecord {
                chain_type: a.chain_type,
                index: a.index,
                address: a.address.clone(),
            })
            .collect(),
        utxos: account
            .utxos()
            .map(|u| UtxoRecord {
                hash: u.hash.clone(),
                output_index: u.output_index,
                block_height: u.block_height,
                address: u.address.clone(),
                path: u.path.clone(),
                value: u.value.to_string(),
                rbf: u.rbf,
                is_change: u.is_change,
            })
            .collect(),
        cursor: CursorRecord {
            external: account.cursor.next_external,
            internal: account.cursor.next_internal,
            block_height: account.cursor.block_height,
        },
    }
}

/// Rebuild an account from its persisted record.
pub fn import_account(
    record: &AccountRecord,
    config: AccountConfig,
) -> Result<Account, WalletError> {
    let key = ExtendedPubKey::new(&record.xpub, record.scheme, record.network, &record.path)
        .map_err(|e| WalletError::Serialization(format!("bad extended key in record: {e}")))?;

    let mut account = Account::new(key, config);
    for address in &record.addresses {
        account.record_address(DerivedAddress {
            chain_type: address.chain_type,
            index: address.index,
            address: address.address.clone(),
            scheme: record.scheme,
        });
    }
    for utxo in &record.utxos {
        let hash_bytes = hex::decode(&utxo.hash).map_err(|_| {
            WalletError::Serialization(format!("bad transaction hash {:?} in record", utxo.hash))
        })?;
        if hash_bytes.len() != 32 {
            return Err(WalletError::Serialization(format!(
                "transaction hash {:?} is not 32 bytes",
                utxo.hash
            )));
        }
        let value: u64 = utxo.value.parse().map_err(|_| {
            WalletError::Serialization(format!("bad decimal value {:?} in record", utxo.value))
        })?;
        let restored = Utxo {
            hash: utxo.hash.clone(),
            output_index: utxo.output_index,
            block_height: utxo.block_height,
            address: utxo.address.clone(),
            path: utxo.path.clone(),
            value,
            rbf: utxo.rbf,
            is_change: utxo.is_change,
        };
        account.utxos.insert(restored.outpoint(), restored);
    }
    account.cursor.next_external = record.cursor.external;
    account.cursor.next_internal = record.cursor.internal;
    account.cursor.block_height = record.cursor.block_height;
    Ok(account)
}

/// Serialize a record to the blob handed to `Storage`.
pub fn to_blob(record: &AccountRecord) -> Result<Vec<u8>, WalletError> {
    serde_json::to_vec(record).map_err(|e| WalletError::Serialization(e.to_string()))
}

/// Parse a blob read back from `Storage`.
pub fn from_blob(blob: &[u8]) -> Result<AccountRecord, WalletError> {
    serde_json::from_slice(blob).map_err(|e| WalletError::Serialization(e.to_string()))
}
