use std::collections::{BTreeMap, BTreeSet};

use crate::derivation::{ChainType, DerivedAddress, ExtendedPubKey};
use crate::error::WalletError;

/// Unique identifier of an unspent output: (transaction hash, output index).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OutPoint {
    /// Transaction hash as a hex string (display order).
    pub hash: String,
    /// Output index within the transaction.
    pub output_index: u32,
}

/// A single unspent transaction output belonging to the account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Hash of the transaction that created this output.
    pub hash: String,
    /// Output index within that transaction.
    pub output_index: u32,
    /// Confirmation height; `None` while the transaction is unconfirmed.
    pub block_height: Option<u32>,
    /// The account address this output pays to.
    pub address: String,
    /// Full derivation path of that address, e.g. `44'/0'/0'/0/2`.
    pub path: String,
    /// Value in satoshis.
    pub value: u64,
    /// Whether the creating transaction signals replace-by-fee.
    pub rbf: bool,
    /// Whether the output pays an internal (change) address.
    pub is_change: bool,
}

impl Utxo {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint {
            hash: self.hash.clone(),
            output_index: self.output_index,
        }
    }
}

/// Policy knobs for an account. Explicit configuration, never ambient
/// global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountConfig {
    /// Consecutive unused addresses probed before a derivation chain is
    /// considered exhausted during discovery.
    pub gap_limit: u32,
    /// Change below this value is folded into the fee instead of creating
    /// an output that would cost more to spend than it is worth.
    pub dust_threshold: u64,
    /// Payments above this value are split across several outputs.
    /// Must be nonzero; the builder rejects a zero cap.
    pub max_output_value: u64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            gap_limit: 20,
            dust_threshold: 546,
            max_output_value: u64::MAX,
        }
    }
}

/// Discovery position per derivation chain plus the last synced height.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCursor {
    /// One past the highest used external index (next index to probe).
    pub next_external: u32,
    /// One past the highest used internal index.
    pub next_internal: u32,
    /// Chain tip height observed at the end of the last successful sync.
    pub block_height: Option<u32>,
}

impl SyncCursor {
    pub fn next_index(&self, chain_type: ChainType) -> u32 {
        match chain_type {
            ChainType::External => self.next_external,
            ChainType::Internal => self.next_internal,
        }
    }

    pub fn set_next_index(&mut self, chain_type: ChainType, index: u32) {
        match chain_type {
            ChainType::External => self.next_external = index,
            ChainType::Internal => self.next_internal = index,
        }
    }
}

/// The synchronized state of one extended public key: known addresses,
/// the derived UTXO set, and the discovery cursor.
///
/// Mutated only by the sync engine; builders read a consistent snapshot.
/// The per-account exclusivity invariant (one in-flight sync, no
/// concurrent build against a half-merged ledger) is enforced by the
/// `Wallet` facade, which holds each account behind an async mutex.
#[derive(Debug, Clone)]
pub struct Account {
    pub key: ExtendedPubKey,
    pub config: AccountConfig,
    /// Append-only list of addresses with on-chain history, in discovery
    /// order.
    pub addresses: Vec<DerivedAddress>,
    pub cursor: SyncCursor,
    /// UTXO set keyed by outpoint; the key is unique within an account.
    pub(crate) utxos: BTreeMap<OutPoint, Utxo>,
    /// Outpoints observed spent. Transient: kept so that within a sync a
    /// spending transaction merged before its funding transaction cannot
    /// resurrect a consumed output. Not part of the persisted record.
    pub(crate) spent: BTreeSet<OutPoint>,
}

impl Account {
    pub fn new(key: ExtendedPubKey, config: AccountConfig) -> Self {
        Self {
            key,
            config,
            addresses: Vec::new(),
            cursor: SyncCursor::default(),
            utxos: BTreeMap::new(),
            spent: BTreeSet::new(),
        }
    }

    /// Stable identifier for storage keying: the serialized xpub.
    pub fn id(&self) -> &str {
        self.key.as_str()
    }

    /// Sum of the unspent outputs, confirmed and unconfirmed.
    pub fn balance(&self) -> u64 {
        self.utxos.values().map(|u| u.value).sum()
    }

    /// Unspent outputs in deterministic (outpoint) order.
    pub fn utxos(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos.values()
    }

    pub fn utxo_count(&self) -> usize {
        self.utxos.len()
    }

    /// Record a discovered address if it is not already known.
    pub(crate) fn record_address(&mut self, address: DerivedAddress) {
        let known = self
            .addresses
            .iter()
            .any(|a| a.chain_type == address.chain_type && a.index == address.index);
        if !known {
            self.addresses.push(address);
        }
    }

    /// Derive the first unused address on the given chain without mutating
    /// the ledger. External for receiving, internal for change.
    pub fn fresh_address(&self, chain_type: ChainType) -> Result<DerivedAddress, WalletError> {
        self.key
            .derive_address(chain_type, self.cursor.next_index(chain_type))
    }
}
