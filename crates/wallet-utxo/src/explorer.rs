//! Capability interfaces required from external collaborators.
//!
//! The engine never talks to the network, a disk, or a signing device
//! directly; it depends on these narrow traits. Errors crossing these
//! boundaries are opaque to the engine and are surfaced immediately,
//! retry and backoff belong to the implementations behind the traits.

use async_trait::async_trait;

use crate::account::Account;
use crate::builder::TransactionDraft;
use crate::error::WalletError;

/// One transaction as reported by the chain indexer for an address.
#[derive(Debug, Clone)]
pub struct HistoryTx {
    /// Transaction hash as a hex string.
    pub id: String,
    /// Confirmation height; `None` while in the mempool.
    pub block_height: Option<u32>,
    /// Whether the transaction signals replace-by-fee.
    pub rbf: bool,
    pub inputs: Vec<HistoryInput>,
    pub outputs: Vec<HistoryOutput>,
}

/// A spent reference inside a history transaction. Fields are optional
/// because foreign inputs may be unknown to the indexer; absence is
/// distinct from zero.
#[derive(Debug, Clone)]
pub struct HistoryInput {
    pub address: Option<String>,
    pub value: Option<u64>,
    pub previous_tx_hash: Option<String>,
    pub previous_output_index: u32,
}

/// An output inside a history transaction.
#[derive(Debug, Clone)]
pub struct HistoryOutput {
    pub output_index: u32,
    pub value: u64,
    pub address: Option<String>,
}

/// Remote chain indexer.
#[async_trait]
pub trait Explorer: Send + Sync {
    /// Confirmed and unconfirmed transactions touching `address`, in
    /// chronological order.
    async fn address_history(&self, address: &str) -> Result<Vec<HistoryTx>, WalletError>;

    /// Current chain tip height.
    async fn current_block_height(&self) -> Result<u32, WalletError>;

    /// Recommended fee rate in satoshis per byte.
    async fn recommended_fee_rate(&self) -> Result<u64, WalletError>;
}

/// External signing device or library. The engine hands over an unsigned
/// draft and receives serialized signed bytes; it never sees key material
/// and does not interpret signing failures.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(
        &self,
        draft: &TransactionDraft,
        account: &Account,
    ) -> Result<Vec<u8>, WalletError>;
}

/// Blob storage keyed by account id.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, account_id: &str) -> Result<Option<Vec<u8>>, WalletError>;
    async fn put(&self, account_id: &str, blob: &[u8]) -> Result<(), WalletError>;
}
