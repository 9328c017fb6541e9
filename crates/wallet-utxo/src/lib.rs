//! UTXO-model wallet engine for Bitcoin-like chains.
//!
//! Given an extended public key the engine derives addresses across four
//! address schemes, discovers on-chain history through a pluggable
//! explorer client with gap-limit semantics, maintains the account's UTXO
//! ledger, selects coins, estimates sizes and fees, and assembles
//! unsigned transactions for an external signer. It never touches private
//! keys, never relays transactions, and performs no consensus validation.

pub mod account;
pub mod builder;
pub mod derivation;
pub mod error;
pub mod explorer;
pub mod fees;
pub mod picking;
pub mod serialization;
pub mod sync;
pub mod wallet;

pub use account::{Account, AccountConfig, OutPoint, SyncCursor, Utxo};
pub use builder::{build_transaction, estimate_max_spendable, DraftOutput, TransactionDraft};
pub use derivation::{
    validate_destination, AddressScheme, ChainType, DerivedAddress, ExtendedPubKey, Network,
};
pub use error::WalletError;
pub use explorer::{Explorer, HistoryInput, HistoryOutput, HistoryTx, Signer, Storage};
pub use fees::{estimate_fee, estimate_tx_size};
pub use picking::{LargestFirst, Merge, PickingStrategy, Selection, SmallestFirst};
pub use serialization::{export_account, import_account, AccountRecord};
pub use sync::sync_account;
pub use wallet::{AccountHandle, AccountParams, Wallet};
