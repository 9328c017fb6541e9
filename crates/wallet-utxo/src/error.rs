use thiserror::Error;

/// Wallet engine errors.
///
/// Computational failures (insufficient funds, invalid destination) are
/// deterministic for a given input and must not be retried; I/O failures
/// (explorer, storage, signer) are surfaced immediately so the caller can
/// apply its own retry policy.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("derivation error: {0}")]
    Derivation(String),

    #[error("sync error: {0}")]
    Sync(String),

    #[error("insufficient funds: have {available} sat, need {required} sat")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("storage error: {0}")]
    Storage(String),
}
