//! Pluggable coin-selection strategies.
//!
//! Strategies differ only in the order they consider UTXOs; all share the
//! same termination contract: skip excluded outpoints, then accumulate
//! inputs until the running total covers the target plus the estimated
//! fee, re-estimating the fee after every added input since the
//! transaction grows with each one. A selection that cannot cover the
//! target even with every eligible UTXO fails with `InsufficientFunds`,
//! it never silently under-funds.

use crate::account::{OutPoint, Utxo};
use crate::derivation::AddressScheme;
use crate::error::WalletError;
use crate::fees::{estimate_fee, estimate_tx_size};

/// The outcome of a successful selection.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Chosen UTXOs, in selection order.
    pub selected: Vec<Utxo>,
    /// Total value of the chosen UTXOs in satoshis.
    pub total: u64,
    /// Fee estimated for `selected.len()` inputs and the output count the
    /// caller asked for.
    pub fee: u64,
}

/// A coin-selection algorithm. Implementations hold only configuration
/// (scheme and exclusion list), no mutable shared state, so a strategy
/// value can be reused across builds.
pub trait PickingStrategy: Send + Sync {
    /// Select UTXOs covering `target` plus the fee for a transaction with
    /// `output_count` outputs at `fee_per_byte`.
    fn select(
        &self,
        available: &[Utxo],
        target: u64,
        fee_per_byte: u64,
        output_count: usize,
    ) -> Result<Selection, WalletError>;
}

/// Oldest-first selection: consolidates long-settled outputs before
/// touching recent or unconfirmed ones.
pub struct Merge {
    pub scheme: AddressScheme,
    pub excluded: Vec<OutPoint>,
}

/// Smallest-value-first selection: aggressively shrinks the UTXO set at
/// the price of more inputs.
pub struct SmallestFirst {
    pub scheme: AddressScheme,
    pub excluded: Vec<OutPoint>,
}

/// Largest-value-first selection: minimizes the input count and thus the
/// fee.
pub struct LargestFirst {
    pub scheme: AddressScheme,
    pub excluded: Vec<OutPoint>,
}

impl PickingStrategy for Merge {
    fn select(
        &self,
        available: &[Utxo],
        target: u64,
        fee_per_byte: u64,
        output_count: usize,
    ) -> Result<Selection, WalletError> {
        let mut candidates = eligible(available, &self.excluded);
        // Unconfirmed outputs sort last; ties break on value then outpoint
        // so selection order is reproducible across runs.
        candidates.sort_by(|a, b| {
            height_rank(a)
                .cmp(&height_rank(b))
                .then(a.value.cmp(&b.value))
                .then(a.outpoint().cmp(&b.outpoint()))
        });
        accumulate(candidates, target, fee_per_byte, output_count, self.scheme)
    }
}

impl PickingStrategy for SmallestFirst {
    fn select(
        &self,
        available: &[Utxo],
        target: u64,
        fee_per_byte: u64,
        output_count: usize,
    ) -> Result<Selection, WalletError> {
        let mut candidates = eligible(available, &self.excluded);
        candidates.sort_by(|a, b| a.value.cmp(&b.value).then(a.outpoint().cmp(&b.outpoint())));
        accumulate(candidates, target, fee_per_byte, output_count, self.scheme)
    }
}

impl PickingStrategy for LargestFirst {
    fn select(
        &self,
        available: &[Utxo],
        target: u64,
        fee_per_byte: u64,
        output_count: usize,
    ) -> Result<Selection, WalletError> {
        let mut candidates = eligible(available, &self.excluded);
        candidates.sort_by(|a, b| b.value.cmp(&a.value).then(a.outpoint().cmp(&b.outpoint())));
        accumulate(candidates, target, fee_per_byte, output_count, self.scheme)
    }
}

fn height_rank(utxo: &Utxo) -> u32 {
    utxo.block_height.unwrap_or(u32::MAX)
}

fn eligible(available: &[Utxo], excluded: &[OutPoint]) -> Vec<Utxo> {
    available
        .iter()
        .filter(|u| !excluded.contains(&u.outpoint()))
        .cloned()
        .collect()
}

/// Shared accumulation loop. The fee target moves as inputs are added.
fn accumulate(
    candidates: Vec<Utxo>,
    target: u64,
    fee_per_byte: u64,
    output_count: usize,
    scheme: AddressScheme,
) -> Result<Selection, WalletError> {
    let mut selected: Vec<Utxo> = Vec::new();
    let mut total: u64 = 0;

    for utxo in candidates {
        total = total.saturating_add(utxo.value);
        selected.push(utxo);

        let fee = estimate_fee(
            estimate_tx_size(selected.len(), output_count, scheme),
            fee_per_byte,
        );
        if total >= target.saturating_add(fee) {
            return Ok(Selection {
                selected,
                total,
                fee,
            });
        }
    }

    let fee = estimate_fee(
        estimate_tx_size(selected.len(), output_count, scheme),
        fee_per_byte,
    );
    Err(WalletError::InsufficientFunds {
        available: total,
        required: target.saturating_add(fee),
    })
}
