//! Unsigned transaction assembly and the max-spendable estimate.

use tracing::debug;

use crate::account::{Account, OutPoint, Utxo};
use crate::derivation::{validate_destination, ChainType};
use crate::error::WalletError;
use crate::fees::{estimate_fee, estimate_tx_size};
use crate::picking::PickingStrategy;

/// One output of a draft transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOutput {
    pub address: String,
    pub value: u64,
    pub is_change: bool,
}

/// An unsigned transaction ready for an external signer.
///
/// Ephemeral: consumed once by the signer and then discarded, never
/// persisted. Output ordering is deterministic: requested outputs first in
/// request order, change (if any) last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionDraft {
    /// Selected UTXOs, in selection order.
    pub inputs: Vec<Utxo>,
    pub outputs: Vec<DraftOutput>,
    pub fee_per_byte: u64,
    /// Estimated virtual size in bytes for the final input/output shape.
    pub estimated_size: u64,
    /// Fee actually paid: input total minus output total.
    pub fee: u64,
}

impl TransactionDraft {
    /// Value returned to the account through the change output, if one
    /// exists.
    pub fn change_value(&self) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.is_change)
            .map(|o| o.value)
            .sum()
    }
}

/// Build an unsigned transaction paying `amount` to `destination`.
///
/// The amount is split across several outputs when it exceeds the
/// account's configured maximum single-output value. Inputs come from the
/// picking strategy; change above the dust threshold goes to a freshly
/// derived internal address, anything smaller is folded into the fee.
pub fn build_transaction(
    account: &Account,
    destination: &str,
    amount: u64,
    fee_per_byte: u64,
    strategy: &dyn PickingStrategy,
) -> Result<TransactionDraft, WalletError> {
    validate_destination(destination, account.key.network)?;
    if amount == 0 {
        return Err(WalletError::InvalidAmount(
            "amount must be greater than zero".into(),
        ));
    }
    if account.config.max_output_value == 0 {
        return Err(WalletError::InvalidAmount(
            "maximum output value must be greater than zero".into(),
        ));
    }

    let request_values = split_amount(amount, account.config.max_output_value);
    let request_count = request_values.len();
    let available: Vec<Utxo> = account.utxos().cloned().collect();
    let scheme = account.key.scheme;

    // First assume a change output will be needed; if even the full UTXO
    // set cannot carry that shape, retry with the spend-everything shape
    // before giving up.
    let (selection, has_change_slot) =
        match strategy.select(&available, amount, fee_per_byte, request_count + 1) {
            Ok(selection) => (selection, true),
            Err(WalletError::InsufficientFunds { .. }) => (
                strategy.select(&available, amount, fee_per_byte, request_count)?,
                false,
            ),
            Err(e) => return Err(e),
        };

    let mut outputs: Vec<DraftOutput> = request_values
        .into_iter()
        .map(|value| DraftOutput {
            address: destination.to_string(),
            value,
            is_change: false,
        })
        .collect();

    let change = selection.total - amount - selection.fee;
    let (estimated_size, fee) = if has_change_slot && change > account.config.dust_threshold {
        let change_address = account.fresh_address(ChainType::Internal)?;
        outputs.push(DraftOutput {
            address: change_address.address,
            value: change,
            is_change: true,
        });
        (
            estimate_tx_size(selection.selected.len(), request_count + 1, scheme),
            selection.fee,
        )
    } else {
        // No change output: the remainder (zero or dust, or a remainder
        // the transaction cannot afford to return) goes to the fee.
        (
            estimate_tx_size(selection.selected.len(), request_count, scheme),
            selection.total - amount,
        )
    };

    debug!(
        inputs = selection.selected.len(),
        outputs = outputs.len(),
        fee,
        "built transaction draft"
    );

    Ok(TransactionDraft {
        inputs: selection.selected,
        outputs,
        fee_per_byte,
        estimated_size,
        fee,
    })
}

/// Largest amount sendable in a single output after fees.
///
/// Sums the eligible UTXOs and subtracts the fee for a transaction
/// spending all of them into one output; spending everything leaves no
/// change. Shares the size table with the builder, so a build for exactly
/// this amount succeeds. Never negative: a fee rate that would consume
/// the whole balance yields zero.
pub fn estimate_max_spendable(
    account: &Account,
    fee_per_byte: u64,
    excluded: &[OutPoint],
) -> u64 {
    let eligible: Vec<&Utxo> = account
        .utxos()
        .filter(|u| !excluded.contains(&u.outpoint()))
        .collect();
    if eligible.is_empty() {
        return 0;
    }

    let total: u64 = eligible.iter().map(|u| u.value).sum();
    let fee = estimate_fee(
        estimate_tx_size(eligible.len(), 1, account.key.scheme),
        fee_per_byte,
    );
    total.saturating_sub(fee)
}

/// Split `amount` into `ceil(amount / max_output_value)` chunks summing
/// exactly to `amount`, all but the last at the cap. `max_output_value`
/// must be nonzero; the builder rejects a zero cap before calling this.
fn split_amount(amount: u64, max_output_value: u64) -> Vec<u64> {
    let mut values = Vec::new();
    let mut remaining = amount;
    while remaining > max_output_value {
        values.push(max_output_value);
        remaining -= max_output_value;
    }
    values.push(remaining);
    values
}
