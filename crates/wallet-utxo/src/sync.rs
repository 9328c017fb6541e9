//! Incremental account discovery.
//!
//! Each derivation chain (external, internal) is walked independently from
//! the stored cursor: derive, fetch history, merge, until the gap limit of
//! consecutive unused addresses is reached. Merges commit one transaction
//! at a time onto a working copy of the ledger; the copy replaces the
//! account only when the whole walk succeeds, so an explorer failure or a
//! cancellation between suspension points leaves the previously committed
//! state visible, never a half-merged one.

use tracing::{debug, info};

use crate::account::{Account, OutPoint, Utxo};
use crate::derivation::{ChainType, DerivedAddress};
use crate::error::WalletError;
use crate::explorer::{Explorer, HistoryTx};

/// Synchronize `account` against the explorer's view of the chain.
///
/// Idempotent: re-running over unchanged remote history converges to the
/// same ledger. Explorer errors propagate as `Sync` failures without
/// retry; retry policy belongs to the explorer implementation.
pub async fn sync_account<E: Explorer + ?Sized>(
    explorer: &E,
    account: &mut Account,
) -> Result<(), WalletError> {
    let mut next = account.clone();

    for chain_type in [ChainType::External, ChainType::Internal] {
        walk_chain(explorer, &mut next, chain_type).await?;
    }
    next.cursor.block_height = Some(explorer.current_block_height().await?);

    info!(
        account = next.id(),
        addresses = next.addresses.len(),
        utxos = next.utxo_count(),
        balance = next.balance(),
        "sync complete"
    );
    *account = next;
    Ok(())
}

/// Walk one derivation chain up to the configured gap limit.
async fn walk_chain<E: Explorer + ?Sized>(
    explorer: &E,
    account: &mut Account,
    chain_type: ChainType,
) -> Result<(), WalletError> {
    let mut index = account.cursor.next_index(chain_type);
    let mut gap = 0u32;

    while gap < account.config.gap_limit {
        let address = account.key.derive_address(chain_type, index)?;
        let history = explorer.address_history(&address.address).await?;

        if history.is_empty() {
            gap += 1;
        } else {
            debug!(
                chain = %chain_type,
                index,
                transactions = history.len(),
                "address has history"
            );
            for tx in &history {
                merge_transaction(account, &address, tx);
            }
            account.record_address(address);
            account.cursor.set_next_index(chain_type, index + 1);
            gap = 0;
        }
        index += 1;
    }
    Ok(())
}

/// Merge one transaction into the ledger. Applied atomically per
/// transaction and idempotent: every step is a keyed set/map operation,
/// so replaying an already-merged transaction is a no-op.
fn merge_transaction(account: &mut Account, owner: &DerivedAddress, tx: &HistoryTx) {
    // Inputs spending outputs we know about consume them. The outpoint is
    // also remembered as spent so that a funding transaction merged later
    // (explorer order is not guaranteed across addresses) cannot
    // resurrect the UTXO.
    for input in &tx.inputs {
        if let Some(previous_hash) = &input.previous_tx_hash {
            let outpoint = OutPoint {
                hash: previous_hash.clone(),
                output_index: input.previous_output_index,
            };
            account.utxos.remove(&outpoint);
            account.spent.insert(outpoint);
        }
    }

    // Outputs paying the probed address become UTXOs unless already
    // observed spent. Outputs paying other account addresses surface when
    // those addresses are probed with the same transaction.
    for output in &tx.outputs {
        if output.address.as_deref() != Some(owner.address.as_str()) {
            continue;
        }
        let outpoint = OutPoint {
            hash: tx.id.clone(),
            output_index: output.output_index,
        };
        if account.spent.contains(&outpoint) {
            continue;
        }
        account.utxos.insert(
            outpoint,
            Utxo {
                hash: tx.id.clone(),
                output_index: output.output_index,
                block_height: tx.block_height,
                address: owner.address.clone(),
                path: account.key.derivation_path(owner.chain_type, owner.index),
                value: output.value,
                rbf: tx.rbf,
                is_change: owner.chain_type == ChainType::Internal,
            },
        );
    }
}
