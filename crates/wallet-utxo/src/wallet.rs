//! The wallet facade: owns the collaborator capabilities and enforces the
//! per-account exclusivity invariant.
//!
//! Every account lives behind its own async mutex, held across a whole
//! sync or build. Concurrent syncs on the same account therefore
//! serialize, and a build always observes either the pre- or post-sync
//! ledger, never a torn intermediate state. The engine spawns no
//! background work; all I/O is caller-driven request/response, and a
//! caller dropping a sync future between suspension points leaves the
//! last committed ledger intact.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::account::{Account, AccountConfig, OutPoint};
use crate::builder::{self, TransactionDraft};
use crate::derivation::{AddressScheme, ChainType, DerivedAddress, ExtendedPubKey, Network};
use crate::error::WalletError;
use crate::explorer::{Explorer, Signer, Storage};
use crate::picking::PickingStrategy;
use crate::serialization;
use crate::sync;

/// Everything needed to instantiate an account from an extended public
/// key.
#[derive(Debug, Clone)]
pub struct AccountParams {
    pub xpub: String,
    pub scheme: AddressScheme,
    pub network: Network,
    /// Account-level derivation path, e.g. `44'/0'/0'`.
    pub path: String,
    pub config: AccountConfig,
}

/// Shared handle to one account's mutable ledger.
#[derive(Clone)]
pub struct AccountHandle(Arc<Mutex<Account>>);

impl AccountHandle {
    fn new(account: Account) -> Self {
        Self(Arc::new(Mutex::new(account)))
    }

    /// Run `f` against a consistent read snapshot of the ledger.
    pub async fn read<R>(&self, f: impl FnOnce(&Account) -> R) -> R {
        let account = self.0.lock().await;
        f(&account)
    }
}

/// Engine facade generic over the explorer and storage collaborators.
pub struct Wallet<E, S> {
    explorer: E,
    storage: S,
    /// One live handle per account id; the map guarantees a single mutex
    /// guards each account no matter how many callers hold handles.
    accounts: Mutex<HashMap<String, AccountHandle>>,
}

impl<E: Explorer, S: Storage> Wallet<E, S> {
    pub fn new(explorer: E, storage: S) -> Self {
        Self {
            explorer,
            storage,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Instantiate (or return the already-live handle for) an account.
    pub async fn generate_account(
        &self,
        params: AccountParams,
    ) -> Result<AccountHandle, WalletError> {
        let mut accounts = self.accounts.lock().await;
        if let Some(handle) = accounts.get(&params.xpub) {
            return Ok(handle.clone());
        }
        let key = ExtendedPubKey::new(&params.xpub, params.scheme, params.network, &params.path)?;
        let handle = AccountHandle::new(Account::new(key, params.config));
        accounts.insert(params.xpub, handle.clone());
        Ok(handle)
    }

    /// Synchronize the account against the explorer. Serialized per
    /// account; an explorer failure leaves the previously committed
    /// ledger visible.
    pub async fn sync_account(&self, handle: &AccountHandle) -> Result<(), WalletError> {
        let mut account = handle.0.lock().await;
        sync::sync_account(&self.explorer, &mut account).await
    }

    pub async fn account_balance(&self, handle: &AccountHandle) -> u64 {
        handle.read(|account| account.balance()).await
    }

    /// First unused external address.
    pub async fn new_receive_address(
        &self,
        handle: &AccountHandle,
    ) -> Result<DerivedAddress, WalletError> {
        handle
            .read(|account| account.fresh_address(ChainType::External))
            .await
    }

    /// Build an unsigned transaction from a consistent ledger snapshot.
    pub async fn build_account_tx(
        &self,
        handle: &AccountHandle,
        destination: &str,
        amount: u64,
        fee_per_byte: u64,
        strategy: &dyn PickingStrategy,
    ) -> Result<TransactionDraft, WalletError> {
        let account = handle.0.lock().await;
        builder::build_transaction(&account, destination, amount, fee_per_byte, strategy)
    }

    /// Largest single-output amount sendable after fees.
    pub async fn estimate_account_max_spendable(
        &self,
        handle: &AccountHandle,
        fee_per_byte: u64,
        excluded: &[OutPoint],
    ) -> u64 {
        let account = handle.0.lock().await;
        builder::estimate_max_spendable(&account, fee_per_byte, excluded)
    }

    /// Hand a draft to the external signer. The engine never touches key
    /// material and passes signing failures through untouched.
    pub async fn sign_account_tx(
        &self,
        signer: &dyn Signer,
        handle: &AccountHandle,
        draft: &TransactionDraft,
    ) -> Result<Vec<u8>, WalletError> {
        let account = handle.0.lock().await;
        signer.sign(draft, &account).await
    }

    /// Fee rate suggested by the explorer, in satoshis per byte.
    pub async fn recommended_fee_rate(&self) -> Result<u64, WalletError> {
        self.explorer.recommended_fee_rate().await
    }

    /// Persist the account's flat record through the storage capability.
    pub async fn save_account(&self, handle: &AccountHandle) -> Result<(), WalletError> {
        let (id, blob) = {
            let account = handle.0.lock().await;
            let record = serialization::export_account(&account);
            (account.id().to_string(), serialization::to_blob(&record)?)
        };
        self.storage.put(&id, &blob).await?;
        debug!(account = %id, bytes = blob.len(), "account saved");
        Ok(())
    }

    /// Restore an account from storage. Returns the live handle if the
    /// account is already loaded, `None` if storage has no record.
    pub async fn load_account(
        &self,
        account_id: &str,
        config: AccountConfig,
    ) -> Result<Option<AccountHandle>, WalletError> {
        // The registry lock is never held across the storage fetch: a
        // slow read must not stall operations on other accounts.
        {
            let accounts = self.accounts.lock().await;
            if let Some(handle) = accounts.get(account_id) {
                return Ok(Some(handle.clone()));
            }
        }
        let Some(blob) = self.storage.get(account_id).await? else {
            return Ok(None);
        };
        let record = serialization::from_blob(&blob)?;
        let account = serialization::import_account(&record, config)?;

        let mut accounts = self.accounts.lock().await;
        // A concurrent load may have won the race while the lock was
        // released; its handle stays authoritative.
        if let Some(handle) = accounts.get(account_id) {
            return Ok(Some(handle.clone()));
        }
        let handle = AccountHandle::new(account);
        accounts.insert(account_id.to_string(), handle.clone());
        Ok(Some(handle))
    }
}
