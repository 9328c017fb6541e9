//! End-to-end engine tests: account generation -> sync -> persistence ->
//! coin selection -> transaction build -> external signing, driven through
//! the public `Wallet` facade against in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use wallet_utxo::*;

const XPUB: &str = "xpub6CV2NfQJYxHn7MbSQjQip3JMjTZGUbeoKz5xqkBftSZZPc7ssVPdjKrgh6N8U1zoQDxtSo6jLarYAQahpd35SJoUKokfqf1DZgdJWZhSMqP";
const SMALL_UTXO_HASH: &str = "f80246be50064bb254d2cad82fb0d4ce7768582b99c113694e72411f8032fd7a";
const BALANCE: u64 = 109_088;

struct MockExplorer {
    histories: HashMap<String, Vec<HistoryTx>>,
    tip: u32,
    /// Shared so tests can flip the explorer into failure mode after the
    /// wallet has taken ownership of it.
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl Explorer for MockExplorer {
    async fn address_history(&self, address: &str) -> Result<Vec<HistoryTx>, WalletError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(WalletError::Sync("explorer unreachable".into()));
        }
        Ok(self.histories.get(address).cloned().unwrap_or_default())
    }

    async fn current_block_height(&self) -> Result<u32, WalletError> {
        Ok(self.tip)
    }

    async fn recommended_fee_rate(&self) -> Result<u64, WalletError> {
        Ok(5)
    }
}

#[derive(Clone, Default)]
struct MockStorage {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

#[async_trait]
impl Storage for MockStorage {
    async fn get(&self, account_id: &str) -> Result<Option<Vec<u8>>, WalletError> {
        Ok(self.blobs.lock().unwrap().get(account_id).cloned())
    }

    async fn put(&self, account_id: &str, blob: &[u8]) -> Result<(), WalletError> {
        self.blobs
            .lock()
            .unwrap()
            .insert(account_id.to_string(), blob.to_vec());
        Ok(())
    }
}

/// Storage that parks reads of one account id until released, to observe
/// what the wallet can still do while that read is in flight.
struct GatedStorage {
    inner: MockStorage,
    gated_id: String,
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Storage for GatedStorage {
    async fn get(&self, account_id: &str) -> Result<Option<Vec<u8>>, WalletError> {
        if account_id == self.gated_id {
            self.reached.notify_one();
            self.release.notified().await;
        }
        self.inner.get(account_id).await
    }

    async fn put(&self, account_id: &str, blob: &[u8]) -> Result<(), WalletError> {
        self.inner.put(account_id, blob).await
    }
}

struct MockSigner;

#[async_trait]
impl Signer for MockSigner {
    async fn sign(
        &self,
        draft: &TransactionDraft,
        _account: &Account,
    ) -> Result<Vec<u8>, WalletError> {
        // Stands in for a hardware device: deterministic bytes derived
        // from the draft shape.
        Ok(format!("signed:{}:{}", draft.inputs.len(), draft.outputs.len()).into_bytes())
    }
}

struct FailingSigner;

#[async_trait]
impl Signer for FailingSigner {
    async fn sign(
        &self,
        _draft: &TransactionDraft,
        _account: &Account,
    ) -> Result<Vec<u8>, WalletError> {
        Err(WalletError::Signing("device refused".into()))
    }
}

fn account_key() -> ExtendedPubKey {
    ExtendedPubKey::new(XPUB, AddressScheme::Legacy, Network::Mainnet, "44'/0'/0'").unwrap()
}

/// The reference ledger: 108088 sat on external/0 plus a 1000 sat output
/// on external/1, 109088 sat in total.
fn fixture_explorer() -> MockExplorer {
    let key = account_key();
    let ext0 = key.derive_address(ChainType::External, 0).unwrap();
    let ext1 = key.derive_address(ChainType::External, 1).unwrap();

    let mut histories = HashMap::new();
    histories.insert(
        ext0.address.clone(),
        vec![HistoryTx {
            id: "aa".repeat(32),
            block_height: Some(100),
            rbf: false,
            inputs: vec![HistoryInput {
                address: None,
                value: None,
                previous_tx_hash: None,
                previous_output_index: 0,
            }],
            outputs: vec![HistoryOutput {
                output_index: 0,
                value: 108_088,
                address: Some(ext0.address.clone()),
            }],
        }],
    );
    histories.insert(
        ext1.address.clone(),
        vec![HistoryTx {
            id: SMALL_UTXO_HASH.to_string(),
            block_height: Some(101),
            rbf: false,
            inputs: vec![HistoryInput {
                address: None,
                value: None,
                previous_tx_hash: None,
                previous_output_index: 0,
            }],
            outputs: vec![HistoryOutput {
                output_index: 0,
                value: 1_000,
                address: Some(ext1.address.clone()),
            }],
        }],
    );

    MockExplorer {
        histories,
        tip: 200,
        fail: Arc::new(AtomicBool::new(false)),
    }
}

fn params() -> AccountParams {
    AccountParams {
        xpub: XPUB.to_string(),
        scheme: AddressScheme::Legacy,
        network: Network::Mainnet,
        path: "44'/0'/0'".to_string(),
        config: AccountConfig::default(),
    }
}

fn merge_strategy() -> Merge {
    Merge {
        scheme: AddressScheme::Legacy,
        excluded: Vec::new(),
    }
}

#[tokio::test]
async fn sync_discovers_the_reference_balance() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();

    wallet.sync_account(&account).await.unwrap();
    assert_eq!(wallet.account_balance(&account).await, BALANCE);

    // Cursor advanced past the two used external addresses.
    account
        .read(|a| {
            assert_eq!(a.cursor.next_external, 2);
            assert_eq!(a.cursor.next_internal, 0);
            assert_eq!(a.cursor.block_height, Some(200));
            assert_eq!(a.utxo_count(), 2);
        })
        .await;
}

#[tokio::test]
async fn resync_converges_to_the_same_ledger() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();

    wallet.sync_account(&account).await.unwrap();
    let first = account.read(|a| export_account(a)).await;
    wallet.sync_account(&account).await.unwrap();
    let second = account.read(|a| export_account(a)).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn store_and_load_round_trips_the_account() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();
    wallet.save_account(&account).await.unwrap();

    let exported = account.read(|a| export_account(a)).await;
    let restored = import_account(&exported, AccountConfig::default()).unwrap();
    assert_eq!(restored.balance(), BALANCE);
    assert_eq!(export_account(&restored), exported);
}

#[tokio::test]
async fn load_account_reads_back_what_was_saved() {
    let storage = MockStorage::default();
    let wallet = Wallet::new(fixture_explorer(), storage.clone());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();
    wallet.save_account(&account).await.unwrap();

    // A second wallet shares only the storage backend; the account must
    // come back from the persisted blob with the ledger intact.
    let wallet2 = Wallet::new(fixture_explorer(), storage);
    let restored = wallet2
        .load_account(XPUB, AccountConfig::default())
        .await
        .unwrap()
        .expect("account blob should exist");
    assert_eq!(wallet2.account_balance(&restored).await, BALANCE);

    assert!(wallet2
        .load_account("unknown-account", AccountConfig::default())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn slow_storage_read_does_not_block_other_accounts() {
    let backing = MockStorage::default();
    let seeder = Wallet::new(fixture_explorer(), backing.clone());
    let account = seeder.generate_account(params()).await.unwrap();
    seeder.sync_account(&account).await.unwrap();
    seeder.save_account(&account).await.unwrap();

    let reached = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let wallet = Arc::new(Wallet::new(
        fixture_explorer(),
        GatedStorage {
            inner: backing,
            gated_id: XPUB.to_string(),
            reached: reached.clone(),
            release: release.clone(),
        },
    ));

    let slow = tokio::spawn({
        let wallet = wallet.clone();
        async move { wallet.load_account(XPUB, AccountConfig::default()).await }
    });

    // With the gated read parked mid-fetch, lookups for other account
    // ids must still complete instead of queueing behind it.
    reached.notified().await;
    let absent = wallet
        .load_account("unknown-account", AccountConfig::default())
        .await
        .unwrap();
    assert!(absent.is_none());

    release.notify_one();
    let restored = slow
        .await
        .unwrap()
        .unwrap()
        .expect("account blob should exist");
    assert_eq!(wallet.account_balance(&restored).await, BALANCE);
}

#[tokio::test]
async fn estimate_max_spendable_matches_the_reference_numbers() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();

    // Free transactions spend the whole balance.
    assert_eq!(
        wallet.estimate_account_max_spendable(&account, 0, &[]).await,
        BALANCE
    );

    // Excluding the 1000 sat output lowers it accordingly.
    let excluded = vec![OutPoint {
        hash: SMALL_UTXO_HASH.to_string(),
        output_index: 0,
    }];
    assert_eq!(
        wallet
            .estimate_account_max_spendable(&account, 0, &excluded)
            .await,
        BALANCE - 1_000
    );

    // At 100 sat/byte the fee for 2 inputs and 1 output comes off the top.
    let fee_per_byte = 100;
    assert_eq!(
        wallet
            .estimate_account_max_spendable(&account, fee_per_byte, &[])
            .await,
        BALANCE - fee_per_byte * estimate_tx_size(2, 1, AddressScheme::Legacy)
    );

    // A rate high enough to consume the balance yields exactly zero.
    assert_eq!(
        wallet
            .estimate_account_max_spendable(&account, 10_000, &[])
            .await,
        0
    );
}

#[tokio::test]
async fn max_spendable_is_exactly_buildable() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();

    let destination = wallet.new_receive_address(&account).await.unwrap();
    let max = wallet.estimate_account_max_spendable(&account, 0, &[]).await;

    let draft = wallet
        .build_account_tx(&account, &destination.address, max, 0, &merge_strategy())
        .await
        .unwrap();
    assert_eq!(draft.change_value(), 0);
    assert_eq!(draft.outputs.len(), 1);

    let result = wallet
        .build_account_tx(&account, &destination.address, max + 1, 0, &merge_strategy())
        .await;
    assert!(matches!(result, Err(WalletError::InsufficientFunds { .. })));
}

#[tokio::test]
async fn builds_a_deterministic_transaction() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();

    let destination = wallet.new_receive_address(&account).await.unwrap();
    let first = wallet
        .build_account_tx(&account, &destination.address, 100_000, 5, &merge_strategy())
        .await
        .unwrap();
    let second = wallet
        .build_account_tx(&account, &destination.address, 100_000, 5, &merge_strategy())
        .await
        .unwrap();

    // Unchanged ledger, unchanged draft: same inputs, outputs, ordering.
    assert_eq!(first, second);
    assert_eq!(first.outputs[0].address, destination.address);
    assert_eq!(first.outputs[0].value, 100_000);

    let in_total: u64 = first.inputs.iter().map(|u| u.value).sum();
    let out_total: u64 = first.outputs.iter().map(|o| o.value).sum();
    assert_eq!(in_total, out_total + first.fee);

    let signed = wallet
        .sign_account_tx(&MockSigner, &account, &first)
        .await
        .unwrap();
    assert!(!signed.is_empty());
}

#[tokio::test]
async fn builds_a_transaction_splitting_outputs() {
    let explorer = fixture_explorer();
    let wallet = Wallet::new(explorer, MockStorage::default());
    let mut split_params = params();
    split_params.config.max_output_value = 60_000;
    let account = wallet.generate_account(split_params).await.unwrap();
    wallet.sync_account(&account).await.unwrap();

    let destination = wallet.new_receive_address(&account).await.unwrap();
    let draft = wallet
        .build_account_tx(&account, &destination.address, 100_000, 5, &merge_strategy())
        .await
        .unwrap();

    let requested: Vec<_> = draft.outputs.iter().filter(|o| !o.is_change).collect();
    assert_eq!(requested.len(), 2); // ceil(100000 / 60000)
    assert_eq!(requested.iter().map(|o| o.value).sum::<u64>(), 100_000);
    assert!(requested.iter().all(|o| o.value <= 60_000));
}

#[tokio::test]
async fn excluded_outpoints_never_appear_among_inputs() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();

    let destination = wallet.new_receive_address(&account).await.unwrap();
    let excluded = OutPoint {
        hash: "aa".repeat(32),
        output_index: 0,
    };
    let strategy = Merge {
        scheme: AddressScheme::Legacy,
        excluded: vec![excluded.clone()],
    };
    let draft = wallet
        .build_account_tx(&account, &destination.address, 500, 0, &strategy)
        .await
        .unwrap();
    assert!(draft.inputs.iter().all(|u| u.outpoint() != excluded));
}

#[tokio::test]
async fn explorer_failure_aborts_sync_and_preserves_state() {
    let explorer = fixture_explorer();
    let fail = explorer.fail.clone();
    let wallet = Wallet::new(explorer, MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();
    assert_eq!(wallet.account_balance(&account).await, BALANCE);

    // Flip the explorer into failure mode: the sync must error out and
    // the previously committed ledger must stay visible.
    fail.store(true, Ordering::SeqCst);
    let result = wallet.sync_account(&account).await;
    assert!(matches!(result, Err(WalletError::Sync(_))));
    assert_eq!(wallet.account_balance(&account).await, BALANCE);
}

#[tokio::test]
async fn concurrent_syncs_serialize_per_account() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();

    let (a, b) = tokio::join!(
        wallet.sync_account(&account),
        wallet.sync_account(&account)
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(wallet.account_balance(&account).await, BALANCE);
}

#[tokio::test]
async fn signing_failures_pass_through_untouched() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    let account = wallet.generate_account(params()).await.unwrap();
    wallet.sync_account(&account).await.unwrap();

    let destination = wallet.new_receive_address(&account).await.unwrap();
    let draft = wallet
        .build_account_tx(&account, &destination.address, 1_000, 1, &merge_strategy())
        .await
        .unwrap();
    let result = wallet.sign_account_tx(&FailingSigner, &account, &draft).await;
    assert!(matches!(result, Err(WalletError::Signing(_))));
}

#[tokio::test]
async fn recommended_fee_rate_comes_from_the_explorer() {
    let wallet = Wallet::new(fixture_explorer(), MockStorage::default());
    assert_eq!(wallet.recommended_fee_rate().await.unwrap(), 5);
}
