//! # In-Memory Chain
//!
//! A [`ChainSource`] and [`RuntimeRegistry`] backed by `tokio::sync::watch`
//! channels instead of a remote node. Every storage slot is a watch channel:
//! subscribers get the current value immediately and every later change.
//!
//! The runtime shape is configurable (legacy or current, any set of
//! balances instances, optional vesting, custom lock overrides), which makes
//! this the collaborator for tests and for the devnet node. Counters record
//! how often each kind of query was issued and how many storage feeds are
//! still alive, so deduplication and cancellation can be observed from the
//! outside.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::{future, stream};
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::config::{
    ACCOUNT_ITEM, BALANCES_FAMILY, DEVNET_SPEC_NAME, LOCKS_ITEM, PRIMARY_BALANCES_INSTANCE,
    RESERVES_ITEM, SYSTEM_MODULE, VESTING_ITEM, VESTING_MODULE,
};
use crate::error::{DeriveError, DeriveResult};
use crate::source::{ChainSource, Feed, RuntimeRegistry, StorageQuery, StorageValue};
use crate::types::{
    AccountBalances, AccountId, BlockNumber, LegacyVestingSchedule, LockEntry, ReserveEntry,
    VestingSchedule,
};

/// What a declared storage item holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryKind {
    Account,
    Locks,
    Reserves,
    Vesting,
    LegacyVesting,
}

impl QueryKind {
    /// Value of a slot nobody has written yet. `None` for items that are
    /// not served through storage queries.
    fn empty_value(self) -> Option<StorageValue> {
        match self {
            Self::Account => None,
            Self::Locks => Some(StorageValue::Locks(Vec::new())),
            Self::Reserves => Some(StorageValue::Reserves(Vec::new())),
            Self::Vesting => Some(StorageValue::Vesting(None)),
            Self::LegacyVesting => Some(StorageValue::LegacyVesting(None)),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    account_subscriptions: AtomicUsize,
    storage_queries: AtomicUsize,
    batch_queries: AtomicUsize,
    live_storage_feeds: Arc<AtomicUsize>,
}

/// Decrements the live-feed counter when the owning feed is dropped.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

type SlotKey = (StorageQuery, AccountId);

/// In-memory ledger with a configurable runtime shape.
#[derive(Debug)]
pub struct MemoryChain {
    spec_name: String,
    instances: Vec<String>,
    queries: HashMap<StorageQuery, QueryKind>,
    custom_locks: HashMap<String, StorageQuery>,
    best: watch::Sender<BlockNumber>,
    accounts: RwLock<HashMap<String, watch::Sender<AccountBalances>>>,
    storage: RwLock<HashMap<SlotKey, watch::Sender<StorageValue>>>,
    counters: Counters,
}

impl MemoryChain {
    fn with_queries(instances: Vec<String>, queries: HashMap<StorageQuery, QueryKind>) -> Self {
        Self {
            spec_name: DEVNET_SPEC_NAME.to_string(),
            instances,
            queries,
            custom_locks: HashMap::new(),
            best: watch::channel(0).0,
            accounts: RwLock::new(HashMap::new()),
            storage: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// A current-shape runtime with the given balances instances, each with
    /// lock and reserve storage, plus a vesting module.
    pub fn current(instances: &[&str]) -> Self {
        let mut queries = HashMap::from([
            (StorageQuery::new(SYSTEM_MODULE, ACCOUNT_ITEM), QueryKind::Account),
            (StorageQuery::new(VESTING_MODULE, VESTING_ITEM), QueryKind::Vesting),
        ]);
        for instance in instances {
            queries.insert(StorageQuery::new(*instance, LOCKS_ITEM), QueryKind::Locks);
            queries.insert(StorageQuery::new(*instance, RESERVES_ITEM), QueryKind::Reserves);
        }
        Self::with_queries(instances.iter().map(|s| s.to_string()).collect(), queries)
    }

    /// A legacy runtime: `balances.locks` and `balances.vesting` only.
    pub fn legacy() -> Self {
        let queries = HashMap::from([
            (
                StorageQuery::new(PRIMARY_BALANCES_INSTANCE, LOCKS_ITEM),
                QueryKind::Locks,
            ),
            (
                StorageQuery::new(PRIMARY_BALANCES_INSTANCE, VESTING_ITEM),
                QueryKind::LegacyVesting,
            ),
        ]);
        Self::with_queries(vec![PRIMARY_BALANCES_INSTANCE.to_string()], queries)
    }

    /// Removes the vesting schedule storage of either shape.
    pub fn without_vesting(mut self) -> Self {
        self.queries
            .retain(|_, kind| !matches!(kind, QueryKind::Vesting | QueryKind::LegacyVesting));
        self
    }

    /// Removes one storage item from the runtime.
    pub fn without_query(mut self, query: StorageQuery) -> Self {
        self.queries.remove(&query);
        self
    }

    /// Serves `instance`'s locks from `query` instead of `<instance>.locks`.
    pub fn with_custom_locks(mut self, instance: &str, query: StorageQuery) -> Self {
        self.queries.insert(query.clone(), QueryKind::Locks);
        self.custom_locks.insert(instance.to_string(), query);
        self
    }

    // -- Writes -------------------------------------------------------------

    pub fn set_best_number(&self, best: BlockNumber) {
        self.best.send_replace(best);
    }

    /// Moves the chain forward one block and returns the new height.
    pub fn advance_block(&self) -> BlockNumber {
        self.best.send_modify(|best| *best += 1);
        *self.best.borrow()
    }

    pub fn best_number_now(&self) -> BlockNumber {
        *self.best.borrow()
    }

    pub fn set_account(&self, address: &str, account: AccountBalances) {
        let mut accounts = self.accounts.write();
        match accounts.get(address) {
            Some(sender) => {
                sender.send_replace(account);
            }
            None => {
                accounts.insert(address.to_string(), watch::channel(account).0);
            }
        }
    }

    /// Writes a raw storage value for `account`.
    pub fn set_storage(&self, query: StorageQuery, account: &str, value: StorageValue) {
        let mut storage = self.storage.write();
        let key = (query, account.to_string());
        match storage.get(&key) {
            Some(sender) => {
                sender.send_replace(value);
            }
            None => {
                storage.insert(key, watch::channel(value).0);
            }
        }
    }

    pub fn set_locks(&self, instance: &str, account: &str, locks: Vec<LockEntry>) {
        self.set_storage(
            StorageQuery::new(instance, LOCKS_ITEM),
            account,
            StorageValue::Locks(locks),
        );
    }

    pub fn set_reserves(&self, instance: &str, account: &str, reserves: Vec<ReserveEntry>) {
        self.set_storage(
            StorageQuery::new(instance, RESERVES_ITEM),
            account,
            StorageValue::Reserves(reserves),
        );
    }

    pub fn set_vesting(&self, account: &str, schedule: Option<VestingSchedule>) {
        self.set_storage(
            StorageQuery::new(VESTING_MODULE, VESTING_ITEM),
            account,
            StorageValue::Vesting(schedule),
        );
    }

    pub fn set_legacy_vesting(&self, account: &str, schedule: Option<LegacyVestingSchedule>) {
        self.set_storage(
            StorageQuery::new(PRIMARY_BALANCES_INSTANCE, VESTING_ITEM),
            account,
            StorageValue::LegacyVesting(schedule),
        );
    }

    // -- Counters -----------------------------------------------------------

    /// Account feeds handed out so far.
    pub fn account_subscriptions(&self) -> usize {
        self.counters.account_subscriptions.load(Ordering::SeqCst)
    }

    /// Storage queries issued so far, single and batched.
    pub fn storage_queries(&self) -> usize {
        self.counters.storage_queries.load(Ordering::SeqCst)
    }

    /// Batched storage queries issued so far.
    pub fn batch_queries(&self) -> usize {
        self.counters.batch_queries.load(Ordering::SeqCst)
    }

    /// Storage feeds not yet dropped.
    pub fn live_storage_feeds(&self) -> usize {
        self.counters.live_storage_feeds.load(Ordering::SeqCst)
    }

    // -- Internals ----------------------------------------------------------

    fn storage_receiver(
        &self,
        query: &StorageQuery,
        account: &str,
    ) -> DeriveResult<watch::Receiver<StorageValue>> {
        let empty = self
            .queries
            .get(query)
            .and_then(|kind| kind.empty_value())
            .ok_or_else(|| DeriveError::Upstream(format!("no storage item {}", query)))?;

        let mut storage = self.storage.write();
        let sender = storage
            .entry((query.clone(), account.to_string()))
            .or_insert_with(|| watch::channel(empty).0);
        Ok(sender.subscribe())
    }

    fn live_guard(&self) -> LiveGuard {
        LiveGuard::new(&self.counters.live_storage_feeds)
    }
}

/// Current value first, then every change.
fn watch_feed<T, G>(rx: watch::Receiver<T>, guard: G) -> Feed<T>
where
    T: Clone + Send + Sync + 'static,
    G: Send + 'static,
{
    Box::pin(stream::unfold(
        (rx, true, guard),
        |(mut rx, first, guard)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let value = rx.borrow_and_update().clone();
            Some((Ok(value), (rx, false, guard)))
        },
    ))
}

/// Snapshot of every slot first, then a fresh snapshot whenever any changes.
fn batch_feed(rxs: Vec<watch::Receiver<StorageValue>>, guard: LiveGuard) -> Feed<Vec<StorageValue>> {
    if rxs.is_empty() {
        return Box::pin(stream::once(future::ready(Ok(Vec::new()))));
    }

    Box::pin(stream::unfold(
        (rxs, true, guard),
        |(mut rxs, first, guard)| async move {
            if !first {
                let (changed, _, _) =
                    future::select_all(rxs.iter_mut().map(|rx| Box::pin(rx.changed()))).await;
                if changed.is_err() {
                    return None;
                }
            }
            let values = rxs
                .iter_mut()
                .map(|rx| rx.borrow_and_update().clone())
                .collect();
            Some((Ok(values), (rxs, false, guard)))
        },
    ))
}

fn failed<T: Send + 'static>(err: DeriveError) -> Feed<T> {
    Box::pin(stream::once(future::ready(Err(err))))
}

impl ChainSource for MemoryChain {
    fn account_balances(&self, address: &str) -> Feed<AccountBalances> {
        self.counters
            .account_subscriptions
            .fetch_add(1, Ordering::SeqCst);
        let rx = self
            .accounts
            .write()
            .entry(address.to_string())
            .or_insert_with(|| watch::channel(AccountBalances::unknown()).0)
            .subscribe();
        watch_feed(rx, ())
    }

    fn best_number(&self) -> Feed<BlockNumber> {
        watch_feed(self.best.subscribe(), ())
    }

    fn query_storage(&self, query: &StorageQuery, account: &str) -> Feed<StorageValue> {
        self.counters.storage_queries.fetch_add(1, Ordering::SeqCst);
        match self.storage_receiver(query, account) {
            Ok(rx) => watch_feed(rx, self.live_guard()),
            Err(err) => failed(err),
        }
    }

    fn query_storage_batch(&self, keys: &[(StorageQuery, AccountId)]) -> Feed<Vec<StorageValue>> {
        self.counters.storage_queries.fetch_add(1, Ordering::SeqCst);
        self.counters.batch_queries.fetch_add(1, Ordering::SeqCst);

        let receivers = keys
            .iter()
            .map(|(query, account)| self.storage_receiver(query, account))
            .collect::<DeriveResult<Vec<_>>>();
        match receivers {
            Ok(rxs) => batch_feed(rxs, self.live_guard()),
            Err(err) => failed(err),
        }
    }
}

impl RuntimeRegistry for MemoryChain {
    fn spec_name(&self) -> String {
        self.spec_name.clone()
    }

    fn has_query(&self, query: &StorageQuery) -> bool {
        self.queries.contains_key(query)
    }

    fn module_instances(&self, spec_name: &str, family: &str) -> Vec<String> {
        if spec_name == self.spec_name && family == BALANCES_FAMILY {
            self.instances.clone()
        } else {
            Vec::new()
        }
    }

    fn custom_lock_query(&self, instance: &str) -> Option<StorageQuery> {
        self.custom_locks.get(instance).cloned()
    }
}
