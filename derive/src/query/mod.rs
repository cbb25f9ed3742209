//! # Lock & Vesting Queries Across Runtime Versions
//!
//! Runtimes have stored locks and vesting in two incompatible ways:
//!
//! ```text
//! legacy   — balances.locks + balances.vesting { offset, perBlock, startingBlock }
//! current  — <instance>.locks per balances instance + vesting.vesting { locked, ... }
//!            (the vesting module may be missing entirely)
//! ```
//!
//! [`QueryAdapter::resolve`] inspects the runtime once and picks a strategy.
//! From then on every query goes through the same plan and yields one
//! [`NormalizedLocks`], whichever shape the chain uses. Replies are never
//! retried or reinterpreted: a reply that does not fit the plan is an error.

pub mod current;
pub mod legacy;

use std::sync::Arc;

use futures::{future, stream, StreamExt, TryStreamExt};
use tracing::debug;

use crate::config::{ACCOUNT_ITEM, PRIMARY_BALANCES_INSTANCE, SYSTEM_MODULE};
use crate::error::{DeriveError, DeriveResult};
use crate::source::{ChainSource, Feed, RuntimeRegistry, StorageQuery, StorageValue};
use crate::types::{LockEntry, ReserveEntry, VestingSchedule};

pub use current::{CurrentAdapter, InstancePlan};
pub use legacy::LegacyAdapter;

/// Locks, reserves, and vesting for one account, independent of runtime shape.
///
/// `locks` and `reserves` hold one list per configured balances instance,
/// primary first. Instances the runtime cannot be queried for get empty
/// lists.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NormalizedLocks {
    pub vesting: Option<VestingSchedule>,
    pub locks: Vec<Vec<LockEntry>>,
    pub reserves: Vec<Vec<ReserveEntry>>,
}

impl NormalizedLocks {
    /// No schedule and empty lists for `instances` instances.
    pub fn empty(instances: usize) -> Self {
        Self {
            vesting: None,
            locks: vec![Vec::new(); instances],
            reserves: vec![Vec::new(); instances],
        }
    }
}

/// Query strategy for the live runtime, fixed at setup time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryAdapter {
    Legacy(LegacyAdapter),
    Current(CurrentAdapter),
}

impl QueryAdapter {
    /// Inspects `registry` and builds the matching strategy.
    ///
    /// A runtime exposing `system.account` or `balances.account` uses the
    /// current shape; anything else is legacy.
    pub fn resolve(registry: &dyn RuntimeRegistry) -> Self {
        let is_current = registry.has_query(&StorageQuery::new(SYSTEM_MODULE, ACCOUNT_ITEM))
            || registry.has_query(&StorageQuery::new(PRIMARY_BALANCES_INSTANCE, ACCOUNT_ITEM));

        let adapter = if is_current {
            Self::Current(CurrentAdapter::resolve(registry))
        } else {
            Self::Legacy(LegacyAdapter::resolve(registry))
        };

        debug!(
            spec = %registry.spec_name(),
            shape = adapter.shape(),
            instances = adapter.instance_count(),
            keys = adapter.keys().len(),
            "resolved lock query plan"
        );
        adapter
    }

    /// `"legacy"` or `"current"`, for logs and status output.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Legacy(_) => "legacy",
            Self::Current(_) => "current",
        }
    }

    /// Number of balances instances results are reported for.
    pub fn instance_count(&self) -> usize {
        match self {
            Self::Legacy(_) => 1,
            Self::Current(adapter) => adapter.instances().len(),
        }
    }

    /// Storage keys one query issues, in reply order.
    pub fn keys(&self) -> Vec<StorageQuery> {
        match self {
            Self::Legacy(adapter) => adapter.keys(),
            Self::Current(adapter) => adapter.keys(),
        }
    }

    /// Maps one reply (values in [`Self::keys`] order) to the normalized form.
    pub fn normalize(&self, values: Vec<StorageValue>) -> DeriveResult<NormalizedLocks> {
        match self {
            Self::Legacy(adapter) => adapter.normalize(values),
            Self::Current(adapter) => adapter.normalize(values),
        }
    }

    /// Live normalized locks and vesting for `account`.
    ///
    /// No keys means no query at all: the feed yields the empty result once.
    /// A single key goes through the plain query path, several through one
    /// batch.
    pub fn query(self: &Arc<Self>, source: &dyn ChainSource, account: &str) -> Feed<NormalizedLocks> {
        let keys = self.keys();

        let raw: Feed<Vec<StorageValue>> = match keys.as_slice() {
            [] => {
                debug!(account, "no lock or vesting storage on this runtime");
                return Box::pin(stream::once(future::ready(self.normalize(Vec::new()))));
            }
            [single] => Box::pin(
                source
                    .query_storage(single, account)
                    .map_ok(|value| vec![value]),
            ),
            _ => {
                let batch: Vec<_> = keys
                    .into_iter()
                    .map(|key| (key, account.to_string()))
                    .collect();
                source.query_storage_batch(&batch)
            }
        };

        let adapter = Arc::clone(self);
        Box::pin(raw.map(move |reply| reply.and_then(|values| adapter.normalize(values))))
    }
}

/// Positional reader over one storage reply.
pub(crate) struct Reply {
    values: std::vec::IntoIter<StorageValue>,
}

impl Reply {
    /// Rejects replies whose length differs from the number of keys asked.
    pub(crate) fn new(values: Vec<StorageValue>, expected: usize) -> DeriveResult<Self> {
        if values.len() != expected {
            return Err(DeriveError::UnexpectedReply(format!(
                "expected {} values, got {}",
                expected,
                values.len()
            )));
        }
        Ok(Self {
            values: values.into_iter(),
        })
    }

    pub(crate) fn next(&mut self) -> DeriveResult<StorageValue> {
        self.values
            .next()
            .ok_or_else(|| DeriveError::UnexpectedReply("reply ended early".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryChain;

    #[test]
    fn resolve_picks_current_for_system_account() {
        let chain = MemoryChain::current(&["balances"]);
        assert_eq!(QueryAdapter::resolve(&chain).shape(), "current");
    }

    #[test]
    fn resolve_picks_legacy_without_account_storage() {
        let chain = MemoryChain::legacy();
        let adapter = QueryAdapter::resolve(&chain);
        assert_eq!(adapter.shape(), "legacy");
        assert_eq!(adapter.instance_count(), 1);
    }

    #[test]
    fn reply_length_is_checked() {
        assert!(matches!(
            Reply::new(vec![StorageValue::Locks(vec![])], 2),
            Err(DeriveError::UnexpectedReply(_))
        ));
    }

    #[tokio::test]
    async fn empty_plan_yields_once_without_querying() {
        let chain = MemoryChain::current(&[]).without_vesting();
        let adapter = Arc::new(QueryAdapter::resolve(&chain));
        assert!(adapter.keys().is_empty());

        let results: Vec<_> = adapter.query(&chain, "nova1alice").collect().await;
        assert_eq!(results, vec![Ok(NormalizedLocks::empty(0))]);
        assert_eq!(chain.storage_queries(), 0);
    }

    #[tokio::test]
    async fn single_key_uses_plain_query() {
        let chain = MemoryChain::current(&["balances"])
            .without_vesting()
            .without_query(StorageQuery::new("balances", "reserves"));
        let adapter = Arc::new(QueryAdapter::resolve(&chain));
        assert_eq!(adapter.keys(), vec![StorageQuery::new("balances", "locks")]);

        let first = adapter.query(&chain, "nova1alice").next().await;
        assert_eq!(first, Some(Ok(NormalizedLocks::empty(1))));
        assert_eq!(chain.storage_queries(), 1);
        assert_eq!(chain.batch_queries(), 0);
    }
}
