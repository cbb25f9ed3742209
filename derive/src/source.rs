//! # Chain Collaborators
//!
//! The derivation pipeline never talks to a node directly. It consumes live
//! feeds from a [`ChainSource`] and capability answers from a
//! [`RuntimeRegistry`]; transports, decoding, and retries live behind these
//! traits.
//!
//! A feed is a `Stream` that keeps emitting as chain state changes and ends
//! when the collaborator has nothing more to say. Dropping a feed
//! unsubscribes it.

use std::fmt;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{DeriveError, DeriveResult};
use crate::types::{
    AccountBalances, AccountId, BlockNumber, LegacyVestingSchedule, LockEntry, ReserveEntry,
    VestingSchedule,
};

/// A live, push-based feed of values.
pub type Feed<T> = Pin<Box<dyn Stream<Item = DeriveResult<T>> + Send>>;

// ---------------------------------------------------------------------------
// Storage Queries
// ---------------------------------------------------------------------------

/// Identifies one storage item of one runtime module, e.g. `balances.locks`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageQuery {
    pub module: String,
    pub item: String,
}

impl StorageQuery {
    pub fn new(module: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            item: item.into(),
        }
    }
}

impl fmt::Display for StorageQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.item)
    }
}

/// A decoded storage value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum StorageValue {
    Locks(Vec<LockEntry>),
    Reserves(Vec<ReserveEntry>),
    Vesting(Option<VestingSchedule>),
    LegacyVesting(Option<LegacyVestingSchedule>),
}

impl StorageValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Locks(_) => "locks",
            Self::Reserves(_) => "reserves",
            Self::Vesting(_) => "vesting",
            Self::LegacyVesting(_) => "legacyVesting",
        }
    }

    fn mismatch(&self, expected: &str) -> DeriveError {
        DeriveError::UnexpectedReply(format!("expected {}, got {}", expected, self.kind()))
    }

    pub fn into_locks(self) -> DeriveResult<Vec<LockEntry>> {
        match self {
            Self::Locks(locks) => Ok(locks),
            other => Err(other.mismatch("locks")),
        }
    }

    pub fn into_reserves(self) -> DeriveResult<Vec<ReserveEntry>> {
        match self {
            Self::Reserves(reserves) => Ok(reserves),
            other => Err(other.mismatch("reserves")),
        }
    }

    pub fn into_vesting(self) -> DeriveResult<Option<VestingSchedule>> {
        match self {
            Self::Vesting(schedule) => Ok(schedule),
            other => Err(other.mismatch("vesting")),
        }
    }

    /// Legacy schedules are translated to the normalized shape here.
    pub fn into_legacy_vesting(self) -> DeriveResult<Option<VestingSchedule>> {
        match self {
            Self::LegacyVesting(schedule) => Ok(schedule.map(VestingSchedule::from)),
            other => Err(other.mismatch("legacyVesting")),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator Traits
// ---------------------------------------------------------------------------

/// Live chain data.
pub trait ChainSource: Send + Sync {
    /// Balance components of `address`. Reports an account with an empty id
    /// when the address has no on-chain account.
    fn account_balances(&self, address: &str) -> Feed<AccountBalances>;

    /// Best block number.
    fn best_number(&self) -> Feed<BlockNumber>;

    /// One storage item keyed by `account`.
    fn query_storage(&self, query: &StorageQuery, account: &str) -> Feed<StorageValue>;

    /// Several storage items as one feed; each emission carries one value per
    /// key, in key order. Must accept an empty key list.
    fn query_storage_batch(&self, keys: &[(StorageQuery, AccountId)]) -> Feed<Vec<StorageValue>>;
}

/// Runtime metadata: which modules and storage items the live runtime has.
pub trait RuntimeRegistry: Send + Sync {
    /// Name of the running runtime.
    fn spec_name(&self) -> String;

    /// Whether the runtime exposes `query`.
    fn has_query(&self, query: &StorageQuery) -> bool;

    /// Ordered instance names of `family` (e.g. `balances`) in `spec_name`.
    fn module_instances(&self, spec_name: &str, family: &str) -> Vec<String>;

    /// Override for how `instance` exposes its locks, if the caller set one.
    fn custom_lock_query(&self, instance: &str) -> Option<StorageQuery>;
}
