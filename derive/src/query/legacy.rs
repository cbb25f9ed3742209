//! Legacy runtimes: one balances instance, locks with `until`, and the
//! vesting schedule stored in the balances module itself.

use std::iter;

use crate::config::{LOCKS_ITEM, PRIMARY_BALANCES_INSTANCE, VESTING_ITEM};
use crate::error::DeriveResult;
use crate::source::{RuntimeRegistry, StorageQuery, StorageValue};

use super::{NormalizedLocks, Reply};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LegacyAdapter {
    locks: StorageQuery,
    vesting: Option<StorageQuery>,
}

impl LegacyAdapter {
    pub fn resolve(registry: &dyn RuntimeRegistry) -> Self {
        let vesting = StorageQuery::new(PRIMARY_BALANCES_INSTANCE, VESTING_ITEM);
        Self {
            locks: StorageQuery::new(PRIMARY_BALANCES_INSTANCE, LOCKS_ITEM),
            vesting: Some(vesting).filter(|q| registry.has_query(q)),
        }
    }

    pub fn keys(&self) -> Vec<StorageQuery> {
        iter::once(self.locks.clone())
            .chain(self.vesting.clone())
            .collect()
    }

    /// Reply order: locks, then the legacy schedule if it was queried.
    pub fn normalize(&self, values: Vec<StorageValue>) -> DeriveResult<NormalizedLocks> {
        let expected = 1 + usize::from(self.vesting.is_some());
        let mut reply = Reply::new(values, expected)?;

        let locks = reply.next()?.into_locks()?;
        let vesting = match self.vesting {
            Some(_) => reply.next()?.into_legacy_vesting()?,
            None => None,
        };

        Ok(NormalizedLocks {
            vesting,
            locks: vec![locks],
            reserves: vec![Vec::new()],
        })
    }
}
