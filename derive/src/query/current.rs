//! Current runtimes: any number of balances instances, each with its own
//! lock (and reserve) storage, plus an optional dedicated vesting module.

use tracing::debug;

use crate::config::{BALANCES_FAMILY, LOCKS_ITEM, RESERVES_ITEM, VESTING_ITEM, VESTING_MODULE};
use crate::error::DeriveResult;
use crate::source::{RuntimeRegistry, StorageQuery, StorageValue};

use super::{NormalizedLocks, Reply};

/// What can be queried for one balances instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstancePlan {
    pub name: String,
    /// `None` when the instance has no lock storage and no override.
    pub locks: Option<StorageQuery>,
    pub reserves: Option<StorageQuery>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentAdapter {
    instances: Vec<InstancePlan>,
    vesting: Option<StorageQuery>,
}

impl CurrentAdapter {
    pub fn resolve(registry: &dyn RuntimeRegistry) -> Self {
        let spec_name = registry.spec_name();
        let present = |query: StorageQuery| Some(query).filter(|q| registry.has_query(q));

        let instances = registry
            .module_instances(&spec_name, BALANCES_FAMILY)
            .into_iter()
            .map(|name| {
                let locks = registry
                    .custom_lock_query(&name)
                    .or_else(|| present(StorageQuery::new(&name, LOCKS_ITEM)));
                if locks.is_none() {
                    debug!(instance = %name, "balances instance has no lock storage");
                }
                InstancePlan {
                    reserves: present(StorageQuery::new(&name, RESERVES_ITEM)),
                    locks,
                    name,
                }
            })
            .collect();

        Self {
            instances,
            vesting: present(StorageQuery::new(VESTING_MODULE, VESTING_ITEM)),
        }
    }

    pub fn instances(&self) -> &[InstancePlan] {
        &self.instances
    }

    /// Vesting first, then every resolved lock query, then every resolved
    /// reserves query.
    pub fn keys(&self) -> Vec<StorageQuery> {
        let locks = self.instances.iter().filter_map(|i| i.locks.clone());
        let reserves = self.instances.iter().filter_map(|i| i.reserves.clone());
        self.vesting
            .clone()
            .into_iter()
            .chain(locks)
            .chain(reserves)
            .collect()
    }

    /// Re-expands a reply to one lock list and one reserve list per
    /// instance, empty where the instance was not queried.
    pub fn normalize(&self, values: Vec<StorageValue>) -> DeriveResult<NormalizedLocks> {
        let mut reply = Reply::new(values, self.keys().len())?;

        let vesting = match self.vesting {
            Some(_) => reply.next()?.into_vesting()?,
            None => None,
        };

        let locks = self
            .instances
            .iter()
            .map(|instance| match instance.locks {
                Some(_) => reply.next()?.into_locks(),
                None => Ok(Vec::new()),
            })
            .collect::<DeriveResult<Vec<_>>>()?;

        let reserves = self
            .instances
            .iter()
            .map(|instance| match instance.reserves {
                Some(_) => reply.next()?.into_reserves(),
                None => Ok(Vec::new()),
            })
            .collect::<DeriveResult<Vec<_>>>()?;

        Ok(NormalizedLocks {
            vesting,
            locks,
            reserves,
        })
    }
}
