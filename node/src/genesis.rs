//! # Devnet Genesis
//!
//! Describes the initial state of the in-memory devnet: the runtime shape
//! (which decides how locks and vesting are stored), the balances
//! instances, the starting height, and every seeded account.
//!
//! ```json
//! {
//!   "shape": "current",
//!   "instances": ["balances", "poolBalances"],
//!   "bestNumber": 8,
//!   "accounts": [{
//!     "address": "nova1alice",
//!     "freeBalance": "1000", "reservedBalance": "50",
//!     "locks": { "balances": [{ "id": "vesting", "amount": "100" }] },
//!     "vesting": { "locked": "100", "perBlock": "10", "startingBlock": 5 }
//!   }]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use nova_derive::config::PRIMARY_BALANCES_INSTANCE;
use nova_derive::types::LegacyVestingSchedule;
use nova_derive::{
    AccountBalances, BalanceData, BlockNumber, LockEntry, LockId, MemoryChain, ReserveEntry,
    VestingSchedule,
};

/// How the devnet runtime stores locks and vesting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeShape {
    Legacy,
    #[default]
    Current,
}

fn default_instances() -> Vec<String> {
    vec![PRIMARY_BALANCES_INSTANCE.to_string()]
}

fn default_true() -> bool {
    true
}

/// One seeded account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisAccount {
    pub address: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(flatten)]
    pub data: BalanceData,
    /// Components for the secondary instances, in instance order.
    #[serde(default)]
    pub additional: Vec<BalanceData>,
    /// Locks keyed by balances instance name.
    #[serde(default)]
    pub locks: BTreeMap<String, Vec<LockEntry>>,
    /// Named reserves keyed by balances instance name.
    #[serde(default)]
    pub reserves: BTreeMap<String, Vec<ReserveEntry>>,
    #[serde(default)]
    pub vesting: Option<VestingSchedule>,
}

/// Initial devnet state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genesis {
    #[serde(default)]
    pub shape: RuntimeShape,
    /// Balances instances, primary first. Legacy runtimes only have the
    /// primary.
    #[serde(default = "default_instances")]
    pub instances: Vec<String>,
    /// Whether the runtime stores vesting schedules at all.
    #[serde(default = "default_true")]
    pub vesting_module: bool,
    #[serde(default)]
    pub best_number: BlockNumber,
    #[serde(default)]
    pub accounts: Vec<GenesisAccount>,
}

impl Genesis {
    /// Reads a genesis file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read genesis file {}", path.display()))?;
        let genesis: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse genesis file {}", path.display()))?;
        genesis.validate()?;
        Ok(genesis)
    }

    /// Reads `path` if given, the built-in devnet genesis otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::devnet()),
        }
    }

    /// Built-in devnet: two balances instances and three accounts covering
    /// vesting, a fully frozen balance, and a secondary-instance lock.
    pub fn devnet() -> Self {
        let alice = GenesisAccount {
            address: "nova1alice".into(),
            nonce: 3,
            data: BalanceData::new(1_000_000, 5_000),
            additional: vec![BalanceData::new(20_000, 0)],
            locks: BTreeMap::from([
                (
                    "balances".to_string(),
                    vec![
                        LockEntry::new(LockId::VESTING, 500_000),
                        LockEntry::new(*b"staking ", 250_000),
                    ],
                ),
                (
                    "poolBalances".to_string(),
                    vec![LockEntry::new(*b"pool    ", 7_500)],
                ),
            ]),
            reserves: BTreeMap::from([(
                "balances".to_string(),
                vec![ReserveEntry {
                    id: LockId(*b"registry"),
                    amount: 5_000,
                }],
            )]),
            vesting: Some(VestingSchedule {
                total: 500_000,
                per_block: 1_000,
                starting_block: 10,
            }),
        };
        let bob = GenesisAccount {
            address: "nova1bob".into(),
            nonce: 0,
            data: BalanceData::new(75_000, 0),
            additional: Vec::new(),
            locks: BTreeMap::from([(
                "balances".to_string(),
                vec![LockEntry::new(*b"frozen  ", u128::MAX)],
            )]),
            reserves: BTreeMap::new(),
            vesting: None,
        };
        let carol = GenesisAccount {
            address: "nova1carol".into(),
            nonce: 12,
            data: BalanceData::new(300, 0),
            additional: vec![BalanceData::new(900, 100)],
            locks: BTreeMap::new(),
            reserves: BTreeMap::new(),
            vesting: None,
        };

        Self {
            shape: RuntimeShape::Current,
            instances: vec!["balances".into(), "poolBalances".into()],
            vesting_module: true,
            best_number: 1,
            accounts: vec![alice, bob, carol],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.instances.is_empty() {
            bail!("genesis declares no balances instances");
        }
        if self.shape == RuntimeShape::Legacy && self.instances != default_instances() {
            bail!(
                "legacy runtimes have exactly one balances instance named {:?}",
                PRIMARY_BALANCES_INSTANCE
            );
        }
        for account in &self.accounts {
            if account.address.is_empty() {
                bail!("genesis account with empty address");
            }
            for instance in account.locks.keys().chain(account.reserves.keys()) {
                if !self.instances.contains(instance) {
                    bail!(
                        "account {} references unknown balances instance {:?}",
                        account.address,
                        instance
                    );
                }
            }
            if self.shape == RuntimeShape::Legacy && !account.reserves.is_empty() {
                bail!("account {}: legacy runtimes have no named reserves", account.address);
            }
        }
        Ok(())
    }

    /// Builds the in-memory chain this genesis describes.
    pub fn build_chain(&self) -> Result<Arc<MemoryChain>> {
        self.validate()?;

        let chain = match self.shape {
            RuntimeShape::Legacy => MemoryChain::legacy(),
            RuntimeShape::Current => {
                let instances: Vec<&str> = self.instances.iter().map(String::as_str).collect();
                MemoryChain::current(&instances)
            }
        };
        let chain = if self.vesting_module {
            chain
        } else {
            chain.without_vesting()
        };
        chain.set_best_number(self.best_number);

        for account in &self.accounts {
            let mut balances = AccountBalances::new(account.address.as_str(), account.data);
            balances.account_nonce = account.nonce;
            balances.additional = account.additional.clone();
            chain.set_account(&account.address, balances);

            for (instance, locks) in &account.locks {
                chain.set_locks(instance, &account.address, locks.clone());
            }
            for (instance, reserves) in &account.reserves {
                chain.set_reserves(instance, &account.address, reserves.clone());
            }
            match (self.shape, account.vesting) {
                (_, None) => {}
                (RuntimeShape::Current, Some(schedule)) => {
                    chain.set_vesting(&account.address, Some(schedule));
                }
                (RuntimeShape::Legacy, Some(schedule)) => {
                    chain.set_legacy_vesting(
                        &account.address,
                        Some(LegacyVestingSchedule {
                            offset: schedule.total,
                            per_block: schedule.per_block,
                            starting_block: schedule.starting_block,
                        }),
                    );
                }
            }
        }

        tracing::info!(
            shape = ?self.shape,
            instances = self.instances.len(),
            accounts = self.accounts.len(),
            best = self.best_number,
            "devnet genesis loaded"
        );
        Ok(Arc::new(chain))
    }
}
