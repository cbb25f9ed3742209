//! # Balance Data Model
//!
//! Raw chain values (locks, reserves, vesting schedules, balance
//! components) and the derived views computed from them.
//!
//! Balances are `u128` in smallest-unit denomination. JSON cannot carry
//! integers that large without loss, so balances serialize as decimal
//! strings and deserialize from numbers, decimal strings, or `0x` hex.
//! Every derived type is rebuilt from scratch on each pipeline tick; none
//! of them is ever mutated in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::config::{FULLY_FROZEN_AMOUNT, VESTING_LOCK_ID};
use crate::vesting::VestingProgress;

/// Amount in smallest units.
pub type Balance = u128;

/// Chain height.
pub type BlockNumber = u64;

/// Account identifier as reported by the node. Empty means "no such account".
pub type AccountId = String;

// ---------------------------------------------------------------------------
// Balance (de)serialization
// ---------------------------------------------------------------------------

/// Serde adapter for [`Balance`] fields.
pub mod balance_serde {
    use super::*;
    use serde::de::{self, Visitor};

    pub fn serialize<S: Serializer>(value: &Balance, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Balance, D::Error> {
        deserializer.deserialize_any(BalanceVisitor)
    }

    /// Parses a decimal or `0x`-prefixed hex balance string.
    pub fn parse(s: &str) -> Result<Balance, String> {
        let s = s.trim();
        match s.strip_prefix("0x") {
            Some(hex) => Balance::from_str_radix(hex, 16),
            None => s.parse::<Balance>(),
        }
        .map_err(|e| format!("invalid balance {:?}: {}", s, e))
    }

    struct BalanceVisitor;

    impl<'de> Visitor<'de> for BalanceVisitor {
        type Value = Balance;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a balance as an integer, decimal string, or 0x-prefixed hex string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Balance, E> {
            Ok(v.into())
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> Result<Balance, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Balance, E> {
            Balance::try_from(v).map_err(|_| E::custom(format!("negative balance {}", v)))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Balance, E> {
            parse(v).map_err(E::custom)
        }
    }
}

/// Legacy locks carry `until`, where zero means "indefinite".
fn deserialize_until<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<BlockNumber>, D::Error> {
    let until = Option::<BlockNumber>::deserialize(deserializer)?;
    Ok(until.filter(|n| *n != 0))
}

// ---------------------------------------------------------------------------
// LockId
// ---------------------------------------------------------------------------

/// Errors parsing a [`LockId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockIdError {
    /// The `0x` form did not decode to exactly eight bytes.
    #[error("invalid lock id hex {0:?}")]
    InvalidHex(String),

    /// A plain-text tag longer than eight bytes.
    #[error("lock id tag is {0} bytes, at most 8 allowed")]
    TooLong(usize),
}

/// Opaque 8-byte lock/reserve identifier.
///
/// Parses from `0x`-prefixed hex or from a plain ASCII tag of up to eight
/// bytes (space-padded, the way runtimes define them).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockId(pub [u8; 8]);

impl LockId {
    /// The tag vesting-origin locks carry.
    pub const VESTING: LockId = LockId(VESTING_LOCK_ID);

    /// Returns `true` for the reserved vesting tag.
    pub fn is_vesting(&self) -> bool {
        *self == Self::VESTING
    }

    /// `0x`-prefixed hex encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 8]> for LockId {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl FromStr for LockId {
    type Err = LockIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(hex_part) = s.strip_prefix("0x") {
            let bytes = hex::decode(hex_part).map_err(|_| LockIdError::InvalidHex(s.into()))?;
            let bytes: [u8; 8] = bytes
                .try_into()
                .map_err(|_| LockIdError::InvalidHex(s.into()))?;
            return Ok(Self(bytes));
        }

        let raw = s.as_bytes();
        if raw.len() > 8 {
            return Err(LockIdError::TooLong(raw.len()));
        }
        let mut bytes = [b' '; 8];
        bytes[..raw.len()].copy_from_slice(raw);
        Ok(Self(bytes))
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            // Always valid UTF-8: every byte is printable ASCII.
            f.write_str(std::str::from_utf8(&self.0).map_err(|_| fmt::Error)?.trim_end())
        } else {
            f.write_str(&self.to_hex())
        }
    }
}

impl fmt::Debug for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockId({})", self)
    }
}

impl Serialize for LockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for LockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Locks & Reserves
// ---------------------------------------------------------------------------

/// One balance lock, in either historical wire shape.
///
/// Legacy locks carry `until` (zero = indefinite); current locks never do.
/// Both land here with `until: None` meaning "until removed". Extra wire
/// fields such as `reasons` are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    pub id: LockId,
    #[serde(with = "balance_serde")]
    pub amount: Balance,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_until"
    )]
    pub until: Option<BlockNumber>,
}

impl LockEntry {
    /// An indefinite lock.
    pub fn new(id: impl Into<LockId>, amount: Balance) -> Self {
        Self {
            id: id.into(),
            amount,
            until: None,
        }
    }

    /// Sets the expiry height. Zero keeps the lock indefinite.
    pub fn until(mut self, height: BlockNumber) -> Self {
        self.until = Some(height).filter(|h| *h != 0);
        self
    }

    /// Still in force at `best`: no expiry, or expiry strictly after it.
    pub fn is_active_at(&self, best: BlockNumber) -> bool {
        self.until.map_or(true, |until| until > best)
    }

    /// Whether this lock freezes the entire balance.
    pub fn is_fully_frozen(&self) -> bool {
        self.amount == FULLY_FROZEN_AMOUNT
    }
}

/// One named reserve held by a balances instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveEntry {
    pub id: LockId,
    #[serde(with = "balance_serde")]
    pub amount: Balance,
}

// ---------------------------------------------------------------------------
// Vesting Schedules
// ---------------------------------------------------------------------------

/// Normalized linear vesting schedule.
///
/// Current runtimes name the total `locked`; that name is accepted as an
/// alias. `per_block` must be non-zero for the schedule to be meaningful.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingSchedule {
    /// Amount locked at `starting_block`.
    #[serde(alias = "locked", with = "balance_serde")]
    pub total: Balance,
    /// Amount released per block after `starting_block`.
    #[serde(with = "balance_serde")]
    pub per_block: Balance,
    pub starting_block: BlockNumber,
}

/// Vesting schedule as legacy runtimes stored it inside the balances module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyVestingSchedule {
    #[serde(with = "balance_serde")]
    pub offset: Balance,
    #[serde(with = "balance_serde")]
    pub per_block: Balance,
    pub starting_block: BlockNumber,
}

impl From<LegacyVestingSchedule> for VestingSchedule {
    fn from(legacy: LegacyVestingSchedule) -> Self {
        Self {
            total: legacy.offset,
            per_block: legacy.per_block,
            starting_block: legacy.starting_block,
        }
    }
}

// ---------------------------------------------------------------------------
// Account Balance Components
// ---------------------------------------------------------------------------

/// Balance components one balances instance tracks for an account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceData {
    #[serde(with = "balance_serde")]
    pub free_balance: Balance,
    #[serde(with = "balance_serde")]
    pub reserved_balance: Balance,
}

impl BalanceData {
    pub fn new(free_balance: Balance, reserved_balance: Balance) -> Self {
        Self {
            free_balance,
            reserved_balance,
        }
    }
}

/// Account balance components as the account feed reports them.
///
/// `data` belongs to the primary balances instance; `additional[i]` belongs
/// to secondary instance `i + 1`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalances {
    #[serde(default)]
    pub account_id: AccountId,
    #[serde(default)]
    pub account_nonce: u64,
    #[serde(flatten)]
    pub data: BalanceData,
    #[serde(default)]
    pub additional: Vec<BalanceData>,
}

impl AccountBalances {
    /// What the account feed reports for an address with no on-chain account.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn new(account_id: impl Into<AccountId>, data: BalanceData) -> Self {
        Self {
            account_id: account_id.into(),
            account_nonce: 0,
            data,
            additional: Vec::new(),
        }
    }

    /// Returns `false` when the node reported no account.
    pub fn is_known(&self) -> bool {
        !self.account_id.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Derived Views
// ---------------------------------------------------------------------------

/// Derived view of one balances instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedInstance {
    #[serde(flatten)]
    pub data: BalanceData,
    /// Free balance not held by any lock. Zero when fully frozen.
    #[serde(with = "balance_serde")]
    pub available_balance: Balance,
    /// Largest active non-sentinel lock.
    #[serde(with = "balance_serde")]
    pub locked_balance: Balance,
    /// Every lock still active at the current height.
    pub locked_breakdown: Vec<LockEntry>,
    /// Sum of active locks tagged as vesting.
    #[serde(with = "balance_serde")]
    pub vesting_locked: Balance,
    #[serde(default)]
    pub named_reserves: Vec<ReserveEntry>,
}

/// Full derived result for one address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedBalances {
    pub account_id: AccountId,
    pub account_nonce: u64,
    #[serde(flatten)]
    pub primary: DerivedInstance,
    #[serde(flatten)]
    pub vesting: VestingProgress,
    /// One view per secondary balances instance, in instance order.
    pub additional: Vec<DerivedInstance>,
}
