//! # Derivation Constants
//!
//! Every storage name and reserved tag the derivation pipeline relies on
//! lives here. Runtime upgrades rename things; when they do, this is the one
//! file that should change.

// ---------------------------------------------------------------------------
// Reserved Tags
// ---------------------------------------------------------------------------

/// Lock identifier the vesting module places on vesting accounts.
/// Eight bytes, space-padded, exactly as the runtime writes it.
pub const VESTING_LOCK_ID: [u8; 8] = *b"vesting ";

/// Lock amount meaning "the whole free balance is frozen". The runtime uses
/// the maximum representable balance rather than a separate flag.
pub const FULLY_FROZEN_AMOUNT: u128 = u128::MAX;

// ---------------------------------------------------------------------------
// Module & Storage Names
// ---------------------------------------------------------------------------

/// Module family whose instances track balances.
pub const BALANCES_FAMILY: &str = "balances";

/// The primary balances instance. Legacy runtimes only ever have this one.
pub const PRIMARY_BALANCES_INSTANCE: &str = "balances";

/// Module hosting account info on current runtimes.
pub const SYSTEM_MODULE: &str = "system";

/// Storage item holding per-account info. Its presence (under `system` or
/// the primary balances instance) marks a current-shape runtime.
pub const ACCOUNT_ITEM: &str = "account";

/// Per-instance lock storage item.
pub const LOCKS_ITEM: &str = "locks";

/// Per-instance named reserves storage item.
pub const RESERVES_ITEM: &str = "reserves";

/// Legacy runtimes keep the schedule inside the balances module under this
/// item; current runtimes have a dedicated `vesting` module with the same
/// item name.
pub const VESTING_ITEM: &str = "vesting";

/// Dedicated vesting module on current runtimes.
pub const VESTING_MODULE: &str = "vesting";

// ---------------------------------------------------------------------------
// Devnet
// ---------------------------------------------------------------------------

/// Spec name reported by the in-memory devnet runtime.
pub const DEVNET_SPEC_NAME: &str = "nova-devnet";

/// Default interval between devnet blocks, in milliseconds.
pub const DEVNET_BLOCK_TIME_MS: u64 = 2_000;
