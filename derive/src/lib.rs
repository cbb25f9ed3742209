// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Balances — Derivation Library
//!
//! Turns raw, live chain state into the balance view a wallet shows:
//! free, reserved, locked, available, and vesting progress, per balances
//! instance, recomputed every time the chain moves.
//!
//! ## Architecture
//!
//! - **types** — Raw chain values and the derived views built from them.
//! - **locks** — Which locks apply at a height and how much they freeze.
//! - **vesting** — Linear vesting projection.
//! - **view** — Pure composition of one derived result.
//! - **source** — The chain collaborator traits and the feed type.
//! - **query** — Lock/vesting query plans for legacy and current runtimes.
//! - **pipeline** — Live fan-in, recomputation, and per-key sharing.
//! - **memory** — An in-memory chain for tests and the devnet node.
//! - **config** — Storage names and other constants.
//!
//! Everything above `pipeline` is pure and synchronous. Only the pipeline
//! touches streams, and only through [`source::ChainSource`].

pub mod config;
pub mod error;
pub mod locks;
pub mod memory;
pub mod pipeline;
pub mod query;
pub mod source;
pub mod types;
pub mod vesting;
pub mod view;

pub use error::{DeriveError, DeriveResult};
pub use memory::MemoryChain;
pub use pipeline::{BalanceDeriver, DerivationCache, ScopeId};
pub use query::{NormalizedLocks, QueryAdapter};
pub use source::{ChainSource, Feed, RuntimeRegistry, StorageQuery, StorageValue};
pub use types::{
    AccountBalances, AccountId, Balance, BalanceData, BlockNumber, DerivedBalances,
    DerivedInstance, LockEntry, LockId, ReserveEntry, VestingSchedule,
};
pub use vesting::VestingProgress;
