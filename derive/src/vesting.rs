//! # Vesting Projection
//!
//! A schedule releases `per_block` units every block after
//! `starting_block` until `total` has been released. Projection answers:
//! how much has vested by now, how much of the vesting lock can be claimed,
//! and at which block the schedule completes.

use serde::{Deserialize, Serialize};

use crate::error::{DeriveError, DeriveResult};
use crate::types::{balance_serde, Balance, BlockNumber, VestingSchedule};

/// Vesting progress of an account at a given height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VestingProgress {
    /// The schedule has started and a vesting lock is still in force.
    pub is_vesting: bool,
    /// Released so far, capped at the schedule total.
    #[serde(with = "balance_serde")]
    pub vested_balance: Balance,
    /// Part of the vesting lock that can be unlocked right now.
    #[serde(with = "balance_serde")]
    pub vested_claimable: Balance,
    /// Block at which the whole total has been released.
    pub vesting_end_block: BlockNumber,
    #[serde(with = "balance_serde")]
    pub vesting_per_block: Balance,
    #[serde(with = "balance_serde")]
    pub vesting_total: Balance,
}

/// Projects `schedule` at height `best`.
///
/// `vesting_locked` is the primary instance's active vesting lock amount
/// (see [`crate::locks::resolve_locks`]). No schedule yields all zeros.
///
/// # Errors
///
/// Returns [`DeriveError::MalformedSchedule`] for a schedule whose
/// `per_block` is zero.
pub fn project_vesting(
    schedule: Option<&VestingSchedule>,
    best: BlockNumber,
    vesting_locked: Balance,
) -> DeriveResult<VestingProgress> {
    let Some(schedule) = schedule else {
        return Ok(VestingProgress::default());
    };

    if schedule.per_block == 0 {
        return Err(DeriveError::MalformedSchedule {
            starting_block: schedule.starting_block,
        });
    }

    let started = best > schedule.starting_block;
    let vested_now = if started {
        let elapsed = Balance::from(best - schedule.starting_block);
        schedule.per_block.saturating_mul(elapsed)
    } else {
        0
    };
    let vested_balance = vested_now.min(schedule.total);
    let is_vesting = started && vesting_locked != 0;

    let (vested_claimable, vesting_end_block) = if is_vesting {
        let still_locked = schedule.total - vested_balance;
        (
            vesting_locked.saturating_sub(still_locked),
            end_block(schedule),
        )
    } else {
        (0, 0)
    };

    Ok(VestingProgress {
        is_vesting,
        vested_balance,
        vested_claimable,
        vesting_end_block,
        vesting_per_block: schedule.per_block,
        vesting_total: schedule.total,
    })
}

/// `starting_block + ceil(total / per_block)`, saturating. Caller guarantees
/// a non-zero `per_block`.
fn end_block(schedule: &VestingSchedule) -> BlockNumber {
    let blocks = schedule.total.div_ceil(schedule.per_block);
    let blocks = BlockNumber::try_from(blocks).unwrap_or(BlockNumber::MAX);
    schedule.starting_block.saturating_add(blocks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
