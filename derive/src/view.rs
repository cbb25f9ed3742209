//! # Derived Views
//!
//! Turns raw balance components plus resolved locks into what wallets
//! actually display: how much can be spent, how much is held, and how far
//! vesting has progressed.

use crate::error::DeriveResult;
use crate::locks::resolve_locks;
use crate::query::NormalizedLocks;
use crate::types::{
    AccountBalances, BalanceData, BlockNumber, DerivedBalances, DerivedInstance, LockEntry,
    ReserveEntry,
};
use crate::vesting::project_vesting;

/// Derived view of a single balances instance.
pub fn compose_instance(
    best: BlockNumber,
    data: &BalanceData,
    locks: Option<&[LockEntry]>,
    reserves: &[ReserveEntry],
) -> DerivedInstance {
    let resolved = resolve_locks(best, locks);

    let available_balance = if resolved.all_locked {
        0
    } else {
        data.free_balance.saturating_sub(resolved.locked_balance)
    };

    DerivedInstance {
        data: *data,
        available_balance,
        locked_balance: resolved.locked_balance,
        locked_breakdown: resolved.locked_breakdown,
        vesting_locked: resolved.vesting_locked,
        named_reserves: reserves.to_vec(),
    }
}

/// Assembles the full derived result for an account.
///
/// Instance 0 is the primary; instance `i + 1` pairs `account.additional[i]`
/// with lock list `i + 1`. The number of lock lists decides how many
/// secondary views are produced; missing components or reserves default to
/// zero/empty.
///
/// # Errors
///
/// Propagates [`crate::DeriveError::MalformedSchedule`] from the vesting
/// projection.
pub fn derive_balances(
    account: &AccountBalances,
    best: BlockNumber,
    normalized: &NormalizedLocks,
) -> DeriveResult<DerivedBalances> {
    let reserves_for = |index: usize| normalized.reserves.get(index).map_or(&[][..], Vec::as_slice);

    let primary = compose_instance(
        best,
        &account.data,
        normalized.locks.first().map(Vec::as_slice),
        reserves_for(0),
    );

    let vesting = project_vesting(normalized.vesting.as_ref(), best, primary.vesting_locked)?;

    let additional = normalized
        .locks
        .iter()
        .enumerate()
        .skip(1)
        .map(|(index, locks)| {
            let data = account
                .additional
                .get(index - 1)
                .copied()
                .unwrap_or_default();
            compose_instance(best, &data, Some(locks), reserves_for(index))
        })
        .collect();

    Ok(DerivedBalances {
        account_id: account.account_id.clone(),
        account_nonce: account.account_nonce,
        primary,
        vesting,
        additional,
    })
}

/// Zero-valued result for an address the node has no account for.
pub fn derive_unknown(account: &AccountBalances) -> DerivedBalances {
    DerivedBalances {
        account_id: account.account_id.clone(),
        account_nonce: account.account_nonce,
        primary: compose_instance(0, &account.data, None, &[]),
        additional: account
            .additional
            .iter()
            .map(|data| compose_instance(0, data, None, &[]))
            .collect(),
        ..DerivedBalances::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeriveError;
    use crate::types::{Balance, LockId, VestingSchedule};

    const STAKING: [u8; 8] = *b"staking ";

    fn account(free: Balance) -> AccountBalances {
        AccountBalances::new("nova1alice", BalanceData::new(free, 25))
    }

    #[test]
    fn available_is_free_minus_largest_lock() {
        let locks = vec![LockEntry::new(STAKING, 300), LockEntry::new(LockId::VESTING, 200)];
        let view = compose_instance(1, &BalanceData::new(1_000, 0), Some(&locks), &[]);

        assert_eq!(view.locked_balance, 300);
        assert_eq!(view.available_balance, 700);
        assert_eq!(view.vesting_locked, 200);
    }

    #[test]
    fn available_floors_at_zero() {
        let locks = vec![LockEntry::new(STAKING, 5_000)];
        let view = compose_instance(1, &BalanceData::new(1_000, 0), Some(&locks), &[]);
        assert_eq!(view.available_balance, 0);
    }

    #[test]
    fn fully_frozen_makes_nothing_available() {
        let locks = vec![LockEntry::new(STAKING, Balance::MAX)];
        let view = compose_instance(1, &BalanceData::new(1_000_000, 0), Some(&locks), &[]);
        assert_eq!(view.available_balance, 0);
        assert_eq!(view.locked_balance, 0);
    }

    #[test]
    fn components_pass_through() {
        let reserves = vec![ReserveEntry {
            id: LockId(*b"deposit "),
            amount: 25,
        }];
        let view = compose_instance(1, &BalanceData::new(10, 25), None, &reserves);
        assert_eq!(view.data, BalanceData::new(10, 25));
        assert_eq!(view.available_balance, 10);
        assert_eq!(view.named_reserves, reserves);
    }

    #[test]
    fn full_result_combines_vesting_and_instances() {
        let mut acct = account(1_000);
        acct.additional.push(BalanceData::new(400, 0));

        let normalized = NormalizedLocks {
            vesting: Some(VestingSchedule {
                total: 100,
                per_block: 10,
                starting_block: 5,
            }),
            locks: vec![
                vec![LockEntry::new(LockId::VESTING, 100)],
                vec![LockEntry::new(STAKING, 150)],
            ],
            reserves: vec![vec![], vec![]],
        };

        let derived = derive_balances(&acct, 8, &normalized).unwrap();
        assert_eq!(derived.account_id, "nova1alice");
        assert_eq!(derived.primary.available_balance, 900);
        assert!(derived.vesting.is_vesting);
        assert_eq!(derived.vesting.vested_balance, 30);
        assert_eq!(derived.vesting.vested_claimable, 30);
        assert_eq!(derived.additional.len(), 1);
        assert_eq!(derived.additional[0].available_balance, 250);
    }

    #[test]
    fn missing_additional_components_default_to_zero() {
        let normalized = NormalizedLocks::empty(3);
        let derived = derive_balances(&account(10), 1, &normalized).unwrap();
        assert_eq!(derived.additional.len(), 2);
        assert!(derived
            .additional
            .iter()
            .all(|view| view.data == BalanceData::default()));
    }

    #[test]
    fn malformed_schedule_fails_derivation() {
        let normalized = NormalizedLocks {
            vesting: Some(VestingSchedule {
                total: 100,
                per_block: 0,
                starting_block: 1,
            }),
            ..NormalizedLocks::empty(1)
        };
        assert!(matches!(
            derive_balances(&account(10), 5, &normalized),
            Err(DeriveError::MalformedSchedule { .. })
        ));
    }

    #[test]
    fn unknown_account_is_zero_valued() {
        let derived = derive_unknown(&AccountBalances::unknown());
        assert_eq!(derived, DerivedBalances::default());
    }
}
