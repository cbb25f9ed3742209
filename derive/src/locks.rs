//! # Lock Resolution
//!
//! Locks on the same account overlap rather than stack: a 100-unit staking
//! lock and a 60-unit vesting lock together hold 100, not 160. The runtime
//! merges them by taking the largest amount, and so do we. One amount is
//! special: a lock of `Balance::MAX` freezes the whole free balance,
//! whatever that balance is.

use crate::types::{Balance, BlockNumber, LockEntry};

/// Outcome of resolving an account's locks at a given height.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LockResolution {
    /// Some active lock carries the fully-frozen sentinel.
    pub all_locked: bool,
    /// Largest active non-sentinel lock, or zero.
    pub locked_balance: Balance,
    /// Locks still in force, in their original order.
    pub locked_breakdown: Vec<LockEntry>,
    /// Sum of active vesting-tagged locks.
    pub vesting_locked: Balance,
}

/// Resolves `locks` against the chain height `best`.
///
/// `None` is treated exactly like an empty list.
pub fn resolve_locks(best: BlockNumber, locks: Option<&[LockEntry]>) -> LockResolution {
    let Some(locks) = locks else {
        return LockResolution::default();
    };

    let locked_breakdown: Vec<LockEntry> = locks
        .iter()
        .filter(|lock| lock.is_active_at(best))
        .cloned()
        .collect();

    let all_locked = locked_breakdown.iter().any(LockEntry::is_fully_frozen);

    let vesting_locked = locked_breakdown
        .iter()
        .filter(|lock| lock.id.is_vesting())
        .fold(0, |sum: Balance, lock| sum.saturating_add(lock.amount));

    let locked_balance = locked_breakdown
        .iter()
        .filter(|lock| !lock.is_fully_frozen())
        .map(|lock| lock.amount)
        .max()
        .unwrap_or(0);

    LockResolution {
        all_locked,
        locked_balance,
        locked_breakdown,
        vesting_locked,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LockId;

    const STAKING: [u8; 8] = *b"staking ";
    const DEMOCRACY: [u8; 8] = *b"democrac";

    #[test]
    fn no_locks_resolves_to_zero() {
        assert_eq!(resolve_locks(10, None), LockResolution::default());
        assert_eq!(resolve_locks(10, Some(&[])), LockResolution::default());
    }

    #[test]
    fn expired_locks_are_dropped() {
        let locks = vec![
            LockEntry::new(STAKING, 100).until(10),
            LockEntry::new(DEMOCRACY, 50).until(11),
            LockEntry::new(LockId::VESTING, 70),
        ];

        let resolved = resolve_locks(10, Some(&locks));

        // until == best is expired; until > best and no until are active.
        assert_eq!(resolved.locked_breakdown.len(), 2);
        assert_eq!(resolved.locked_breakdown[0].id, LockId(DEMOCRACY));
        assert_eq!(resolved.locked_breakdown[1].id, LockId::VESTING);
    }

    #[test]
    fn locked_balance_is_max_not_sum() {
        let locks = vec![
            LockEntry::new(STAKING, 100),
            LockEntry::new(DEMOCRACY, 60),
            LockEntry::new(LockId::VESTING, 80),
        ];

        let resolved = resolve_locks(1, Some(&locks));
        assert_eq!(resolved.locked_balance, 100);
        assert!(!resolved.all_locked);
    }

    #[test]
    fn sentinel_sets_all_locked_and_is_excluded_from_max() {
        let locks = vec![
            LockEntry::new(STAKING, Balance::MAX),
            LockEntry::new(DEMOCRACY, 40),
        ];

        let resolved = resolve_locks(1, Some(&locks));
        assert!(resolved.all_locked);
        assert_eq!(resolved.locked_balance, 40);
    }

    #[test]
    fn only_sentinel_leaves_locked_balance_zero() {
        let locks = vec![LockEntry::new(STAKING, Balance::MAX)];
        let resolved = resolve_locks(1, Some(&locks));
        assert!(resolved.all_locked);
        assert_eq!(resolved.locked_balance, 0);
    }

    #[test]
    fn expired_sentinel_does_not_freeze() {
        let locks = vec![LockEntry::new(STAKING, Balance::MAX).until(5)];
        let resolved = resolve_locks(5, Some(&locks));
        assert!(!resolved.all_locked);
        assert!(resolved.locked_breakdown.is_empty());
    }

    #[test]
    fn vesting_locked_sums_vesting_tags() {
        let locks = vec![
            LockEntry::new(LockId::VESTING, 30),
            LockEntry::new(LockId::VESTING, 20),
            LockEntry::new(LockId::VESTING, 999).until(3),
            LockEntry::new(STAKING, 500),
        ];

        let resolved = resolve_locks(3, Some(&locks));
        assert_eq!(resolved.vesting_locked, 50);
        assert_eq!(resolved.locked_balance, 500);
    }
}
