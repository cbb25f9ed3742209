//! Integration tests for the live derivation pipeline.
//!
//! Every test drives a [`MemoryChain`] through [`BalanceDeriver`] exactly as
//! a node would: set up chain state, subscribe, mutate the chain, and watch
//! the derived feed follow along.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use nova_derive::types::LegacyVestingSchedule;
use nova_derive::{
    AccountBalances, BalanceData, BalanceDeriver, DeriveError, DerivedBalances, Feed, LockEntry,
    LockId, MemoryChain, ReserveEntry, StorageQuery, VestingSchedule,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const ALICE: &str = "nova1alice";
const BOB: &str = "nova1bob";

fn deriver_for(chain: &Arc<MemoryChain>) -> BalanceDeriver {
    BalanceDeriver::new(chain.clone(), chain.as_ref())
}

/// Alice at height 8: 1000 free, 50 reserved, a 100 vesting lock and a 300
/// staking lock, vesting 100 over 10 blocks from block 5.
fn seeded_chain() -> Arc<MemoryChain> {
    let chain = Arc::new(MemoryChain::current(&["balances"]));
    chain.set_best_number(8);
    chain.set_account(ALICE, AccountBalances::new(ALICE, BalanceData::new(1_000, 50)));
    chain.set_locks(
        "balances",
        ALICE,
        vec![
            LockEntry::new(LockId::VESTING, 100),
            LockEntry::new(*b"staking ", 300),
        ],
    );
    chain.set_vesting(
        ALICE,
        Some(VestingSchedule {
            total: 100,
            per_block: 10,
            starting_block: 5,
        }),
    );
    chain
}

async fn next_ok(feed: &mut Feed<DerivedBalances>) -> DerivedBalances {
    tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .expect("feed stalled")
        .expect("feed ended")
        .expect("derivation failed")
}

/// Lets aborted driver tasks unwind.
async fn settle(chain: &MemoryChain) {
    for _ in 0..100 {
        if chain.live_storage_feeds() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Derivation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_full_derivation() {
    let chain = seeded_chain();
    let deriver = deriver_for(&chain);
    let mut feed = deriver.derive_all_balances(ALICE);

    let derived = next_ok(&mut feed).await;
    assert_eq!(derived.account_id, ALICE);
    assert_eq!(derived.primary.data.free_balance, 1_000);
    assert_eq!(derived.primary.data.reserved_balance, 50);
    assert_eq!(derived.primary.locked_balance, 300);
    assert_eq!(derived.primary.available_balance, 700);
    assert_eq!(derived.primary.vesting_locked, 100);
    assert_eq!(derived.primary.locked_breakdown.len(), 2);

    assert!(derived.vesting.is_vesting);
    assert_eq!(derived.vesting.vested_balance, 30);
    assert_eq!(derived.vesting.vested_claimable, 30);
    assert_eq!(derived.vesting.vesting_end_block, 15);
    assert_eq!(derived.vesting.vesting_total, 100);
    assert!(derived.additional.is_empty());
}

#[tokio::test]
async fn test_recompute_on_new_block() {
    let chain = seeded_chain();
    let deriver = deriver_for(&chain);
    let mut feed = deriver.derive_all_balances(ALICE);
    assert_eq!(next_ok(&mut feed).await.vesting.vested_balance, 30);

    chain.set_best_number(15);
    let derived = next_ok(&mut feed).await;
    assert_eq!(derived.vesting.vested_balance, 100);
    assert_eq!(derived.vesting.vested_claimable, 100);
}

#[tokio::test]
async fn test_named_reserves_reported_per_instance() {
    let chain = seeded_chain();
    let reserve = ReserveEntry {
        id: "fees".parse().unwrap(),
        amount: 50,
    };
    chain.set_reserves("balances", ALICE, vec![reserve.clone()]);

    let deriver = deriver_for(&chain);
    let mut feed = deriver.derive_all_balances(ALICE);
    assert_eq!(next_ok(&mut feed).await.primary.named_reserves, vec![reserve]);
}

#[tokio::test]
async fn test_unknown_address_yields_zero_result() {
    let chain = seeded_chain();
    let deriver = deriver_for(&chain);
    let mut feed = deriver.derive_all_balances("nova1nobody");

    assert_eq!(next_ok(&mut feed).await, DerivedBalances::default());
    assert_eq!(chain.storage_queries(), 0);
}

#[tokio::test]
async fn test_legacy_runtime() {
    let chain = Arc::new(MemoryChain::legacy());
    chain.set_best_number(8);
    chain.set_account(ALICE, AccountBalances::new(ALICE, BalanceData::new(500, 0)));
    chain.set_locks(
        "balances",
        ALICE,
        vec![
            LockEntry::new(LockId::VESTING, 100).until(50),
            LockEntry::new(*b"democrac", 400).until(6),
        ],
    );
    chain.set_legacy_vesting(
        ALICE,
        Some(LegacyVestingSchedule {
            offset: 100,
            per_block: 10,
            starting_block: 5,
        }),
    );

    let deriver = deriver_for(&chain);
    assert_eq!(deriver.adapter().shape(), "legacy");
    let mut feed = deriver.derive_all_balances(ALICE);

    let derived = next_ok(&mut feed).await;
    // The democracy lock expired at block 6.
    assert_eq!(derived.primary.locked_breakdown.len(), 1);
    assert_eq!(derived.primary.locked_balance, 100);
    assert_eq!(derived.primary.available_balance, 400);
    assert_eq!(derived.vesting.vested_balance, 30);
    assert_eq!(derived.vesting.vesting_end_block, 15);
    assert_eq!(chain.batch_queries(), 1);
}

#[tokio::test]
async fn test_only_second_of_three_instances_has_locks() {
    let chain = Arc::new(
        MemoryChain::current(&["balances", "poolBalances", "assetBalances"])
            .without_query(StorageQuery::new("balances", "locks"))
            .without_query(StorageQuery::new("assetBalances", "locks")),
    );
    let mut account = AccountBalances::new(ALICE, BalanceData::new(100, 0));
    account.additional = vec![BalanceData::new(200, 0), BalanceData::new(300, 0)];
    chain.set_account(ALICE, account);
    chain.set_locks("poolBalances", ALICE, vec![LockEntry::new(*b"pool    ", 75)]);

    let deriver = deriver_for(&chain);
    assert_eq!(deriver.adapter().instance_count(), 3);
    let mut feed = deriver.derive_all_balances(ALICE);

    let derived = next_ok(&mut feed).await;
    assert_eq!(derived.primary.available_balance, 100);
    assert_eq!(derived.additional.len(), 2);
    assert_eq!(derived.additional[0].locked_balance, 75);
    assert_eq!(derived.additional[0].available_balance, 125);
    assert_eq!(derived.additional[1].locked_balance, 0);
    assert_eq!(derived.additional[1].available_balance, 300);
}

#[tokio::test]
async fn test_fully_frozen_account_has_nothing_available() {
    let chain = seeded_chain();
    chain.set_locks(
        "balances",
        ALICE,
        vec![LockEntry::new(*b"frozen  ", u128::MAX)],
    );

    let deriver = deriver_for(&chain);
    let mut feed = deriver.derive_all_balances(ALICE);
    let derived = next_ok(&mut feed).await;
    assert_eq!(derived.primary.available_balance, 0);
    assert_eq!(derived.primary.locked_balance, 0);
}

// ---------------------------------------------------------------------------
// Failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_malformed_schedule_fails_only_that_address() {
    let chain = seeded_chain();
    chain.set_account(BOB, AccountBalances::new(BOB, BalanceData::new(10, 0)));
    chain.set_vesting(
        BOB,
        Some(VestingSchedule {
            total: 10,
            per_block: 0,
            starting_block: 1,
        }),
    );

    let deriver = deriver_for(&chain);
    let mut bob = deriver.derive_all_balances(BOB);
    let mut alice = deriver.derive_all_balances(ALICE);

    assert_eq!(
        bob.next().await,
        Some(Err(DeriveError::MalformedSchedule { starting_block: 1 }))
    );
    assert!(bob.next().await.is_none());
    assert_eq!(next_ok(&mut alice).await.primary.available_balance, 700);
}

#[tokio::test]
async fn test_failed_derivation_restarts_for_new_subscribers() {
    let chain = seeded_chain();
    chain.set_account(BOB, AccountBalances::new(BOB, BalanceData::new(10, 0)));
    chain.set_vesting(
        BOB,
        Some(VestingSchedule {
            total: 10,
            per_block: 0,
            starting_block: 1,
        }),
    );

    let deriver = deriver_for(&chain);
    // Kept alive so the failed derivation stays in the cache.
    let mut failed = deriver.derive_all_balances(BOB);
    assert!(matches!(
        failed.next().await,
        Some(Err(DeriveError::MalformedSchedule { .. }))
    ));

    chain.set_vesting(
        BOB,
        Some(VestingSchedule {
            total: 10,
            per_block: 1,
            starting_block: 1,
        }),
    );
    let mut retry = deriver.derive_all_balances(BOB);
    let derived = next_ok(&mut retry).await;
    assert_eq!(derived.account_id, BOB);
    assert_eq!(chain.account_subscriptions(), 2);

    // Releasing the failed feed leaves the replacement cached.
    drop(failed);
    assert_eq!(deriver.cache().len(), 1);
    let mut joined = deriver.derive_all_balances(BOB);
    assert_eq!(next_ok(&mut joined).await, derived);
    assert_eq!(chain.account_subscriptions(), 2);
}

// ---------------------------------------------------------------------------
// Sharing & Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_concurrent_subscribers_share_one_derivation() {
    let chain = seeded_chain();
    let deriver = deriver_for(&chain);

    let mut first = deriver.derive_all_balances(ALICE);
    let mut second = deriver.derive_all_balances(ALICE);
    assert_eq!(next_ok(&mut first).await, next_ok(&mut second).await);
    assert_eq!(chain.account_subscriptions(), 1);
    assert_eq!(chain.storage_queries(), 1);
    assert_eq!(deriver.cache().len(), 1);
}

#[tokio::test]
async fn test_late_subscriber_receives_latest_value() {
    let chain = seeded_chain();
    let deriver = deriver_for(&chain);

    let mut first = deriver.derive_all_balances(ALICE);
    chain.set_best_number(15);
    let mut latest = next_ok(&mut first).await;
    while latest.vesting.vested_balance != 100 {
        latest = next_ok(&mut first).await;
    }

    let mut late = deriver.derive_all_balances(ALICE);
    assert_eq!(next_ok(&mut late).await, latest);
}

#[tokio::test]
async fn test_dropping_every_subscriber_releases_upstream() {
    let chain = seeded_chain();
    let deriver = deriver_for(&chain);

    let mut first = deriver.derive_all_balances(ALICE);
    let second = deriver.derive_all_balances(ALICE);
    next_ok(&mut first).await;
    assert_eq!(chain.live_storage_feeds(), 1);

    drop(first);
    assert_eq!(deriver.cache().len(), 1);
    drop(second);
    assert!(deriver.cache().is_empty());

    settle(&chain).await;
    assert_eq!(chain.live_storage_feeds(), 0);

    // A fresh subscription starts over.
    let mut again = deriver.derive_all_balances(ALICE);
    next_ok(&mut again).await;
    assert_eq!(chain.account_subscriptions(), 2);
}

#[tokio::test]
async fn test_separate_derivers_do_not_share() {
    let chain = seeded_chain();
    let a = deriver_for(&chain);
    let b = deriver_for(&chain);

    let mut from_a = a.derive_all_balances(ALICE);
    let mut from_b = b.derive_all_balances(ALICE);
    next_ok(&mut from_a).await;
    next_ok(&mut from_b).await;
    assert_eq!(chain.account_subscriptions(), 2);
}
