//! Fan-in over the three live inputs of one address.
//!
//! [`BalanceFeed`] keeps the latest value of each upstream feed (account,
//! best block, normalized locks) in a [`Slot`] and emits one recomputed
//! result per upstream update. Slots are polled round-robin starting after
//! the one that last produced, so a chatty feed cannot starve the others.
//!
//! The locks slot follows the account: it is subscribed once the account
//! has an id, re-subscribed if the id changes, and dropped for unknown
//! accounts. Dropping the feed drops every upstream with it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tracing::{debug, trace};

use crate::error::{DeriveError, DeriveResult};
use crate::query::{NormalizedLocks, QueryAdapter};
use crate::source::{ChainSource, Feed};
use crate::types::{AccountBalances, AccountId, BlockNumber, DerivedBalances};
use crate::view::{derive_balances, derive_unknown};

const SLOTS: usize = 3;

enum Polled {
    Updated,
    Failed(DeriveError),
    Quiet,
}

/// Latest value of one upstream feed.
struct Slot<T> {
    feed: Option<Feed<T>>,
    latest: Option<T>,
    /// The feed ended on its own (as opposed to never being subscribed).
    exhausted: bool,
}

impl<T> Slot<T> {
    fn new(feed: Feed<T>) -> Self {
        Self {
            feed: Some(feed),
            latest: None,
            exhausted: false,
        }
    }

    fn idle() -> Self {
        Self {
            feed: None,
            latest: None,
            exhausted: false,
        }
    }

    /// Swaps the upstream, forgetting the old latest value.
    fn replace(&mut self, feed: Option<Feed<T>>) {
        self.feed = feed;
        self.latest = None;
        self.exhausted = false;
    }

    /// Ended without ever producing a value.
    fn starved(&self) -> bool {
        self.exhausted && self.latest.is_none()
    }

    fn poll_slot(&mut self, cx: &mut Context<'_>) -> Polled {
        let Some(feed) = self.feed.as_mut() else {
            return Polled::Quiet;
        };
        match feed.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(value))) => {
                self.latest = Some(value);
                Polled::Updated
            }
            Poll::Ready(Some(Err(err))) => Polled::Failed(err),
            Poll::Ready(None) => {
                self.feed = None;
                self.exhausted = true;
                Polled::Quiet
            }
            Poll::Pending => Polled::Quiet,
        }
    }
}

/// Live derived balances for one address.
pub(crate) struct BalanceFeed {
    source: Arc<dyn ChainSource>,
    adapter: Arc<QueryAdapter>,
    address: String,
    account: Slot<AccountBalances>,
    best: Slot<BlockNumber>,
    locks: Slot<NormalizedLocks>,
    locks_for: Option<AccountId>,
    cursor: usize,
    terminated: bool,
}

impl BalanceFeed {
    pub(crate) fn new(source: Arc<dyn ChainSource>, adapter: Arc<QueryAdapter>, address: &str) -> Self {
        let account = Slot::new(source.account_balances(address));
        let best = Slot::new(source.best_number());
        Self {
            source,
            adapter,
            address: address.to_string(),
            account,
            best,
            locks: Slot::idle(),
            locks_for: None,
            cursor: 0,
            terminated: false,
        }
    }

    /// Points the locks slot at the account's current id.
    fn follow_account(&mut self) {
        let account_id = self
            .account
            .latest
            .as_ref()
            .filter(|account| account.is_known())
            .map(|account| account.account_id.clone());
        if account_id == self.locks_for {
            return;
        }

        match &account_id {
            Some(id) => {
                debug!(address = %self.address, account = %id, "subscribing to locks and vesting");
                let feed = self.adapter.query(self.source.as_ref(), id);
                self.locks.replace(Some(feed));
            }
            None => {
                debug!(address = %self.address, "no on-chain account, skipping lock queries");
                self.locks.replace(None);
            }
        }
        self.locks_for = account_id;
    }

    /// `None` until every input the current account needs has arrived.
    fn recompute(&self) -> Option<DeriveResult<DerivedBalances>> {
        let account = self.account.latest.as_ref()?;
        if !account.is_known() {
            return Some(Ok(derive_unknown(account)));
        }
        let best = self.best.latest?;
        let locks = self.locks.latest.as_ref()?;

        trace!(address = %self.address, best, "recomputing derived balances");
        Some(derive_balances(account, best, locks))
    }

    fn is_finished(&self) -> bool {
        let all_ended =
            self.account.feed.is_none() && self.best.feed.is_none() && self.locks.feed.is_none();
        let needs_chain_data = self
            .account
            .latest
            .as_ref()
            .is_some_and(AccountBalances::is_known);

        all_ended
            || self.account.starved()
            || (needs_chain_data && (self.best.starved() || self.locks.starved()))
    }

    fn terminate(&mut self) {
        self.terminated = true;
        self.account.replace(None);
        self.best.replace(None);
        self.locks.replace(None);
    }
}

impl Stream for BalanceFeed {
    type Item = DeriveResult<DerivedBalances>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.terminated {
            return Poll::Ready(None);
        }

        loop {
            let mut progressed = false;
            // Each pass visits every slot once, whatever it does to the cursor.
            let start = this.cursor;

            for step in 0..SLOTS {
                let index = (start + step) % SLOTS;
                let polled = match index {
                    0 => this.account.poll_slot(cx),
                    1 => this.best.poll_slot(cx),
                    _ => this.locks.poll_slot(cx),
                };

                match polled {
                    Polled::Quiet => {}
                    Polled::Failed(err) => {
                        this.terminate();
                        return Poll::Ready(Some(Err(err)));
                    }
                    Polled::Updated => {
                        progressed = true;
                        this.cursor = (index + 1) % SLOTS;
                        if index == 0 {
                            this.follow_account();
                        }
                        if let Some(result) = this.recompute() {
                            if result.is_err() {
                                this.terminate();
                            }
                            return Poll::Ready(Some(result));
                        }
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        if this.is_finished() {
            this.terminate();
            return Poll::Ready(None);
        }
        Poll::Pending
    }
}
