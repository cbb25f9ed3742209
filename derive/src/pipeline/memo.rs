//! Per-key sharing of in-flight derivations.
//!
//! Identical concurrent requests (same caller scope, same address) attach
//! to one running derivation instead of each subscribing to the chain. The
//! map holds only weak references; the last subscriber to go away stops the
//! driver task, which drops every upstream feed, and evicts the entry.
//! Only live derivations are joined; a key whose derivation failed or ended
//! is treated as vacant.

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::DeriveResult;
use crate::source::Feed;
use crate::types::DerivedBalances;

/// Identifies one caller of the derivation API. Requests are only shared
/// within a scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(Uuid);

impl ScopeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Deduplication key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DerivationKey {
    pub scope: ScopeId,
    pub address: String,
}

impl DerivationKey {
    pub fn new(scope: ScopeId, address: &str) -> Self {
        Self {
            scope,
            address: address.to_string(),
        }
    }
}

type Latest = Option<DeriveResult<DerivedBalances>>;

/// One running derivation and the latest value it produced.
struct SharedDerivation {
    key: DerivationKey,
    cache: Weak<DerivationCache>,
    latest: watch::Receiver<Latest>,
    driver: JoinHandle<()>,
}

impl SharedDerivation {
    /// The driver ended or published a failure. Nothing new will arrive.
    fn is_finished(&self) -> bool {
        self.driver.is_finished()
            || self.latest.has_changed().is_err()
            || matches!(&*self.latest.borrow(), Some(Err(_)))
    }
}

impl Drop for SharedDerivation {
    fn drop(&mut self) {
        self.driver.abort();
        if let Some(cache) = self.cache.upgrade() {
            // A newer derivation may already occupy the key; leave it alone.
            cache
                .entries
                .remove_if(&self.key, |_, entry| entry.strong_count() == 0);
        }
        debug!(address = %self.key.address, scope = %self.key.scope, "derivation released");
    }
}

/// Keyed weak-reference cache of running derivations.
#[derive(Default)]
pub struct DerivationCache {
    entries: DashMap<DerivationKey, Weak<SharedDerivation>>,
}

impl DerivationCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of keys with at least one live subscriber.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to the derivation for `key`, starting it with `start` if
    /// none is running.
    ///
    /// New subscribers first receive the latest value already produced, then
    /// every later one. A failure is delivered to every subscriber and ends
    /// their feeds. A derivation that failed or ended is never joined: the
    /// next subscriber starts a fresh one, while earlier subscribers keep
    /// the old one until they drop it. Must be called from within a tokio
    /// runtime.
    pub fn subscribe<F>(self: &Arc<Self>, key: DerivationKey, start: F) -> Feed<DerivedBalances>
    where
        F: FnOnce() -> Feed<DerivedBalances>,
    {
        let shared = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(shared) if !shared.is_finished() => {
                    trace!(address = %key.address, "joining running derivation");
                    shared
                }
                _ => {
                    let shared = self.spawn(key, start);
                    entry.insert(Arc::downgrade(&shared));
                    shared
                }
            },
            Entry::Vacant(entry) => {
                let shared = self.spawn(key, start);
                entry.insert(Arc::downgrade(&shared));
                shared
            }
        };
        subscription(shared)
    }

    fn spawn<F>(self: &Arc<Self>, key: DerivationKey, start: F) -> Arc<SharedDerivation>
    where
        F: FnOnce() -> Feed<DerivedBalances>,
    {
        debug!(address = %key.address, scope = %key.scope, "starting derivation");

        let (tx, rx) = watch::channel(None);
        let mut feed = start();
        let address = key.address.clone();
        let driver = tokio::spawn(async move {
            while let Some(item) = feed.next().await {
                let failed = match &item {
                    Ok(_) => false,
                    Err(err) => {
                        warn!(address = %address, error = %err, "balance derivation failed");
                        true
                    }
                };
                tx.send_replace(Some(item));
                if failed {
                    break;
                }
            }
        });

        Arc::new(SharedDerivation {
            key,
            cache: Arc::downgrade(self),
            latest: rx,
            driver,
        })
    }
}

struct Subscriber {
    _shared: Arc<SharedDerivation>,
    rx: watch::Receiver<Latest>,
    replay: bool,
    done: bool,
}

fn subscription(shared: Arc<SharedDerivation>) -> Feed<DerivedBalances> {
    let subscriber = Subscriber {
        rx: shared.latest.clone(),
        _shared: shared,
        replay: true,
        done: false,
    };

    Box::pin(stream::unfold(subscriber, |mut sub| async move {
        if sub.done {
            return None;
        }

        if std::mem::take(&mut sub.replay) {
            let current = sub.rx.borrow_and_update().clone();
            if let Some(item) = current {
                sub.done = item.is_err();
                return Some((item, sub));
            }
        }

        loop {
            if sub.rx.changed().await.is_err() {
                return None;
            }
            let current = sub.rx.borrow_and_update().clone();
            if let Some(item) = current {
                sub.done = item.is_err();
                return Some((item, sub));
            }
        }
    }))
}
