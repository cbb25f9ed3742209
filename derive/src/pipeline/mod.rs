//! # Balance Derivation Pipeline
//!
//! ```text
//!  account_balances(addr) ─┐
//!  best_number()          ─┼─> BalanceFeed ──> DerivationCache ──> subscribers
//!  adapter.query(acct)    ─┘    (recompute)     (one per scope+addr)
//! ```
//!
//! [`BalanceDeriver::derive_all_balances`] is the entry point. It resolves
//! the lock query plan once at construction and shares each running
//! derivation between concurrent subscribers of the same scope.

mod combine;
pub mod memo;

use std::sync::Arc;

use tracing::info;

use crate::query::QueryAdapter;
use crate::source::{ChainSource, Feed, RuntimeRegistry};
use crate::types::DerivedBalances;

use combine::BalanceFeed;

pub use memo::{DerivationCache, DerivationKey, ScopeId};

/// Derives live balances for any address against one chain.
pub struct BalanceDeriver {
    scope: ScopeId,
    source: Arc<dyn ChainSource>,
    adapter: Arc<QueryAdapter>,
    cache: Arc<DerivationCache>,
}

impl BalanceDeriver {
    /// A deriver with its own scope and cache.
    pub fn new(source: Arc<dyn ChainSource>, registry: &dyn RuntimeRegistry) -> Self {
        Self::with_cache(source, registry, DerivationCache::new())
    }

    /// A deriver with a fresh scope sharing an existing cache. Derivers with
    /// different scopes never share running derivations, even through the
    /// same cache.
    pub fn with_cache(
        source: Arc<dyn ChainSource>,
        registry: &dyn RuntimeRegistry,
        cache: Arc<DerivationCache>,
    ) -> Self {
        let adapter = Arc::new(QueryAdapter::resolve(registry));
        let scope = ScopeId::new();
        info!(
            %scope,
            spec = %registry.spec_name(),
            shape = adapter.shape(),
            instances = adapter.instance_count(),
            "balance deriver ready"
        );
        Self {
            scope,
            source,
            adapter,
            cache,
        }
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn adapter(&self) -> &QueryAdapter {
        &self.adapter
    }

    pub fn cache(&self) -> &Arc<DerivationCache> {
        &self.cache
    }

    /// Live derived balances for `address`.
    ///
    /// Emits once every input has arrived and again after every upstream
    /// change. An address with no on-chain account yields the zero result
    /// without querying locks or vesting. Errors end the feed.
    pub fn derive_all_balances(&self, address: &str) -> Feed<DerivedBalances> {
        let key = DerivationKey::new(self.scope, address);
        let source = Arc::clone(&self.source);
        let adapter = Arc::clone(&self.adapter);
        let address = address.to_string();
        self.cache.subscribe(key, move || {
            let feed: Feed<DerivedBalances> = Box::pin(BalanceFeed::new(source, adapter, &address));
            feed
        })
    }
}
