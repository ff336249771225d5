// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered tenant-to-shard resolver.
//!
//! The [`TieredResolver`] answers "which shard owns this tenant?" by walking
//! three tiers, stopping at the first hit and filling every faster tier it
//! skipped:
//!
//! ```text
//! resolve(tenant)
//!   ├─ LocalCache (LRU)          hit ─────────────────────────────► Found
//!   ├─ SharedCache (Redis, TTL)  hit ─► fill local ───────────────► Found
//!   │                            error/timeout ─► warn, fall through
//!   └─ AuthoritativeStore (S3)   found ─► fill shared + local ────► Found
//!                                absent ────────────────────────► NotMapped
//!                                error ─────────────────────────► Err
//! ```
//!
//! Only an authoritative fetch failure or invalid input fails a call. Shared
//! cache trouble costs latency, never correctness. Concurrent resolves for the
//! same cold tenant may each go to the store; the fills are idempotent.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use shard_router::{
//!     InMemorySharedCache, Mapping, ResolverConfig, ShardOutcome, StaticMappingStore,
//!     TieredResolver,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = ResolverConfig::new("routing", "tenants.json").unwrap();
//! let store = Arc::new(StaticMappingStore::new(vec![Mapping::new("acme", "shard-c")]));
//! let shared = Arc::new(InMemorySharedCache::new());
//! let resolver = TieredResolver::new(config, Some(shared), store).unwrap();
//!
//! let outcome = resolver.resolve_outcome("acme").await;
//! assert_eq!(outcome.shard().map(|s| s.as_str()), Some("shard-c"));
//! assert_eq!(resolver.resolve_outcome("nobody").await, ShardOutcome::NotMapped);
//! # }
//! ```

mod lifecycle;
mod types;

pub use types::{ResolveError, Resolution, ResolverHealth, ResolverStats, ShardOutcome, Tier};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ConfigError, ResolverConfig};
use crate::local_cache::LocalCache;
use crate::metrics::LatencyTimer;
use crate::resilience::circuit_breaker::{CircuitError, TierCircuits};
use crate::storage::traits::with_deadline;
use crate::storage::{AuthoritativeStore, SharedCache, StorageError};
use crate::tenant::{lookup, Mapping, ShardId, TenantId};

#[derive(Default)]
struct Counters {
    local_hits: AtomicU64,
    shared_hits: AtomicU64,
    authoritative_hits: AtomicU64,
    not_mapped: AtomicU64,
    failures: AtomicU64,
    invalid_inputs: AtomicU64,
    shared_errors: AtomicU64,
    shared_write_failures: AtomicU64,
    store_fetches: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Three-tier resolver.
///
/// Owns its [`LocalCache`]; the shared cache and store handles are shared with
/// whoever built them. `Send + Sync`, meant to live behind an `Arc` and be
/// called from many tasks at once.
pub struct TieredResolver {
    config: Arc<ResolverConfig>,
    local: LocalCache,
    /// `None` when no shared tier is configured or it could not be reached at
    /// startup
    shared: Option<Arc<dyn SharedCache>>,
    store: Arc<dyn AuthoritativeStore>,
    circuits: TierCircuits,
    counters: Counters,
}

impl TieredResolver {
    /// Build a resolver over existing tier clients.
    ///
    /// The config is validated again here; an invalid one is rejected before
    /// any tier could be touched.
    pub fn new(
        config: ResolverConfig,
        shared: Option<Arc<dyn SharedCache>>,
        store: Arc<dyn AuthoritativeStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            local: LocalCache::new(config.local_cache_capacity),
            config: Arc::new(config),
            shared,
            store,
            circuits: TierCircuits::default(),
            counters: Counters::default(),
        })
    }

    /// Replace the default per-tier circuit breakers.
    #[must_use]
    pub fn with_circuits(mut self, circuits: TierCircuits) -> Self {
        self.circuits = circuits;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn local_cache(&self) -> &LocalCache {
        &self.local
    }

    #[must_use]
    pub fn has_shared_cache(&self) -> bool {
        self.shared.is_some()
    }

    #[must_use]
    pub fn circuits(&self) -> &TierCircuits {
        &self.circuits
    }

    /// Resolve a raw tenant string. An empty tenant is rejected before any
    /// tier is touched.
    pub async fn resolve(&self, tenant: &str) -> Result<Resolution, ResolveError> {
        let Some(tenant) = TenantId::parse(tenant) else {
            Counters::bump(&self.counters.invalid_inputs);
            crate::metrics::record_resolution("invalid");
            return Err(ResolveError::InvalidInput("tenant id is empty".to_string()));
        };
        self.resolve_tenant(&tenant).await
    }

    /// [`resolve`](Self::resolve) folded into the host-facing three-way answer.
    pub async fn resolve_outcome(&self, tenant: &str) -> ShardOutcome {
        self.resolve(tenant).await.into()
    }

    /// Walk the tiers for an already validated tenant.
    #[tracing::instrument(skip(self, tenant), fields(tenant = %tenant, tier))]
    pub async fn resolve_tenant(&self, tenant: &TenantId) -> Result<Resolution, ResolveError> {
        // 1. Local
        if let Some(shard) = self.lookup_local(tenant) {
            return Ok(self.found(shard, Tier::Local));
        }

        // 2. Shared (degrades on any failure)
        if let Some(shard) = self.lookup_shared(tenant).await {
            self.local.put(tenant.clone(), shard.clone());
            debug!(shard = %shard, "Filled local cache from shared cache");
            return Ok(self.found(shard, Tier::Shared));
        }

        // 3. Authoritative
        let mappings = match self.fetch_table().await {
            Ok(mappings) => mappings,
            Err(e) => {
                tracing::Span::current().record("tier", "failed");
                warn!(error = %e, "Authoritative fetch failed");
                Counters::bump(&self.counters.failures);
                crate::metrics::record_lookup(Tier::Authoritative.as_str(), "error");
                crate::metrics::record_resolution("failed");
                return Err(ResolveError::AuthoritativeFetch(e));
            }
        };

        let Some(shard) = lookup(&mappings, tenant) else {
            tracing::Span::current().record("tier", "not_mapped");
            debug!(table_size = mappings.len(), "Tenant not mapped");
            Counters::bump(&self.counters.not_mapped);
            crate::metrics::record_lookup(Tier::Authoritative.as_str(), "miss");
            crate::metrics::record_resolution("not_mapped");
            return Ok(Resolution::NotMapped);
        };

        self.write_back_shared(tenant, &shard).await;
        self.local.put(tenant.clone(), shard.clone());
        Ok(self.found(shard, Tier::Authoritative))
    }

    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        let c = &self.counters;
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ResolverStats {
            local_hits: load(&c.local_hits),
            shared_hits: load(&c.shared_hits),
            authoritative_hits: load(&c.authoritative_hits),
            not_mapped: load(&c.not_mapped),
            failures: load(&c.failures),
            invalid_inputs: load(&c.invalid_inputs),
            shared_errors: load(&c.shared_errors),
            shared_write_failures: load(&c.shared_write_failures),
            store_fetches: load(&c.store_fetches),
        }
    }

    fn lookup_local(&self, tenant: &TenantId) -> Option<ShardId> {
        let _timer = LatencyTimer::new(Tier::Local.as_str());
        let hit = self.local.get(tenant);
        crate::metrics::record_lookup(Tier::Local.as_str(), if hit.is_some() { "hit" } else { "miss" });
        hit
    }

    /// `None` on miss, error, timeout or open circuit alike.
    async fn lookup_shared(&self, tenant: &TenantId) -> Option<ShardId> {
        let shared = self.shared.as_ref()?;
        let _timer = LatencyTimer::new(Tier::Shared.as_str());
        let timeout = self.config.shared_cache_timeout();

        let result = self
            .circuits
            .shared_cache
            .call(|| with_deadline("shared_cache_get", timeout, shared.get(tenant)))
            .await;

        match result {
            Ok(Some(shard)) => {
                crate::metrics::record_lookup(Tier::Shared.as_str(), "hit");
                Some(shard)
            }
            Ok(None) => {
                debug!("Shared cache miss");
                crate::metrics::record_lookup(Tier::Shared.as_str(), "miss");
                None
            }
            Err(CircuitError::Rejected) => {
                Counters::bump(&self.counters.shared_errors);
                warn!("Shared cache circuit open, skipping tier");
                crate::metrics::record_lookup(Tier::Shared.as_str(), "rejected");
                None
            }
            Err(CircuitError::Inner(e)) => {
                Counters::bump(&self.counters.shared_errors);
                warn!(error = %e, "Shared cache lookup failed, falling through");
                let outcome = if e.is_timeout() { "timeout" } else { "error" };
                crate::metrics::record_lookup(Tier::Shared.as_str(), outcome);
                None
            }
        }
    }

    async fn fetch_table(&self) -> Result<Vec<Mapping>, StorageError> {
        let _timer = LatencyTimer::new(Tier::Authoritative.as_str());
        Counters::bump(&self.counters.store_fetches);
        let timeout = self.config.store_timeout();

        let mappings = self
            .circuits
            .store
            .call(|| with_deadline("store_fetch", timeout, self.store.fetch_all()))
            .await
            .map_err(|e| match e {
                CircuitError::Rejected => StorageError::CircuitOpen(TierCircuits::STORE),
                CircuitError::Inner(e) => e,
            })?;

        crate::metrics::set_mapping_table_entries(mappings.len());
        Ok(mappings)
    }

    /// Best-effort: a failed write is logged and counted, never returned.
    async fn write_back_shared(&self, tenant: &TenantId, shard: &ShardId) {
        let Some(shared) = self.shared.as_ref() else {
            return;
        };
        let timeout = self.config.shared_cache_timeout();
        let ttl = self.config.shared_cache_ttl();

        let result = self
            .circuits
            .shared_cache
            .call(|| with_deadline("shared_cache_set", timeout, shared.set(tenant, shard, ttl)))
            .await;

        match result {
            Ok(()) => {
                debug!(shard = %shard, ttl_secs = ttl.as_secs(), "Wrote back to shared cache");
                crate::metrics::record_writeback(Tier::Shared.as_str(), true);
            }
            Err(e) => {
                Counters::bump(&self.counters.shared_write_failures);
                warn!(error = %e, "Shared cache write-back failed");
                crate::metrics::record_writeback(Tier::Shared.as_str(), false);
            }
        }
    }

    fn found(&self, shard: ShardId, tier: Tier) -> Resolution {
        tracing::Span::current().record("tier", tier.as_str());
        let counter = match tier {
            Tier::Local => &self.counters.local_hits,
            Tier::Shared => &self.counters.shared_hits,
            Tier::Authoritative => {
                crate::metrics::record_lookup(tier.as_str(), "hit");
                &self.counters.authoritative_hits
            }
        };
        Counters::bump(counter);
        crate::metrics::record_resolution("found");
        debug!(shard = %shard, tier = %tier, "Resolved");
        Resolution::Found { shard, tier }
    }
}
