// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process LRU cache (L1).
//!
//! Bounded by entry count, no expiry. A hit refreshes recency; inserting a new
//! key at capacity evicts the least-recently-used entry. Values are
//! [`ShardId`]s, so an empty shard cannot be stored.
//!
//! A hit moves the entry to the front of the recency list, which is a mutation,
//! so reads and writes share one `parking_lot::Mutex`. The critical section is
//! a hash lookup plus a pointer swap and never spans I/O.
//!
//! # Example
//!
//! ```
//! use shard_router::{LocalCache, ShardId, TenantId};
//!
//! let cache = LocalCache::new(2);
//! let t = |s: &str| TenantId::parse(s).unwrap();
//! let s = |s: &str| ShardId::parse(s).unwrap();
//!
//! cache.put(t("a"), s("1"));
//! cache.put(t("b"), s("2"));
//! cache.get(&t("a"));           // "a" is now most recent
//! cache.put(t("c"), s("3"));    // evicts "b"
//!
//! assert!(cache.contains(&t("a")));
//! assert!(!cache.contains(&t("b")));
//! ```

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::tenant::{ShardId, TenantId};

/// Counters for the local tier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl LocalCacheStats {
    /// Hit rate in 0.0..=1.0.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct LocalCache {
    entries: Mutex<LruCache<TenantId, ShardId>>,
    capacity: NonZeroUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl LocalCache {
    /// A zero capacity is raised to one; [`ResolverConfig`](crate::ResolverConfig)
    /// rejects zero before it gets here.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a tenant, refreshing its recency on a hit.
    pub fn get(&self, tenant: &TenantId) -> Option<ShardId> {
        let found = self.entries.lock().get(tenant).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Insert or overwrite. Returns the evicted tenant when capacity forced one
    /// out.
    pub fn put(&self, tenant: TenantId, shard: ShardId) -> Option<TenantId> {
        let (pushed, len) = {
            let mut entries = self.entries.lock();
            let replaced_key = tenant.clone();
            let pushed = entries
                .push(tenant, shard)
                .filter(|(old_key, _)| *old_key != replaced_key);
            (pushed, entries.len())
        };
        self.inserts.fetch_add(1, Ordering::Relaxed);
        crate::metrics::set_local_cache_items(len);

        let (evicted, _) = pushed?;
        self.evictions.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_local_eviction();
        Some(evicted)
    }

    /// Presence check that does not touch recency or counters.
    #[must_use]
    pub fn contains(&self, tenant: &TenantId) -> bool {
        self.entries.lock().contains(tenant)
    }

    /// Value without refreshing recency or counting a hit.
    #[must_use]
    pub fn peek(&self, tenant: &TenantId) -> Option<ShardId> {
        self.entries.lock().peek(tenant).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        crate::metrics::set_local_cache_items(0);
    }

    #[must_use]
    pub fn stats(&self) -> LocalCacheStats {
        LocalCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
            capacity: self.capacity(),
        }
    }
}
