// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process tier implementations.
//!
//! [`InMemorySharedCache`] honors TTLs using `tokio::time::Instant`, so tests
//! can drive expiry with a paused clock. [`StaticMappingStore`] serves a fixed
//! (replaceable) table.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::time::Instant;

use super::traits::{AuthoritativeStore, SharedCache, StorageError};
use crate::tenant::{Mapping, MappingDocument, ShardId, TenantId};

pub struct InMemorySharedCache {
    data: DashMap<String, (ShardId, Instant)>,
    prefix: String,
    gets: AtomicU64,
    sets: AtomicU64,
}

impl InMemorySharedCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Namespace keys the same way the Redis cache does.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            data: DashMap::new(),
            prefix: prefix.to_string(),
            gets: AtomicU64::new(0),
            sets: AtomicU64::new(0),
        }
    }

    fn key(&self, tenant: &TenantId) -> String {
        format!("{}{}", self.prefix, tenant.as_str())
    }

    /// Live (unexpired) value without touching call counters.
    #[must_use]
    pub fn peek(&self, tenant: &TenantId) -> Option<ShardId> {
        self.data
            .get(&self.key(tenant))
            .filter(|entry| entry.value().1 > Instant::now())
            .map(|entry| entry.value().0.clone())
    }

    /// Number of stored keys, expired ones included until they are read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    #[must_use]
    pub fn get_calls(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn set_calls(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }
}

impl Default for InMemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, tenant: &TenantId) -> Result<Option<ShardId>, StorageError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let key = self.key(tenant);
        let now = Instant::now();
        // Expired entries are dropped on read
        let expired = match self.data.get(&key) {
            Some(entry) if entry.value().1 > now => return Ok(Some(entry.value().0.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.data.remove_if(&key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(None)
    }

    async fn set(&self, tenant: &TenantId, shard: &ShardId, ttl: Duration) -> Result<(), StorageError> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| StorageError::Backend(format!("ttl out of range: {ttl:?}")))?;
        self.data.insert(self.key(tenant), (shard.clone(), expires_at));
        Ok(())
    }
}

/// Authoritative store over a table held in memory.
pub struct StaticMappingStore {
    mappings: RwLock<Vec<Mapping>>,
    fetches: AtomicU64,
}

impl StaticMappingStore {
    #[must_use]
    pub fn new(mappings: Vec<Mapping>) -> Self {
        Self {
            mappings: RwLock::new(mappings),
            fetches: AtomicU64::new(0),
        }
    }

    /// Parse a mapping document (same format as the S3 object).
    pub fn from_json(bytes: &[u8]) -> Result<Self, StorageError> {
        let doc = MappingDocument::from_slice(bytes).map_err(|e| StorageError::Parse(e.to_string()))?;
        Ok(Self::new(doc.mappings))
    }

    /// Swap the whole table, as an upstream publisher would.
    pub fn replace(&self, mappings: Vec<Mapping>) {
        *self.mappings.write() = mappings;
    }

    #[must_use]
    pub fn fetch_calls(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthoritativeStore for StaticMappingStore {
    async fn fetch_all(&self) -> Result<Vec<Mapping>, StorageError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.mappings.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(s: &str) -> TenantId {
        TenantId::parse(s).unwrap()
    }

    fn shard(s: &str) -> ShardId {
        ShardId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_is_miss_not_error() {
        let cache = InMemorySharedCache::new();
        assert!(cache.get(&tenant("nobody")).await.unwrap().is_none());
        assert_eq!(cache.get_calls(), 1);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = InMemorySharedCache::new();
        cache.set(&tenant("acme"), &shard("shard-c"), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.get(&tenant("acme")).await.unwrap(), Some(shard("shard-c")));
        assert_eq!(cache.set_calls(), 1);
    }

    #[tokio::test]
    async fn test_prefix_namespaces_keys() {
        let cache = InMemorySharedCache::with_prefix("router:");
        cache.set(&tenant("acme"), &shard("s1"), Duration::from_secs(60)).await.unwrap();
        assert!(cache.data.contains_key("router:acme"));
        assert!(!cache.data.contains_key("acme"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_indistinguishable_from_absent() {
        let cache = InMemorySharedCache::new();
        cache.set(&tenant("acme"), &shard("shard-c"), Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.get(&tenant("acme")).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(&tenant("acme")).await.unwrap().is_none());
        assert!(cache.peek(&tenant("acme")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_is_an_error() {
        let cache = InMemorySharedCache::new();
        let result = cache.set(&tenant("acme"), &shard("shard-c"), Duration::MAX).await;

        assert!(matches!(result, Err(StorageError::Backend(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let cache = InMemorySharedCache::new();
        cache.set(&tenant("t"), &shard("old"), Duration::from_secs(60)).await.unwrap();
        cache.set(&tenant("t"), &shard("new"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.peek(&tenant("t")), Some(shard("new")));
    }

    #[tokio::test]
    async fn test_static_store_refetches_every_call() {
        let store = StaticMappingStore::new(vec![Mapping::new("tenant1", "shard-a")]);
        assert_eq!(store.fetch_all().await.unwrap().len(), 1);

        store.replace(vec![Mapping::new("tenant1", "shard-a"), Mapping::new("acme", "shard-c")]);
        assert_eq!(store.fetch_all().await.unwrap().len(), 2);
        assert_eq!(store.fetch_calls(), 2);
    }

    #[test]
    fn test_static_store_from_json() {
        let store = StaticMappingStore::from_json(
            br#"{"mappings": [{"tenant_id": "a", "shard_id": "1"}]}"#,
        )
        .unwrap();
        assert_eq!(store.mappings.read().len(), 1);
        assert!(matches!(
            StaticMappingStore::from_json(b"{"),
            Err(StorageError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_sets() {
        use std::sync::Arc;

        let cache = Arc::new(InMemorySharedCache::new());
        let mut handles = vec![];
        for batch in 0..10 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let t = tenant(&format!("tenant-{batch}-{i}"));
                    cache.set(&t, &shard("s"), Duration::from_secs(60)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cache.len(), 100);
    }
}
