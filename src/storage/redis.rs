// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis shared cache (L2).
//!
//! Plain string values under a namespaced key:
//!
//! ```text
//! GET <prefix><tenant>
//! SET <prefix><tenant> <shard> EX <ttl-seconds>
//! ```
//!
//! Every command runs under the configured deadline. A timed-out or failed
//! command is reported as an error so the resolver can degrade to the next tier.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::traits::{with_deadline, SharedCache, StorageError};
use crate::resilience::retry::{retry, RetryConfig};
use crate::tenant::{ShardId, TenantId};

/// Shared cache over a Redis [`ConnectionManager`].
///
/// The connection is established on first use when it is not supplied up
/// front. A failed attempt leaves the cache disconnected and the next command
/// tries again, so a Redis that comes up after startup is picked up without a
/// restart. Once connected, the manager handles reconnects itself.
pub struct RedisSharedCache {
    client: Option<Client>,
    connection: OnceCell<ConnectionManager>,
    /// Key namespace (e.g., "shard_router:" -> "shard_router:acme")
    prefix: String,
    timeout: Duration,
}

impl RedisSharedCache {
    /// Build a cache that connects on its first command. No I/O happens here;
    /// only the URL is checked.
    pub fn new(url: &str, prefix: &str, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::open(url).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self {
            client: Some(client),
            connection: OnceCell::new(),
            prefix: prefix.to_string(),
            timeout,
        })
    }

    /// Connect with the startup retry policy. Each attempt is bounded by
    /// `timeout`, so an unreachable host fails in bounded time.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use shard_router::storage::RedisSharedCache;
    /// # use std::time::Duration;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let cache = RedisSharedCache::connect(
    ///     "redis://localhost:6379/0",
    ///     "shard_router:",
    ///     Duration::from_secs(2),
    /// ).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str, prefix: &str, timeout: Duration) -> Result<Self, StorageError> {
        Self::connect_with_retry(url, prefix, timeout, &RetryConfig::startup()).await
    }

    pub async fn connect_with_retry(
        url: &str,
        prefix: &str,
        timeout: Duration,
        retry_config: &RetryConfig,
    ) -> Result<Self, StorageError> {
        let cache = Self::new(url, prefix, timeout)?;
        retry("redis_connect", retry_config, || cache.connection_manager()).await?;

        debug!(prefix = %prefix, "Redis shared cache connected");
        Ok(cache)
    }

    /// Wrap an existing connection (shared with other components).
    #[must_use]
    pub fn from_connection(connection: ConnectionManager, prefix: &str, timeout: Duration) -> Self {
        Self {
            client: None,
            connection: OnceCell::new_with(Some(connection)),
            prefix: prefix.to_string(),
            timeout,
        }
    }

    /// The live connection, if one has been established.
    #[must_use]
    pub fn connection(&self) -> Option<ConnectionManager> {
        self.connection.get().cloned()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[inline]
    fn key(&self, tenant: &TenantId) -> String {
        namespaced_key(&self.prefix, tenant)
    }

    /// Connected manager, connecting first if needed.
    async fn connection_manager(&self) -> Result<ConnectionManager, StorageError> {
        self.connection
            .get_or_try_init(|| async {
                let client = self
                    .client
                    .clone()
                    .ok_or_else(|| StorageError::Backend("no redis client configured".to_string()))?;
                let result = with_deadline("redis_connect", self.timeout, async move {
                    ConnectionManager::new(client)
                        .await
                        .map_err(|e| StorageError::Backend(format!("not connected: {e}")))
                })
                .await;
                match result {
                    Ok(manager) => {
                        debug!(prefix = %self.prefix, "Redis connection established");
                        Ok(manager)
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis connect failed, will retry on next command");
                        Err(e)
                    }
                }
            })
            .await
            .cloned()
    }
}

/// `<prefix><tenant>`
#[must_use]
pub fn namespaced_key(prefix: &str, tenant: &TenantId) -> String {
    let mut key = String::with_capacity(prefix.len() + tenant.as_str().len());
    key.push_str(prefix);
    key.push_str(tenant.as_str());
    key
}

/// Redis `EX` takes whole seconds and rejects 0.
#[must_use]
pub fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

/// A `GET` reply as a shard. Absent and empty values are both misses.
#[must_use]
pub fn shard_from_reply(value: Option<String>) -> Option<ShardId> {
    value.and_then(ShardId::from_string)
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn get(&self, tenant: &TenantId) -> Result<Option<ShardId>, StorageError> {
        let key = self.key(tenant);

        with_deadline("redis_get", self.timeout, async move {
            let mut conn = self.connection_manager().await?;
            let value: Option<String> = cmd("GET")
                .arg(&key)
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(shard_from_reply(value))
        })
        .await
    }

    async fn set(&self, tenant: &TenantId, shard: &ShardId, ttl: Duration) -> Result<(), StorageError> {
        let key = self.key(tenant);

        with_deadline("redis_set", self.timeout, async move {
            let mut conn = self.connection_manager().await?;
            let _: () = cmd("SET")
                .arg(&key)
                .arg(shard.as_str())
                .arg("EX")
                .arg(ttl_seconds(ttl))
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        with_deadline("redis_ping", self.timeout, async move {
            let mut conn = self.connection_manager().await?;
            let _: String = cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }
}
