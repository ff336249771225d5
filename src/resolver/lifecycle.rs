// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Startup from configuration and health probing.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::{ResolverHealth, TieredResolver};
use crate::config::{ConfigError, ResolverConfig};
use crate::resilience::retry::RetryConfig;
use crate::storage::s3::{S3Location, S3MappingStore};
use crate::storage::RedisSharedCache;

impl TieredResolver {
    /// Build a resolver against real backends.
    ///
    /// Startup flow:
    /// 1. Validate the config
    /// 2. Build the S3 client for the mapping document (no I/O yet)
    /// 3. Connect to Redis with the startup retry policy. If that fails the
    ///    resolver still starts; the shared tier degrades per call and
    ///    connects once Redis is reachable.
    #[tracing::instrument(skip(config), fields(shared_cache_connected))]
    pub async fn connect(config: ResolverConfig) -> Result<Self, ConfigError> {
        Self::connect_with_retry(config, &RetryConfig::startup()).await
    }

    pub async fn connect_with_retry(
        config: ResolverConfig,
        retry_config: &RetryConfig,
    ) -> Result<Self, ConfigError> {
        let startup_start = Instant::now();
        config.validate()?;
        let shared_url = config.shared_cache_url()?;

        // ========== Authoritative store ==========
        let phase_start = Instant::now();
        let store = S3MappingStore::new(S3Location::from_config(&config), config.store_timeout()).await;
        info!(
            bucket = %config.store_bucket,
            key = %config.store_key,
            endpoint = config.store_endpoint.as_deref().unwrap_or("aws"),
            "Authoritative store client ready"
        );
        crate::metrics::record_startup_phase("store_client", phase_start.elapsed());

        // ========== Shared cache ==========
        let phase_start = Instant::now();
        let shared = match RedisSharedCache::connect_with_retry(
            &shared_url,
            &config.shared_cache_key_prefix,
            config.shared_cache_timeout(),
            retry_config,
        )
        .await
        {
            Ok(cache) => {
                tracing::Span::current().record("shared_cache_connected", true);
                crate::metrics::set_backend_healthy("shared_cache", true);
                info!(addr = %config.shared_cache_addr, "Shared cache connected");
                cache
            }
            Err(e) => {
                tracing::Span::current().record("shared_cache_connected", false);
                crate::metrics::set_backend_healthy("shared_cache", false);
                warn!(
                    addr = %config.shared_cache_addr,
                    error = %e,
                    "Shared cache unreachable at startup, will connect on demand"
                );
                RedisSharedCache::new(
                    &shared_url,
                    &config.shared_cache_key_prefix,
                    config.shared_cache_timeout(),
                )
                .map_err(|e| ConfigError::Invalid {
                    field: "shared_cache_addr",
                    reason: e.to_string(),
                })?
            }
        };
        crate::metrics::record_startup_phase("shared_cache_connect", phase_start.elapsed());

        let resolver = Self::new(config, Some(Arc::new(shared)), Arc::new(store))?;
        crate::metrics::record_startup_phase("total", startup_start.elapsed());
        info!(local_capacity = resolver.local.capacity(), "Resolver ready");
        Ok(resolver)
    }

    /// Probe the shared cache with `PING` and report local occupancy.
    ///
    /// The authoritative store is not probed: a fetch is a full document read.
    ///
    /// ```rust,ignore
    /// let health = resolver.health_check().await;
    /// if health.healthy {
    ///     // ready
    /// }
    /// ```
    pub async fn health_check(&self) -> ResolverHealth {
        let (shared_cache_connected, shared_cache_latency_ms) = self.probe_shared().await;
        let local = self.local.stats();

        ResolverHealth {
            shared_cache_connected,
            shared_cache_latency_ms,
            local_cache_items: local.entries,
            local_cache_capacity: local.capacity,
            healthy: shared_cache_connected != Some(false),
        }
    }

    async fn probe_shared(&self) -> (Option<bool>, Option<u64>) {
        let Some(ref shared) = self.shared else {
            return (None, None);
        };

        let start = Instant::now();
        let timeout = self.config.shared_cache_timeout();
        let result =
            crate::storage::traits::with_deadline("shared_cache_ping", timeout, shared.ping()).await;

        match result {
            Ok(()) => {
                crate::metrics::set_backend_healthy("shared_cache", true);
                (Some(true), Some(start.elapsed().as_millis() as u64))
            }
            Err(e) => {
                warn!(error = %e, "Shared cache health probe failed");
                crate::metrics::set_backend_healthy("shared_cache", false);
                (Some(false), None)
            }
        }
    }
}
