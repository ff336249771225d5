//! # Shard Router
//!
//! Tenant-to-shard resolution for a proxy's request path.
//!
//! ## Architecture
//!
//! Every lookup walks three tiers, stopping at the first hit and filling the
//! faster tiers it skipped:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  L1: LocalCache (in-process)                │
//! │  • Bounded LRU, no expiry                                  │
//! │  • Never touches the network                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ miss
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  L2: SharedCache (Redis)                    │
//! │  • GET / SET EX under a key prefix                         │
//! │  • Errors and timeouts degrade to L3                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ miss
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │             L3: AuthoritativeStore (S3 document)            │
//! │  • Whole mapping table per fetch, first match wins         │
//! │  • Fetch failure is the only fatal outcome                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use shard_router::{ResolverConfig, ShardOutcome, TieredResolver};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ResolverConfig::from_json(r#"{
//!         "store_bucket": "routing",
//!         "store_key": "tenants.json",
//!         "shared_cache_addr": "localhost:6379"
//!     }"#).expect("invalid config");
//!
//!     // Connects to Redis (or runs without it) and builds the S3 client
//!     let resolver = Arc::new(TieredResolver::connect(config).await.expect("startup failed"));
//!
//!     match resolver.resolve_outcome("acme").await {
//!         ShardOutcome::Found(shard) => println!("route to {shard}"),
//!         ShardOutcome::NotMapped => println!("no mapping"),
//!         ShardOutcome::Error(kind) => println!("lookup failed: {kind}"),
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`resolver`]: the [`TieredResolver`] and its result types
//! - [`local_cache`]: in-process LRU
//! - [`storage`]: shared cache and authoritative store clients (Redis, S3, memory)
//! - [`filter`]: request/response header glue for a proxy host
//! - [`tenant`]: identifiers, the mapping document, tenant extraction
//! - [`config`]: [`ResolverConfig`] and layered overrides
//! - [`resilience`]: circuit breakers and startup retry
//! - [`metrics`]: `metrics` facade instrumentation

pub mod config;
pub mod filter;
pub mod local_cache;
pub mod metrics;
pub mod resilience;
pub mod resolver;
pub mod storage;
pub mod tenant;

pub use config::{ConfigError, ExtractionMode, ResolverConfig, ResolverConfigOverrides};
pub use filter::{RouteDecision, ShardRouterFilter};
pub use local_cache::{LocalCache, LocalCacheStats};
pub use metrics::LatencyTimer;
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError, TierCircuits};
pub use resilience::retry::RetryConfig;
pub use resolver::{ResolveError, Resolution, ResolverHealth, ResolverStats, ShardOutcome, Tier, TieredResolver};
pub use storage::{
    AuthoritativeStore, InMemorySharedCache, RedisSharedCache, S3MappingStore, SharedCache,
    StaticMappingStore, StorageError,
};
pub use tenant::{extract_tenant, ExtractError, Mapping, MappingDocument, ShardId, TenantId};
