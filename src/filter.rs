// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Proxy-side glue: request headers in, routing hint out.
//!
//! A request that already carries the shard header is left alone. Otherwise
//! the tenant is extracted, resolved, and a found shard is echoed on the
//! response. Nothing here fails a request: extraction errors, unmapped tenants
//! and store outages all end in [`RouteDecision::Unrouted`].
//!
//! ```rust
//! use std::sync::Arc;
//! use http::{HeaderMap, HeaderValue};
//! use shard_router::{
//!     Mapping, ResolverConfig, RouteDecision, ShardRouterFilter, StaticMappingStore,
//!     TieredResolver,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = ResolverConfig::new("routing", "tenants.json").unwrap();
//! let store = Arc::new(StaticMappingStore::new(vec![Mapping::new("acme", "shard-c")]));
//! let resolver = Arc::new(TieredResolver::new(config, None, store).unwrap());
//! let filter = ShardRouterFilter::new(resolver).unwrap();
//!
//! let mut request = HeaderMap::new();
//! request.insert("host", HeaderValue::from_static("acme.example.com"));
//! let decision = filter.on_request_headers(&request).await;
//!
//! let mut response = HeaderMap::new();
//! filter.on_response_headers(&decision, &mut response);
//! assert_eq!(response.get("x-shard-id").unwrap(), "shard-c");
//! # }
//! ```

use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::resolver::{ShardOutcome, TieredResolver};
use crate::tenant::{extract_tenant, ShardId};

/// Per-request result of [`ShardRouterFilter::on_request_headers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The request already carried the shard header; nothing was resolved
    AlreadyRouted,
    Routed(ShardId),
    /// No routing hint; the request proceeds unchanged
    Unrouted,
}

pub struct ShardRouterFilter {
    resolver: Arc<TieredResolver>,
    shard_header: HeaderName,
}

impl ShardRouterFilter {
    pub fn new(resolver: Arc<TieredResolver>) -> Result<Self, ConfigError> {
        let name = &resolver.config().shard_header_name;
        let shard_header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::Invalid {
            field: "shard_header_name",
            reason: e.to_string(),
        })?;
        Ok(Self {
            resolver,
            shard_header,
        })
    }

    #[must_use]
    pub fn resolver(&self) -> &TieredResolver {
        &self.resolver
    }

    pub async fn on_request_headers(&self, headers: &HeaderMap) -> RouteDecision {
        if headers.contains_key(&self.shard_header) {
            debug!(header = %self.shard_header, "Request already routed");
            return RouteDecision::AlreadyRouted;
        }

        let config = self.resolver.config();
        let tenant = match extract_tenant(
            config.tenant_extraction_mode,
            &config.tenant_header_name,
            headers,
        ) {
            Ok(tenant) => tenant,
            Err(e) => {
                debug!(error = %e, mode = %config.tenant_extraction_mode, "No tenant on request");
                return RouteDecision::Unrouted;
            }
        };

        match ShardOutcome::from(self.resolver.resolve_tenant(&tenant).await) {
            ShardOutcome::Found(shard) => RouteDecision::Routed(shard),
            ShardOutcome::NotMapped => {
                debug!(tenant = %tenant, "Tenant has no shard mapping");
                RouteDecision::Unrouted
            }
            ShardOutcome::Error(kind) => {
                warn!(tenant = %tenant, kind, "Shard resolution failed, forwarding unrouted");
                RouteDecision::Unrouted
            }
        }
    }

    /// Attach the routing hint for [`RouteDecision::Routed`]; leave every other
    /// response untouched.
    pub fn on_response_headers(&self, decision: &RouteDecision, headers: &mut HeaderMap) {
        let RouteDecision::Routed(shard) = decision else {
            return;
        };
        match HeaderValue::from_str(shard.as_str()) {
            Ok(value) => {
                headers.insert(self.shard_header.clone(), value);
            }
            Err(e) => warn!(shard = %shard, error = %e, "Shard id is not a valid header value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionMode, ResolverConfig};
    use crate::storage::{AuthoritativeStore, StaticMappingStore, StorageError};
    use crate::tenant::Mapping;
    use async_trait::async_trait;

    struct UnreachableStore;

    #[async_trait]
    impl AuthoritativeStore for UnreachableStore {
        async fn fetch_all(&self) -> Result<Vec<Mapping>, StorageError> {
            Err(StorageError::Backend("connection refused".into()))
        }
    }

    fn filter_with(config: ResolverConfig, store: Arc<dyn AuthoritativeStore>) -> ShardRouterFilter {
        let resolver = TieredResolver::new(config, None, store).unwrap();
        ShardRouterFilter::new(Arc::new(resolver)).unwrap()
    }

    fn subdomain_filter() -> ShardRouterFilter {
        let store = Arc::new(StaticMappingStore::new(vec![Mapping::new("acme", "shard-c")]));
        filter_with(ResolverConfig::new("routing", "tenants.json").unwrap(), store)
    }

    fn host(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static(value));
        headers
    }

    #[tokio::test]
    async fn test_routes_by_subdomain() {
        let filter = subdomain_filter();
        let decision = filter.on_request_headers(&host("acme.example.com:8443")).await;
        assert_eq!(decision, RouteDecision::Routed(ShardId::parse("shard-c").unwrap()));

        let mut response = HeaderMap::new();
        filter.on_response_headers(&decision, &mut response);
        assert_eq!(response.get("X-SHARD-ID").unwrap(), "shard-c");
    }

    #[tokio::test]
    async fn test_existing_shard_header_skips_resolution() {
        let filter = subdomain_filter();
        let mut headers = host("acme.example.com");
        headers.insert("x-shard-id", HeaderValue::from_static("pinned"));

        let decision = filter.on_request_headers(&headers).await;
        assert_eq!(decision, RouteDecision::AlreadyRouted);
        assert_eq!(filter.resolver().stats().total(), 0);

        let mut response = HeaderMap::new();
        filter.on_response_headers(&decision, &mut response);
        assert!(response.is_empty());
    }

    #[tokio::test]
    async fn test_bare_host_is_unrouted() {
        let filter = subdomain_filter();
        assert_eq!(filter.on_request_headers(&host("localhost")).await, RouteDecision::Unrouted);
        assert_eq!(filter.on_request_headers(&HeaderMap::new()).await, RouteDecision::Unrouted);
    }

    #[tokio::test]
    async fn test_unmapped_tenant_is_unrouted() {
        let filter = subdomain_filter();
        let decision = filter.on_request_headers(&host("ghost.example.com")).await;
        assert_eq!(decision, RouteDecision::Unrouted);

        let mut response = HeaderMap::new();
        filter.on_response_headers(&decision, &mut response);
        assert!(response.get("x-shard-id").is_none());
    }

    #[tokio::test]
    async fn test_store_outage_is_unrouted() {
        let filter = filter_with(
            ResolverConfig::new("routing", "tenants.json").unwrap(),
            Arc::new(UnreachableStore),
        );
        let decision = filter.on_request_headers(&host("acme.example.com")).await;
        assert_eq!(decision, RouteDecision::Unrouted);
        assert_eq!(filter.resolver().stats().failures, 1);
    }

    #[tokio::test]
    async fn test_header_mode_with_custom_names() {
        let mut config = ResolverConfig::new("routing", "tenants.json").unwrap();
        config.tenant_extraction_mode = ExtractionMode::Header;
        config.tenant_header_name = "X-Org".to_string();
        config.shard_header_name = "X-Backend".to_string();
        let store = Arc::new(StaticMappingStore::new(vec![Mapping::new("org-7", "db-3")]));
        let filter = filter_with(config, store);

        let mut headers = HeaderMap::new();
        headers.insert("x-org", HeaderValue::from_static("org-7"));
        let decision = filter.on_request_headers(&headers).await;

        let mut response = HeaderMap::new();
        filter.on_response_headers(&decision, &mut response);
        assert_eq!(response.get("x-backend").unwrap(), "db-3");
    }

    #[tokio::test]
    async fn test_concurrent_requests_keep_their_own_decision() {
        let store = Arc::new(StaticMappingStore::new(vec![
            Mapping::new("a", "shard-a"),
            Mapping::new("b", "shard-b"),
        ]));
        let filter = Arc::new(filter_with(
            ResolverConfig::new("routing", "tenants.json").unwrap(),
            store,
        ));

        let mut handles = Vec::new();
        for i in 0..50 {
            let filter = filter.clone();
            handles.push(tokio::spawn(async move {
                let (hostname, expected) = if i % 2 == 0 {
                    ("a.example.com", "shard-a")
                } else {
                    ("b.example.com", "shard-b")
                };
                let decision = filter.on_request_headers(&host(hostname)).await;
                let mut response = HeaderMap::new();
                filter.on_response_headers(&decision, &mut response);
                assert_eq!(response.get("x-shard-id").unwrap(), expected);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
