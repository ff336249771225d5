// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic shard-router usage example.
//!
//! Runs entirely in-process (no Docker):
//! 1. Build a resolver over an in-memory shared cache and a static table
//! 2. Resolve cold, then warm, then unknown tenants
//! 3. Route a request through the header filter
//! 4. Knock the store over and show which tenants still resolve
//! 5. Display metrics and resolver stats
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=shard_router=debug cargo run --example basic_usage
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tracing_subscriber::EnvFilter;

use shard_router::{
    AuthoritativeStore, InMemorySharedCache, Mapping, ResolverConfig, ShardRouterFilter,
    StaticMappingStore, StorageError, TieredResolver,
};

/// Static table with an outage switch.
struct SwitchableStore {
    inner: StaticMappingStore,
    down: AtomicBool,
}

#[async_trait]
impl AuthoritativeStore for SwitchableStore {
    async fn fetch_all(&self) -> Result<Vec<Mapping>, StorageError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("bucket unreachable".to_string()));
        }
        self.inner.fetch_all().await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           shard-router: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Build the resolver
    // ─────────────────────────────────────────────────────────────────────────
    let config = ResolverConfig::from_json(
        r#"{
            "store_bucket": "routing",
            "store_key": "tenants.json",
            "local_cache_capacity": 100,
            "shared_cache_ttl_secs": 60
        }"#,
    )?;

    let store = Arc::new(SwitchableStore {
        inner: StaticMappingStore::from_json(
            br#"{"mappings": [
                {"tenant_id": "tenant1", "shard_id": "shard-a"},
                {"tenant_id": "globex",  "shard_id": "shard-b"},
                {"tenant_id": "acme",    "shard_id": "shard-c"}
            ]}"#,
        )?,
        down: AtomicBool::new(false),
    });
    let shared = Arc::new(InMemorySharedCache::with_prefix(&config.shared_cache_key_prefix));
    let resolver = Arc::new(TieredResolver::new(config, Some(shared.clone()), store.clone())?);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Resolve
    // ─────────────────────────────────────────────────────────────────────────
    println!("🔎 Resolving...");
    for tenant in ["tenant1", "tenant1", "acme", "missing"] {
        match resolver.resolve(tenant).await? {
            resolution @ shard_router::Resolution::Found { .. } => println!(
                "   {tenant:<8} → {} (from {})",
                resolution.shard().map(|s| s.as_str()).unwrap_or_default(),
                resolution.tier().map(|t| t.as_str()).unwrap_or_default(),
            ),
            shard_router::Resolution::NotMapped => println!("   {tenant:<8} → not mapped"),
        }
    }
    println!("   shared cache now holds {} key(s)", shared.len());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Route a request through the filter
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🌐 Routing a request for globex.example.com...");
    let filter = ShardRouterFilter::new(resolver.clone())?;
    let mut request = HeaderMap::new();
    request.insert("host", HeaderValue::from_static("globex.example.com"));
    let decision = filter.on_request_headers(&request).await;
    let mut response = HeaderMap::new();
    filter.on_response_headers(&decision, &mut response);
    println!("   decision: {decision:?}");
    println!("   response headers: {response:?}");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Store outage
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n💥 Taking the authoritative store down...");
    store.down.store(true, Ordering::SeqCst);
    for tenant in ["acme", "never-seen"] {
        println!("   {tenant:<10} → {}", resolver.resolve_outcome(tenant).await);
    }
    store.down.store(false, Ordering::SeqCst);

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Stats and metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Resolver stats: {:?}", resolver.stats());
    println!("   Health: {:?}", resolver.health_check().await);
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n✅ Done\n");
    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.6}s", samples.len(), sum)
                }
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();

    lines.sort();
    for line in lines {
        println!("   └─ {line}");
    }
}
