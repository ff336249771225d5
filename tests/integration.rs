//! Integration Tests for Shard Router
//!
//! Tests that need real backends (Redis, and MinIO standing in for S3).
//! Containers come from testcontainers, no docker-compose required.
//!
//! # Running Tests
//! ```bash
//! # All integration tests (requires Docker)
//! cargo test --test integration -- --ignored
//!
//! # Only happy-path tests
//! cargo test --test integration happy -- --ignored
//!
//! # Only failure scenario tests
//! cargo test --test integration failure -- --ignored
//! ```
//!
//! # Test Organization
//! - `happy_*` - Normal operation: wire format, TTLs, full startup from config
//! - `failure_*` - Failure scenarios: Redis down at startup, Redis arriving late,
//!   Redis death

use std::sync::Arc;
use std::time::Duration;

use redis::cmd;
use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage, RunnableImage};

use shard_router::storage::SharedCache;
use shard_router::{
    Mapping, RedisSharedCache, ResolverConfig, ShardId, ShardOutcome, StaticMappingStore, TenantId,
    Tier, TierCircuits, TieredResolver,
};

// =============================================================================
// Container Helpers
// =============================================================================

fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

/// S3-compatible object store
fn minio_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("minio/minio", "latest")
        .with_env_var("MINIO_ROOT_USER", "minioadmin")
        .with_env_var("MINIO_ROOT_PASSWORD", "minioadmin")
        .with_exposed_port(9000)
        .with_wait_for(WaitFor::message_on_stdout("API:"));
    let runnable = RunnableImage::from((image, vec!["server".to_string(), "/data".to_string()]));
    docker.run(runnable)
}

async fn redis_cache(port: u16, prefix: &str) -> RedisSharedCache {
    RedisSharedCache::connect(
        &format!("redis://127.0.0.1:{port}/0"),
        prefix,
        Duration::from_secs(2),
    )
    .await
    .expect("Failed to connect to Redis")
}

fn config() -> ResolverConfig {
    ResolverConfig::new("routing", "tenants.json").unwrap()
}

fn table() -> Vec<Mapping> {
    vec![Mapping::new("tenant1", "shard-a"), Mapping::new("acme", "shard-c")]
}

fn shard(s: &str) -> ShardId {
    ShardId::parse(s).unwrap()
}

// =============================================================================
// Happy Path Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_redis_get_set_round_trip() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = redis_cache(redis.get_host_port_ipv4(6379), "it:").await;
    let tenant = TenantId::parse("acme").unwrap();

    assert_eq!(cache.get(&tenant).await.unwrap(), None);
    cache.set(&tenant, &shard("shard-c"), Duration::from_secs(60)).await.unwrap();
    assert_eq!(cache.get(&tenant).await.unwrap(), Some(shard("shard-c")));
    cache.ping().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_write_back_uses_prefix_and_ttl() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = redis_cache(redis.get_host_port_ipv4(6379), "shard_router:").await;
    let mut conn = cache.connection().expect("connected at startup");

    let resolver = TieredResolver::new(
        config(),
        Some(Arc::new(cache)),
        Arc::new(StaticMappingStore::new(table())),
    )
    .unwrap();

    assert_eq!(
        resolver.resolve_outcome("tenant1").await,
        ShardOutcome::Found(shard("shard-a"))
    );

    let value: Option<String> = cmd("GET")
        .arg("shard_router:tenant1")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("shard-a"));

    let ttl: i64 = cmd("TTL")
        .arg("shard_router:tenant1")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert!(ttl > 0 && ttl <= 300, "ttl was {ttl}");

    // NotMapped is never written
    assert_eq!(resolver.resolve_outcome("missing").await, ShardOutcome::NotMapped);
    let exists: i64 = cmd("EXISTS")
        .arg("shard_router:missing")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(exists, 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_empty_value_falls_through_and_is_overwritten() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = redis_cache(redis.get_host_port_ipv4(6379), "shard_router:").await;
    let mut conn = cache.connection().expect("connected at startup");

    let _: () = cmd("SET")
        .arg("shard_router:acme")
        .arg("")
        .query_async(&mut conn)
        .await
        .unwrap();

    let store = Arc::new(StaticMappingStore::new(table()));
    let resolver = TieredResolver::new(config(), Some(Arc::new(cache)), store.clone()).unwrap();

    let resolution = resolver.resolve("acme").await.unwrap();
    assert_eq!(resolution.tier(), Some(Tier::Authoritative));
    assert_eq!(resolution.shard(), Some(&shard("shard-c")));
    assert_eq!(store.fetch_calls(), 1);

    let value: Option<String> = cmd("GET")
        .arg("shard_router:acme")
        .query_async(&mut conn)
        .await
        .unwrap();
    assert_eq!(value.as_deref(), Some("shard-c"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_second_instance_served_by_shared_cache() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let first = TieredResolver::new(
        config(),
        Some(Arc::new(redis_cache(port, "shared:").await)),
        Arc::new(StaticMappingStore::new(table())),
    )
    .unwrap();
    first.resolve("acme").await.unwrap();

    let store = Arc::new(StaticMappingStore::new(table()));
    let second = TieredResolver::new(
        config(),
        Some(Arc::new(redis_cache(port, "shared:").await)),
        store.clone(),
    )
    .unwrap();

    let resolution = second.resolve("acme").await.unwrap();
    assert_eq!(resolution.tier(), Some(Tier::Shared));
    assert_eq!(store.fetch_calls(), 0);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_connect_from_config_against_minio_and_redis() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let minio = minio_container(&docker);
    let endpoint = format!("http://127.0.0.1:{}", minio.get_host_port_ipv4(9000));

    std::env::set_var("AWS_ACCESS_KEY_ID", "minioadmin");
    std::env::set_var("AWS_SECRET_ACCESS_KEY", "minioadmin");

    // Publish the mapping document
    let aws = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_sdk_s3::config::Region::new("us-east-1"))
        .load()
        .await;
    let s3 = aws_sdk_s3::Client::from_conf(
        aws_sdk_s3::config::Builder::from(&aws)
            .endpoint_url(&endpoint)
            .force_path_style(true)
            .build(),
    );
    s3.create_bucket().bucket("routing").send().await.unwrap();
    s3.put_object()
        .bucket("routing")
        .key("tenants.json")
        .body(aws_sdk_s3::primitives::ByteStream::from(
            br#"{"mappings": [{"tenant_id": "tenant1", "shard_id": "shard-a"}, {"tenant_id": "acme", "shard_id": "shard-c"}]}"#.to_vec(),
        ))
        .send()
        .await
        .unwrap();

    let mut config = config();
    config.store_endpoint = Some(endpoint);
    config.shared_cache_addr = format!("127.0.0.1:{}", redis.get_host_port_ipv4(6379));

    let resolver = TieredResolver::connect(config).await.unwrap();
    assert!(resolver.has_shared_cache());

    assert_eq!(
        resolver.resolve_outcome("acme").await,
        ShardOutcome::Found(shard("shard-c"))
    );
    assert_eq!(resolver.resolve_outcome("nobody").await, ShardOutcome::NotMapped);

    let health = resolver.health_check().await;
    assert_eq!(health.shared_cache_connected, Some(true));
    assert!(health.healthy);
}

// =============================================================================
// Failure Scenario Tests
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_unavailable_at_startup() {
    let mut config = config();
    // Nothing listens here
    config.shared_cache_addr = "127.0.0.1:1".to_string();
    config.shared_cache_timeout_ms = 200;

    let resolver = TieredResolver::connect(config).await.unwrap();
    assert!(resolver.has_shared_cache());

    let health = resolver.health_check().await;
    assert_eq!(health.shared_cache_connected, Some(false));
    assert!(!health.healthy);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_starts_after_resolver() {
    // Reserve a host port, then release it for the container
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let cache = RedisSharedCache::new(
        &format!("redis://127.0.0.1:{port}/0"),
        "late:",
        Duration::from_millis(500),
    )
    .unwrap();
    let resolver = TieredResolver::new(
        config(),
        Some(Arc::new(cache)),
        Arc::new(StaticMappingStore::new(table())),
    )
    .unwrap()
    .with_circuits(TierCircuits::disabled());

    // Redis absent: store still answers
    assert!(resolver.resolve_outcome("tenant1").await.is_found());
    assert_eq!(resolver.stats().shared_write_failures, 1);

    let docker = Cli::default();
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    let _redis = docker.run(RunnableImage::from(image).with_mapped_port((port, 6379)));

    // The next cold resolve connects and writes back
    assert!(resolver.resolve_outcome("acme").await.is_found());
    let mut conn = redis::Client::open(format!("redis://127.0.0.1:{port}/0"))
        .unwrap()
        .get_multiplexed_async_connection()
        .await
        .unwrap();
    let value: Option<String> = cmd("GET").arg("late:acme").query_async(&mut conn).await.unwrap();
    assert_eq!(value.as_deref(), Some("shard-c"));

    let health = resolver.health_check().await;
    assert_eq!(health.shared_cache_connected, Some(true));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_dies_mid_operation() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let cache = redis_cache(redis.get_host_port_ipv4(6379), "it:").await;

    let resolver = TieredResolver::new(
        config(),
        Some(Arc::new(cache)),
        Arc::new(StaticMappingStore::new(table())),
    )
    .unwrap();
    assert!(resolver.resolve_outcome("tenant1").await.is_found());

    redis.stop();

    assert_eq!(
        resolver.resolve_outcome("acme").await,
        ShardOutcome::Found(shard("shard-c"))
    );
    let health = resolver.health_check().await;
    assert_eq!(health.shared_cache_connected, Some(false));
    assert!(!health.healthy);
}
