// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for shard-router.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host process
//! installs the exporter (Prometheus, OTEL, etc.); without one every call here
//! is a no-op.
//!
//! # Metric Naming Convention
//! - `shard_router_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: local, shared, authoritative
//! - `outcome`: hit, miss, error (per tier); found, not_mapped, failed (per resolve)
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// One tier consulted during a resolve.
pub fn record_lookup(tier: &'static str, outcome: &'static str) {
    counter!(
        "shard_router_lookups_total",
        "tier" => tier,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_lookup_latency(tier: &'static str, duration: Duration) {
    histogram!(
        "shard_router_lookup_seconds",
        "tier" => tier
    )
    .record(duration.as_secs_f64());
}

/// Final result of a resolve call.
pub fn record_resolution(outcome: &'static str) {
    counter!(
        "shard_router_resolutions_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Best-effort cache fill after a lower-tier hit.
pub fn record_writeback(tier: &'static str, success: bool) {
    counter!(
        "shard_router_writebacks_total",
        "tier" => tier,
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

pub fn set_local_cache_items(count: usize) {
    gauge!("shard_router_local_cache_items").set(count as f64);
}

pub fn record_local_eviction() {
    counter!("shard_router_local_cache_evictions_total").increment(1);
}

/// Rows in the most recent mapping document fetch.
pub fn set_mapping_table_entries(count: usize) {
    gauge!("shard_router_mapping_table_entries").set(count as f64);
}

pub fn set_backend_healthy(backend: &'static str, healthy: bool) {
    gauge!(
        "shard_router_backend_healthy",
        "backend" => backend
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_circuit_breaker_call(circuit: &'static str, outcome: &'static str) {
    counter!(
        "shard_router_circuit_breaker_calls_total",
        "circuit" => circuit,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_startup_phase(phase: &'static str, duration: Duration) {
    histogram!(
        "shard_router_startup_seconds",
        "phase" => phase
    )
    .record(duration.as_secs_f64());
}

/// A timing guard that records lookup latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    start: Instant,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(tier: &'static str) -> Self {
        Self {
            tier,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_lookup_latency(self.tier, self.start.elapsed());
    }
}
