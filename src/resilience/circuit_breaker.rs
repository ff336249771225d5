// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-tier circuit breakers using the recloser crate.
//!
//! The shared cache and the authoritative store each sit behind a named
//! breaker. When a tier's failure rate over the closed-state window exceeds the
//! threshold, calls fail fast until `open_wait` elapses and a half-open probe
//! window succeeds.
//!
//! States:
//! - Closed: calls pass through
//! - Open: calls are rejected without touching the backend
//! - HalfOpen: a small window of probe calls decides whether to close

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The breaker is open
    #[error("circuit breaker open, request rejected")]
    Rejected,

    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

impl<E> From<RecloserError<E>> for CircuitError<E> {
    fn from(err: RecloserError<E>) -> Self {
        match err {
            RecloserError::Rejected => CircuitError::Rejected,
            RecloserError::Inner(e) => CircuitError::Inner(e),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Failure rate (0.0..=1.0) over the closed window that opens the breaker
    pub failure_rate: f32,
    /// Calls remembered while closed; the rate is judged once it fills
    pub closed_window: usize,
    /// Probe calls allowed while half-open
    pub half_open_window: usize,
    /// Time spent open before probing
    pub open_wait: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self::store()
    }
}

impl CircuitConfig {
    /// Shared cache: a miss costs one store fetch, so tolerate a wide window
    /// and probe again quickly.
    #[must_use]
    pub fn shared_cache() -> Self {
        Self {
            failure_rate: 0.5,
            closed_window: 20,
            half_open_window: 3,
            open_wait: Duration::from_secs(2),
        }
    }

    /// Authoritative store: stop hammering S3 while it is down.
    #[must_use]
    pub fn store() -> Self {
        Self {
            failure_rate: 0.5,
            closed_window: 10,
            half_open_window: 2,
            open_wait: Duration::from_secs(5),
        }
    }

    /// Opens only after a full window of 10 000 consecutive failures.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            failure_rate: 1.0,
            closed_window: 10_000,
            half_open_window: 1,
            open_wait: Duration::from_millis(1),
        }
    }

    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_rate: 0.5,
            closed_window: 4,
            half_open_window: 1,
            open_wait: Duration::from_millis(50),
        }
    }
}

/// A named circuit breaker with call counters.
pub struct CircuitBreaker {
    name: &'static str,
    inner: AsyncRecloser,

    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(config.failure_rate)
            .closed_len(config.closed_window.max(1))
            .half_open_len(config.half_open_window.max(1))
            .open_wait(config.open_wait)
            .build();

        Self {
            name,
            inner: AsyncRecloser::from(recloser),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `f` through the breaker.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        match self.inner.call(f()).await {
            Ok(result) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_circuit_breaker_call(self.name, "success");
                Ok(result)
            }
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                warn!(circuit = self.name, "Circuit breaker rejected call (open)");
                crate::metrics::record_circuit_breaker_call(self.name, "rejected");
                Err(CircuitError::Rejected)
            }
            Err(RecloserError::Inner(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = self.name, "Circuit call failed");
                crate::metrics::record_circuit_breaker_call(self.name, "failure");
                Err(CircuitError::Inner(e))
            }
        }
    }

    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}

/// The two remote tiers' breakers.
pub struct TierCircuits {
    pub shared_cache: CircuitBreaker,
    pub store: CircuitBreaker,
}

impl Default for TierCircuits {
    fn default() -> Self {
        Self::new(CircuitConfig::shared_cache(), CircuitConfig::store())
    }
}

impl TierCircuits {
    pub const SHARED_CACHE: &'static str = "shared_cache";
    pub const STORE: &'static str = "authoritative_store";

    #[must_use]
    pub fn new(shared_cache: CircuitConfig, store: CircuitConfig) -> Self {
        Self {
            shared_cache: CircuitBreaker::new(Self::SHARED_CACHE, shared_cache),
            store: CircuitBreaker::new(Self::STORE, store),
        }
    }

    /// Breakers that never open, for hosts that handle backoff themselves.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(CircuitConfig::disabled(), CircuitConfig::disabled())
    }

    #[must_use]
    pub fn snapshot(&self) -> TierCircuitStats {
        TierCircuitStats {
            shared_cache_calls: self.shared_cache.calls_total(),
            shared_cache_failures: self.shared_cache.failures(),
            shared_cache_rejections: self.shared_cache.rejections(),
            store_calls: self.store.calls_total(),
            store_failures: self.store.failures(),
            store_rejections: self.store.rejections(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierCircuitStats {
    pub shared_cache_calls: u64,
    pub shared_cache_failures: u64,
    pub shared_cache_rejections: u64,
    pub store_calls: u64,
    pub store_failures: u64,
    pub store_rejections: u64,
}
