// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the tiered resolver.

use thiserror::Error;

use crate::storage::StorageError;
use crate::tenant::ShardId;

/// The tier that answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// In-process LRU
    Local,
    /// Distributed TTL cache (Redis)
    Shared,
    /// Mapping document (S3)
    Authoritative,
}

impl Tier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Shared => "shared",
            Self::Authoritative => "authoritative",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful outcome of a resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found { shard: ShardId, tier: Tier },
    /// The tenant is absent from the authoritative table
    NotMapped,
}

impl Resolution {
    #[must_use]
    pub fn shard(&self) -> Option<&ShardId> {
        match self {
            Self::Found { shard, .. } => Some(shard),
            Self::NotMapped => None,
        }
    }

    #[must_use]
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::Found { tier, .. } => Some(*tier),
            Self::NotMapped => None,
        }
    }

    #[must_use]
    pub fn into_shard(self) -> Option<ShardId> {
        match self {
            Self::Found { shard, .. } => Some(shard),
            Self::NotMapped => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    /// Rejected before any tier was touched
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authoritative fetch failed: {0}")]
    AuthoritativeFetch(#[source] StorageError),
}

impl ResolveError {
    /// Stable label for the host and for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::AuthoritativeFetch(StorageError::Timeout { .. }) => "authoritative_timeout",
            Self::AuthoritativeFetch(StorageError::Parse(_)) => "authoritative_parse",
            Self::AuthoritativeFetch(StorageError::CircuitOpen(_)) => "authoritative_circuit_open",
            Self::AuthoritativeFetch(StorageError::Backend(_)) => "authoritative_unavailable",
        }
    }
}

/// What the host sees: the three-way answer to "which shard owns this tenant?".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardOutcome {
    Found(ShardId),
    NotMapped,
    Error(&'static str),
}

impl ShardOutcome {
    #[must_use]
    pub fn shard(&self) -> Option<&ShardId> {
        match self {
            Self::Found(shard) => Some(shard),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl From<Result<Resolution, ResolveError>> for ShardOutcome {
    fn from(result: Result<Resolution, ResolveError>) -> Self {
        match result {
            Ok(Resolution::Found { shard, .. }) => Self::Found(shard),
            Ok(Resolution::NotMapped) => Self::NotMapped,
            Err(e) => Self::Error(e.kind()),
        }
    }
}

impl std::fmt::Display for ShardOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Found(shard) => write!(f, "Found({shard})"),
            Self::NotMapped => write!(f, "NotMapped"),
            Self::Error(kind) => write!(f, "Error({kind})"),
        }
    }
}

/// Resolve counters since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub local_hits: u64,
    pub shared_hits: u64,
    pub authoritative_hits: u64,
    pub not_mapped: u64,
    pub failures: u64,
    pub invalid_inputs: u64,
    /// Shared-cache reads that errored, timed out or were rejected by the breaker
    pub shared_errors: u64,
    /// Best-effort shared-cache writes that failed
    pub shared_write_failures: u64,
    pub store_fetches: u64,
}

impl ResolverStats {
    #[must_use]
    pub fn found(&self) -> u64 {
        self.local_hits + self.shared_hits + self.authoritative_hits
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.found() + self.not_mapped + self.failures + self.invalid_inputs
    }
}

/// Health snapshot for readiness and diagnostics endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverHealth {
    /// `None` when no shared tier is configured
    pub shared_cache_connected: Option<bool>,
    pub shared_cache_latency_ms: Option<u64>,
    pub local_cache_items: usize,
    pub local_cache_capacity: usize,
    /// Ready to serve. A missing shared tier does not make the resolver
    /// unhealthy; an unreachable one does.
    pub healthy: bool,
}
