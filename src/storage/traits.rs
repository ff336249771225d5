// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::tenant::{Mapping, ShardId, TenantId};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Malformed mapping document: {0}")]
    Parse(String),
    #[error("circuit breaker '{0}' open, request rejected")]
    CircuitOpen(&'static str),
}

impl StorageError {
    /// Stable label for metrics and host-facing error kinds.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Backend(_) => "backend",
            Self::Parse(_) => "parse",
            Self::CircuitOpen(_) => "circuit_open",
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Run `fut` under a deadline, mapping expiry to [`StorageError::Timeout`].
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, StorageError>
where
    F: std::future::Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout { operation, after }),
    }
}

/// Distributed TTL cache shared by every resolver instance (L2).
///
/// `Ok(None)` is a miss (absent or expired) and is distinct from `Err`, which
/// means the tier itself is unhealthy. Implementations bound every call by
/// their configured timeout.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, tenant: &TenantId) -> Result<Option<ShardId>, StorageError>;
    async fn set(&self, tenant: &TenantId, shard: &ShardId, ttl: Duration) -> Result<(), StorageError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Read-only source of truth for the tenant table (L3).
///
/// Every call re-fetches the whole document. A failed fetch or parse yields
/// an error and never a partial table.
#[async_trait]
pub trait AuthoritativeStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Mapping>, StorageError>;
}
