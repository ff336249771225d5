// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tenant and shard identifiers, the mapping document, and tenant extraction.
//!
//! [`TenantId`] and [`ShardId`] are non-empty by construction. The empty string
//! is reserved for "no mapping", so an empty shard can never reach a cache tier.
//!
//! # Example
//!
//! ```
//! use shard_router::{MappingDocument, TenantId};
//!
//! let doc = MappingDocument::from_slice(br#"{"mappings": [
//!     {"tenant_id": "tenant1", "shard_id": "shard-a"},
//!     {"tenant_id": "acme", "shard_id": "shard-c"}
//! ]}"#).unwrap();
//!
//! let tenant = TenantId::parse("acme").unwrap();
//! assert_eq!(doc.lookup(&tenant).unwrap().as_str(), "shard-c");
//! ```

use std::fmt;

use http::header::HOST;
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExtractionMode;

/// Opaque, non-empty tenant identifier.
///
/// No case folding or trimming is applied; callers own normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TenantId(String);

impl TenantId {
    /// Validate a tenant identifier. Returns `None` for the empty string.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque, non-empty shard identifier (the routing target).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(String);

impl ShardId {
    /// Validate a shard identifier. The empty string means "no mapping" and
    /// is rejected.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    /// Like [`parse`](Self::parse) but takes ownership of the buffer.
    #[must_use]
    pub fn from_string(raw: String) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ShardId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One row of the authoritative table, exactly as it appears on the wire.
///
/// Fields are raw strings: the document may legally contain rows with empty
/// values, which simply never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub tenant_id: String,
    pub shard_id: String,
}

impl Mapping {
    pub fn new(tenant_id: impl Into<String>, shard_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            shard_id: shard_id.into(),
        }
    }
}

/// The authoritative mapping document: `{"mappings": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    pub mappings: Vec<Mapping>,
}

impl MappingDocument {
    /// Parse the JSON document. Any malformed input is an error; there is no
    /// partial result.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// First-match lookup in document order.
    ///
    /// If the first row for `tenant` carries an empty shard, the tenant is
    /// treated as unmapped; later duplicates are never consulted.
    #[must_use]
    pub fn lookup(&self, tenant: &TenantId) -> Option<ShardId> {
        lookup(&self.mappings, tenant)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

/// Linear first-match search over a fetched table.
#[must_use]
pub fn lookup(mappings: &[Mapping], tenant: &TenantId) -> Option<ShardId> {
    mappings
        .iter()
        .find(|m| m.tenant_id == tenant.as_str())
        .and_then(|m| ShardId::parse(&m.shard_id))
}

/// Why a tenant could not be identified from request headers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("header '{0}' not present")]
    MissingHeader(String),
    #[error("header '{0}' is not valid UTF-8")]
    InvalidHeader(String),
    #[error("unable to extract tenant from host: {0}")]
    NoSubdomain(String),
    #[error("header '{0}' is empty")]
    Empty(String),
}

/// Identify the tenant of a request.
///
/// - [`ExtractionMode::Subdomain`]: `tenant.example.com[:port]` yields `tenant`.
///   At least two labels are required.
/// - [`ExtractionMode::Header`]: the value of `header_name`.
pub fn extract_tenant(
    mode: ExtractionMode,
    header_name: &str,
    headers: &HeaderMap,
) -> Result<TenantId, ExtractError> {
    match mode {
        ExtractionMode::Subdomain => {
            let host = header_str(headers, HOST.as_str())?;
            tenant_from_host(host)
        }
        ExtractionMode::Header => {
            let value = header_str(headers, header_name)?;
            TenantId::parse(value).ok_or_else(|| ExtractError::Empty(header_name.to_string()))
        }
    }
}

/// Subdomain rule on a raw `host[:port]` value.
pub fn tenant_from_host(host: &str) -> Result<TenantId, ExtractError> {
    let mut labels = host.split('.');
    let first = labels.next().unwrap_or_default();
    if labels.next().is_none() {
        return Err(ExtractError::NoSubdomain(host.to_string()));
    }
    let label = first.split(':').next().unwrap_or_default();
    TenantId::parse(label).ok_or_else(|| ExtractError::NoSubdomain(host.to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ExtractError> {
    let value = headers
        .get(name)
        .ok_or_else(|| ExtractError::MissingHeader(name.to_string()))?;
    value
        .to_str()
        .map_err(|_| ExtractError::InvalidHeader(name.to_string()))
}
