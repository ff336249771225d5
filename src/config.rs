// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the shard router.
//!
//! Only the mapping document location (`store_bucket` + `store_key`) is
//! required; everything else has a default.
//!
//! # Example
//!
//! ```
//! use shard_router::{ResolverConfig, ExtractionMode};
//!
//! let config = ResolverConfig::from_json(r#"{
//!     "store_bucket": "routing",
//!     "store_key": "tenants.json",
//!     "local_cache_capacity": 5000
//! }"#).unwrap();
//!
//! assert_eq!(config.local_cache_capacity, 5000);
//! assert_eq!(config.shared_cache_ttl_secs, 300);
//! assert_eq!(config.tenant_extraction_mode, ExtractionMode::Subdomain);
//!
//! // Missing store location is rejected
//! assert!(ResolverConfig::from_json("{}").is_err());
//! ```

use std::fmt;
use std::time::Duration;

use http::HeaderName;
use serde::Deserialize;
use thiserror::Error;

/// How the host identifies the tenant of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// First label of the `Host` header (`acme.example.com` -> `acme`)
    #[default]
    Subdomain,
    /// Value of a named request header
    Header,
}

impl ExtractionMode {
    /// Parse the wire name (`subdomain` | `header`).
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "subdomain" => Ok(Self::Subdomain),
            "header" => Ok(Self::Header),
            other => Err(ConfigError::Invalid {
                field: "tenant_extraction_mode",
                reason: format!("unsupported tenant extraction mode: {other}"),
            }),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subdomain => write!(f, "subdomain"),
            Self::Header => write!(f, "header"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field: {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Resolver settings.
///
/// Built once at startup and shared read-only by every resolution; the
/// resolver keeps it behind an `Arc` and never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolverConfig {
    /// Bucket holding the mapping document (required)
    #[serde(default)]
    pub store_bucket: String,

    /// Object key of the mapping document (required)
    #[serde(default)]
    pub store_key: String,

    #[serde(default = "default_store_region")]
    pub store_region: String,

    /// Custom S3-compatible endpoint (e.g. MinIO). Enables path-style addressing.
    #[serde(default)]
    pub store_endpoint: Option<String>,

    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Redis `host:port`
    #[serde(default = "default_shared_cache_addr")]
    pub shared_cache_addr: String,

    #[serde(default)]
    pub shared_cache_password: Option<String>,

    #[serde(default)]
    pub shared_cache_db: i64,

    /// Prepended to every shared-cache key
    #[serde(default = "default_shared_cache_key_prefix")]
    pub shared_cache_key_prefix: String,

    #[serde(default = "default_shared_cache_ttl_secs")]
    pub shared_cache_ttl_secs: u64,

    #[serde(default = "default_shared_cache_timeout_ms")]
    pub shared_cache_timeout_ms: u64,

    /// Max entries in the in-process LRU
    #[serde(default = "default_local_cache_capacity")]
    pub local_cache_capacity: usize,

    #[serde(default)]
    pub tenant_extraction_mode: ExtractionMode,

    #[serde(default = "default_tenant_header_name")]
    pub tenant_header_name: String,

    /// Routing hint header set on responses (and checked on requests)
    #[serde(default = "default_shard_header_name")]
    pub shard_header_name: String,
}

fn default_store_region() -> String { "us-east-1".to_string() }
fn default_store_timeout_ms() -> u64 { 5_000 }
fn default_shared_cache_addr() -> String { "127.0.0.1:6379".to_string() }
fn default_shared_cache_key_prefix() -> String { "shard_router:".to_string() }
fn default_shared_cache_ttl_secs() -> u64 { 300 } // 5 minutes

/// Upper bound on `shared_cache_ttl_secs` (one year).
pub const MAX_SHARED_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;
fn default_shared_cache_timeout_ms() -> u64 { 2_000 }
fn default_local_cache_capacity() -> usize { 1_000 }
fn default_tenant_header_name() -> String { "X-Tenant-ID".to_string() }
fn default_shard_header_name() -> String { "X-SHARD-ID".to_string() }

impl Default for ResolverConfig {
    /// Defaults for every optional field. The store location is left empty,
    /// so this alone does not pass [`validate`](Self::validate).
    fn default() -> Self {
        Self {
            store_bucket: String::new(),
            store_key: String::new(),
            store_region: default_store_region(),
            store_endpoint: None,
            store_timeout_ms: default_store_timeout_ms(),
            shared_cache_addr: default_shared_cache_addr(),
            shared_cache_password: None,
            shared_cache_db: 0,
            shared_cache_key_prefix: default_shared_cache_key_prefix(),
            shared_cache_ttl_secs: default_shared_cache_ttl_secs(),
            shared_cache_timeout_ms: default_shared_cache_timeout_ms(),
            local_cache_capacity: default_local_cache_capacity(),
            tenant_extraction_mode: ExtractionMode::default(),
            tenant_header_name: default_tenant_header_name(),
            shard_header_name: default_shard_header_name(),
        }
    }
}

impl ResolverConfig {
    /// Defaults plus the required store location, validated.
    pub fn new(
        store_bucket: impl Into<String>,
        store_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            store_bucket: store_bucket.into(),
            store_key: store_key.into(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON settings object and validate it.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field. Called by all constructors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_bucket.is_empty() {
            return Err(ConfigError::Missing("store_bucket"));
        }
        if self.store_key.is_empty() {
            return Err(ConfigError::Missing("store_key"));
        }
        if self.shared_cache_addr.is_empty() {
            return Err(ConfigError::Missing("shared_cache_addr"));
        }
        non_zero("store_timeout_ms", self.store_timeout_ms)?;
        non_zero("shared_cache_ttl_secs", self.shared_cache_ttl_secs)?;
        if self.shared_cache_ttl_secs > MAX_SHARED_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid {
                field: "shared_cache_ttl_secs",
                reason: format!(
                    "must be at most {MAX_SHARED_CACHE_TTL_SECS}, got {}",
                    self.shared_cache_ttl_secs
                ),
            });
        }
        non_zero("shared_cache_timeout_ms", self.shared_cache_timeout_ms)?;
        if self.local_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "local_cache_capacity",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.shared_cache_db < 0 {
            return Err(ConfigError::Invalid {
                field: "shared_cache_db",
                reason: format!("must not be negative, got {}", self.shared_cache_db),
            });
        }
        header_name("tenant_header_name", &self.tenant_header_name)?;
        header_name("shard_header_name", &self.shard_header_name)?;
        Ok(())
    }

    /// Layer `overrides` on top of this config, returning a new validated
    /// config. `self` is left untouched.
    pub fn merge(&self, overrides: &ResolverConfigOverrides) -> Result<Self, ConfigError> {
        let mut merged = self.clone();
        overrides.apply_to(&mut merged);
        merged.validate()?;
        Ok(merged)
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    #[must_use]
    pub fn shared_cache_timeout(&self) -> Duration {
        Duration::from_millis(self.shared_cache_timeout_ms)
    }

    #[must_use]
    pub fn shared_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.shared_cache_ttl_secs)
    }

    /// `redis://[:password@]addr/db`, with the password percent-encoded.
    pub fn shared_cache_url(&self) -> Result<String, ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            field: "shared_cache_addr",
            reason,
        };
        let mut url = url::Url::parse(&format!(
            "redis://{}/{}",
            self.shared_cache_addr, self.shared_cache_db
        ))
        .map_err(|e| invalid(e.to_string()))?;
        if let Some(password) = self.shared_cache_password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|()| invalid("address cannot carry credentials".to_string()))?;
        }
        Ok(url.to_string())
    }
}

fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        })
    } else {
        Ok(())
    }
}

fn header_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    HeaderName::from_bytes(value.as_bytes())
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            field,
            reason: format!("'{value}' is not a valid header name: {e}"),
        })
}

/// Partial configuration: every field optional.
///
/// Set fields replace the parent's values in [`ResolverConfig::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResolverConfigOverrides {
    pub store_bucket: Option<String>,
    pub store_key: Option<String>,
    pub store_region: Option<String>,
    pub store_endpoint: Option<String>,
    pub store_timeout_ms: Option<u64>,
    pub shared_cache_addr: Option<String>,
    pub shared_cache_password: Option<String>,
    pub shared_cache_db: Option<i64>,
    pub shared_cache_key_prefix: Option<String>,
    pub shared_cache_ttl_secs: Option<u64>,
    pub shared_cache_timeout_ms: Option<u64>,
    pub local_cache_capacity: Option<usize>,
    pub tenant_extraction_mode: Option<ExtractionMode>,
    pub tenant_header_name: Option<String>,
    pub shard_header_name: Option<String>,
}

/// Environment variable prefix read by [`ResolverConfigOverrides::from_env`].
pub const ENV_PREFIX: &str = "SHARD_ROUTER_";

impl ResolverConfigOverrides {
    /// Read `SHARD_ROUTER_<FIELD>` variables (e.g. `SHARD_ROUTER_STORE_BUCKET`).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| lookup(&format!("{ENV_PREFIX}{}", field.to_ascii_uppercase()));

        Ok(Self {
            store_bucket: get("store_bucket"),
            store_key: get("store_key"),
            store_region: get("store_region"),
            store_endpoint: get("store_endpoint"),
            store_timeout_ms: parse_num("store_timeout_ms", get("store_timeout_ms"))?,
            shared_cache_addr: get("shared_cache_addr"),
            shared_cache_password: get("shared_cache_password"),
            shared_cache_db: parse_num("shared_cache_db", get("shared_cache_db"))?,
            shared_cache_key_prefix: get("shared_cache_key_prefix"),
            shared_cache_ttl_secs: parse_num("shared_cache_ttl_secs", get("shared_cache_ttl_secs"))?,
            shared_cache_timeout_ms: parse_num(
                "shared_cache_timeout_ms",
                get("shared_cache_timeout_ms"),
            )?,
            local_cache_capacity: parse_num("local_cache_capacity", get("local_cache_capacity"))?,
            tenant_extraction_mode: get("tenant_extraction_mode")
                .map(|raw| ExtractionMode::parse(&raw))
                .transpose()?,
            tenant_header_name: get("tenant_header_name"),
            shard_header_name: get("shard_header_name"),
        })
    }

    fn apply_to(&self, config: &mut ResolverConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut config.store_bucket, &self.store_bucket);
        set(&mut config.store_key, &self.store_key);
        set(&mut config.store_region, &self.store_region);
        if self.store_endpoint.is_some() {
            config.store_endpoint = self.store_endpoint.clone();
        }
        set(&mut config.store_timeout_ms, &self.store_timeout_ms);
        set(&mut config.shared_cache_addr, &self.shared_cache_addr);
        if self.shared_cache_password.is_some() {
            config.shared_cache_password = self.shared_cache_password.clone();
        }
        set(&mut config.shared_cache_db, &self.shared_cache_db);
        set(&mut config.shared_cache_key_prefix, &self.shared_cache_key_prefix);
        set(&mut config.shared_cache_ttl_secs, &self.shared_cache_ttl_secs);
        set(&mut config.shared_cache_timeout_ms, &self.shared_cache_timeout_ms);
        set(&mut config.local_cache_capacity, &self.local_cache_capacity);
        set(&mut config.tenant_extraction_mode, &self.tenant_extraction_mode);
        set(&mut config.tenant_header_name, &self.tenant_header_name);
        set(&mut config.shard_header_name, &self.shard_header_name);
    }
}

fn parse_num<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    raw.map(|s| {
        s.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            field,
            reason: format!("'{s}': {e}"),
        })
    })
    .transpose()
}
