// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! S3 mapping document (L3, ground truth).
//!
//! One `GetObject` per fetch, body parsed as
//! `{"mappings": [{"tenant_id": ..., "shard_id": ...}]}`. Works against AWS S3
//! and S3-compatible services (MinIO, LocalStack) via a custom endpoint with
//! path-style addressing.

use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use tracing::debug;

use super::traits::{with_deadline, AuthoritativeStore, StorageError};
use crate::config::ResolverConfig;
use crate::tenant::{Mapping, MappingDocument};

/// Where the mapping document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
    pub region: String,
    /// Custom endpoint; implies path-style addressing
    pub endpoint: Option<String>,
}

impl S3Location {
    #[must_use]
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            bucket: config.store_bucket.clone(),
            key: config.store_key.clone(),
            region: config.store_region.clone(),
            endpoint: config.store_endpoint.clone(),
        }
    }
}

#[derive(Clone)]
pub struct S3MappingStore {
    client: aws_sdk_s3::Client,
    location: S3Location,
    timeout: Duration,
}

impl S3MappingStore {
    /// Build a client from the standard AWS credential chain (environment,
    /// shared credentials file, instance role).
    pub async fn new(location: S3Location, timeout: Duration) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(location.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if let Some(endpoint) = &location.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Self::from_client(client, location, timeout)
    }

    /// Use a pre-configured SDK client.
    #[must_use]
    pub fn from_client(client: aws_sdk_s3::Client, location: S3Location, timeout: Duration) -> Self {
        Self {
            client,
            location,
            timeout,
        }
    }

    #[must_use]
    pub fn location(&self) -> &S3Location {
        &self.location
    }

    async fn fetch_document(&self) -> Result<MappingDocument, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.location.bucket)
            .key(&self.location.key)
            .send()
            .await
            .map_err(|e| {
                StorageError::Backend(format!(
                    "S3 GetObject s3://{}/{} failed: {e}",
                    self.location.bucket, self.location.key
                ))
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(format!("failed to read S3 response body: {e}")))?
            .into_bytes();

        parse_document(&body)
    }
}

/// All-or-nothing parse of the mapping document body.
pub fn parse_document(body: &[u8]) -> Result<MappingDocument, StorageError> {
    MappingDocument::from_slice(body).map_err(|e| StorageError::Parse(e.to_string()))
}

#[async_trait]
impl AuthoritativeStore for S3MappingStore {
    async fn fetch_all(&self) -> Result<Vec<Mapping>, StorageError> {
        let doc = with_deadline("s3_get_object", self.timeout, self.fetch_document()).await?;
        debug!(
            bucket = %self.location.bucket,
            key = %self.location.key,
            mappings = doc.len(),
            "Fetched mapping document"
        );
        Ok(doc.mappings)
    }
}
