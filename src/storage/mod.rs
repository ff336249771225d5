// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tier clients.
//!
//! - [`traits`]: the [`SharedCache`](traits::SharedCache) and
//!   [`AuthoritativeStore`](traits::AuthoritativeStore) seams
//! - [`redis`]: Redis-backed shared cache
//! - [`s3`]: S3-backed mapping document
//! - [`memory`]: in-process implementations for tests and local runs

pub mod traits;
pub mod memory;
pub mod redis;
pub mod s3;

pub use self::memory::{InMemorySharedCache, StaticMappingStore};
pub use self::redis::RedisSharedCache;
pub use self::s3::S3MappingStore;
pub use self::traits::{AuthoritativeStore, SharedCache, StorageError};
