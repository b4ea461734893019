//! Blob storage behind a small async trait.
//!
//! [`ObjectStore`] is the `put`/`get`/`list` interface every stage talks to.
//! [`S3Store`] backs it with an S3-compatible service (MinIO in practice),
//! [`MemoryStore`] keeps everything in process for tests and dry runs.

mod location;
mod memory;
mod s3;

pub use location::StorageLocation;
pub use memory::MemoryStore;
pub use s3::S3Store;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("storage configuration error: {0}")]
    Configuration(String),
    #[error("storage sdk error: {0}")]
    Sdk(String),
}

impl StorageError {
    fn from_sdk(err: impl std::fmt::Display) -> Self {
        Self::Sdk(err.to_string())
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `bucket/key`. With `overwrite = false` an existing
    /// object is left alone and [`StorageError::AlreadyExists`] is returned.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: Bytes,
        overwrite: bool,
    ) -> Result<(), StorageError>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError>;

    /// Keys in `bucket` starting with `prefix`, sorted ascending.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Base URL used when handing locations from one stage to the next.
    fn endpoint(&self) -> String;
}
