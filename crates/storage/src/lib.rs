//! The Blob Gateway: put/get/sign against object storage.
//!
//! Uploaded originals and converted results live in separate buckets,
//! selected by [`BlobKind`]. Keys are opaque and generated by callers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

pub mod config;
mod memory;
mod s3;

pub use config::StorageConfig;
pub use memory::{MemoryBlobGateway, StoredObject};
pub use s3::S3Gateway;

/// Which bucket a blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobKind {
    Upload,
    Converted,
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("object '{key}' not found in {kind:?} bucket")]
    NotFound { kind: BlobKind, key: String },

    #[error("blob store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to sign URL: {0}")]
    Signing(String),
}

/// A time-limited retrieval URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlobGateway: Send + Sync {
    async fn put(
        &self,
        kind: BlobKind,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BlobError>;

    /// Fetch an object. A missing object is [`BlobError::NotFound`].
    async fn get(&self, kind: BlobKind, key: &str) -> Result<Bytes, BlobError>;

    /// Sign a GET URL valid for `ttl`. The object is not checked.
    async fn sign(&self, kind: BlobKind, key: &str, ttl: Duration)
        -> Result<SignedUrl, BlobError>;

    /// Create the upload and converted buckets if they do not exist.
    async fn ensure_buckets(&self) -> Result<(), BlobError>;
}

pub(crate) fn expiry(ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
