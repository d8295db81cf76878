//! Blob storage for uploaded image bytes
//!
//! Stores raw image bytes in S3-compatible object storage, keyed by image
//! identifier. The in-memory store backs tests and local runs.

pub mod client;
pub mod mock;

pub use client::S3BlobClient;
pub use mock::MockBlobStore;

use crate::id::ImageId;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub id: ImageId,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// The key was taken; nothing was written.
    AlreadyExists,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write-once put. Never overwrites an existing key.
    async fn put(&self, id: &ImageId, data: &[u8], content_type: &str) -> Result<PutOutcome>;
    async fn get(&self, id: &ImageId) -> Result<Option<Blob>>;
    /// Deleting a missing key succeeds.
    async fn delete(&self, id: &ImageId) -> Result<()>;
    /// Every stored blob whose key is a valid identifier.
    async fn list(&self) -> Result<Vec<BlobEntry>>;
}
