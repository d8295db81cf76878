//! Metadata storage for image lifecycle records
//!
//! One record per published image, keyed by identifier, carrying its expiry.
//! PostgreSQL in production; the in-memory store backs tests and local runs.

pub mod client;
pub mod mock;

pub use client::{PostgresConfig, PostgresMetadataClient};
pub use mock::MockMetadataStore;

use crate::id::ImageId;
use crate::models::ImageRecord;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with this identifier already exists; nothing was written.
    Duplicate,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, record: &ImageRecord) -> Result<InsertOutcome>;
    /// The record for `id` if it is still live at `now`.
    async fn query_live(&self, id: &ImageId, now: DateTime<Utc>) -> Result<Option<ImageRecord>>;
    /// Identifiers of every record expired at `now`, oldest first.
    async fn query_expired(&self, now: DateTime<Utc>) -> Result<Vec<ImageId>>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: &ImageId) -> Result<bool>;
    /// Whether any record, live or expired, exists for `id`.
    async fn contains(&self, id: &ImageId) -> Result<bool>;
}
