//! Data models
//!
//! The image record kept by the metadata store and the report produced by
//! an expiry sweep.

use crate::id::ImageId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Expiry saturates at the latest representable instant.
    pub fn new(id: ImageId, now: DateTime<Utc>, retention: Duration) -> Self {
        Self {
            id,
            created_at: now,
            expires_at: now
                .checked_add_signed(retention)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Live strictly before `expires_at`; expired from that instant on.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStage {
    /// Deleting the blob failed; the record was kept so the item is retried.
    Blob,
    /// The blob is gone but the record could not be removed.
    Record,
    /// Reclaiming a blob with no record failed.
    Orphan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub id: ImageId,
    pub stage: SweepStage,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Expired items whose blob and record are both gone.
    pub purged: usize,
    pub orphans_reclaimed: usize,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
