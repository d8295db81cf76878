use super::{CompensationGuard, ImageHost};
use crate::blob::PutOutcome;
use crate::id::ImageId;
use crate::metadata::InsertOutcome;
use crate::models::ImageRecord;
use crate::sniff::sniff;
use crate::{Error, Result};
use tracing::{info, warn};

/// Fresh identifiers tried before giving up on a publish.
pub const MAX_ID_ATTEMPTS: usize = 5;

impl ImageHost {
    /// Store `bytes` as a new image and return its public identifier.
    ///
    /// The blob is written first and the record second. If the record insert
    /// fails, the blob is deleted again before the error is returned, so a
    /// failed publish never leaves a reachable image behind.
    pub async fn publish(&self, bytes: &[u8]) -> Result<ImageId> {
        let format = sniff(bytes).ok_or(Error::InvalidContent)?;
        let content_type = format.content_type();

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = self.ids.generate();

            let taken = self
                .bounded(
                    "metadata lookup",
                    Error::MetadataUnavailable,
                    self.metadata.contains(&id),
                )
                .await?;
            if taken {
                warn!("Identifier {} already recorded, retrying (attempt {})", id, attempt);
                continue;
            }

            let stored = self
                .bounded(
                    "blob put",
                    Error::StorageUnavailable,
                    self.blobs.put(&id, bytes, content_type),
                )
                .await?;
            if stored == PutOutcome::AlreadyExists {
                warn!("Blob key {} already taken, retrying (attempt {})", id, attempt);
                continue;
            }

            let guard = CompensationGuard::arm(
                self.blobs.clone(),
                id.clone(),
                self.config.store_timeout,
            );
            let record = ImageRecord::new(id.clone(), self.clock.now(), self.config.retention);

            match self
                .bounded(
                    "metadata insert",
                    Error::MetadataUnavailable,
                    self.metadata.insert(&record),
                )
                .await
            {
                Ok(InsertOutcome::Inserted) => {
                    guard.disarm();
                    info!(
                        "Published {} ({}, {} bytes), expires {}",
                        id,
                        format,
                        bytes.len(),
                        record.expires_at
                    );
                    return Ok(id);
                }
                Ok(InsertOutcome::Duplicate) => {
                    // Our put created the blob, so it is ours to remove
                    warn!("Identifier {} raced another publish, retrying", id);
                    guard.compensate().await;
                }
                Err(e) => {
                    warn!("Record insert for {} failed: {}", id, e);
                    guard.compensate().await;
                    return Err(e);
                }
            }
        }

        Err(Error::IdentifierExhausted(MAX_ID_ATTEMPTS))
    }
}
