use super::ImageHost;
use crate::blob::Blob;
use crate::id::ImageId;
use crate::{Error, Result};
use tracing::warn;

impl ImageHost {
    /// Look up a live image by its public identifier.
    ///
    /// Expired, never-published and internally inconsistent images all come
    /// back as [`Error::NotFound`].
    pub async fn fetch(&self, raw_id: &str) -> Result<Blob> {
        let id = ImageId::parse(raw_id)?;
        let now = self.clock.now();

        let record = self
            .bounded(
                "metadata query",
                Error::MetadataUnavailable,
                self.metadata.query_live(&id, now),
            )
            .await?;
        if record.is_none() {
            return Err(Error::NotFound);
        }

        match self
            .bounded("blob get", Error::StorageUnavailable, self.blobs.get(&id))
            .await
        {
            Ok(Some(blob)) => Ok(blob),
            Ok(None) => {
                warn!("Live record {} has no blob", id);
                Err(Error::NotFound)
            }
            Err(e) => {
                warn!("Blob fetch for live record {} failed: {}", id, e);
                Err(Error::NotFound)
            }
        }
    }
}
