//! Image lifecycle: publish, fetch and expiry sweep
//!
//! [`ImageHost`] ties the content sniffer, identifier generator and both
//! stores together. Store handles are injected through [`HostServices`], so
//! the same host runs against PostgreSQL/S3 in production and in-memory
//! stores in tests.

mod publish;
mod resolve;
mod sweep;

pub use publish::MAX_ID_ATTEMPTS;
pub use sweep::spawn_sweeper;

use crate::blob::{BlobStore, MockBlobStore, S3BlobClient};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::id::{IdGenerator, ImageId, RandomIdGenerator};
use crate::metadata::{MetadataStore, MockMetadataStore, PostgresMetadataClient};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Policy knobs for the lifecycle. Defaults match production.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub retention: chrono::Duration,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    pub reclaim_orphans: bool,
    /// Blobs younger than this are never treated as orphans, since they may
    /// belong to an upload that has not inserted its record yet.
    pub orphan_grace: chrono::Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::days(10),
            store_timeout: Duration::from_secs(10),
            reclaim_orphans: true,
            orphan_grace: chrono::Duration::hours(1),
        }
    }
}

/// Injectable service bundle used to construct [`ImageHost`].
pub struct HostServices {
    pub blobs: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub ids: Box<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
}

pub struct ImageHost {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl ImageHost {
    pub fn with_services(services: HostServices, config: LifecycleConfig) -> Self {
        Self {
            blobs: services.blobs,
            metadata: services.metadata,
            ids: services.ids,
            clock: services.clock,
            config,
        }
    }

    /// Construct a host from environment configuration (`Config::from_env`).
    ///
    /// With `IN_MEMORY` set, both stores are process-local and vanish on exit.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (blobs, metadata) = if config.in_memory {
            info!("IN_MEMORY enabled, images will not survive a restart");
            (
                Arc::new(MockBlobStore::new()) as Arc<dyn BlobStore>,
                Arc::new(MockMetadataStore::new()) as Arc<dyn MetadataStore>,
            )
        } else {
            let missing = |name: &str| Error::Config(format!("{} not set", name));
            let blob = &config.blob;
            let blobs = S3BlobClient::new(
                blob.access_key_id
                    .clone()
                    .ok_or_else(|| missing("BLOB_ACCESS_KEY_ID"))?,
                blob.secret_access_key
                    .clone()
                    .ok_or_else(|| missing("BLOB_SECRET_ACCESS_KEY"))?,
                blob.endpoint.clone(),
                blob.region.clone(),
                blob.bucket.clone(),
                blob.key_prefix.clone(),
            )
            .await?;
            info!("Blob store: bucket {} at {}", blob.bucket, blob.endpoint);

            let metadata = PostgresMetadataClient::connect(config.postgres()?).await?;
            (
                Arc::new(blobs) as Arc<dyn BlobStore>,
                Arc::new(metadata) as Arc<dyn MetadataStore>,
            )
        };

        Ok(Self::with_services(
            HostServices {
                blobs,
                metadata,
                ids: Box::new(RandomIdGenerator),
                clock: Arc::new(SystemClock),
            },
            config.lifecycle.clone(),
        ))
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Run one store call under the configured timeout. Expiry of the timer
    /// is reported through `unavailable`, the error kind of that store.
    async fn bounded<T, F>(&self, op: &str, unavailable: fn(String) -> Error, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        bounded(self.config.store_timeout, op, unavailable, call).await
    }
}

async fn bounded<T, F>(
    timeout: Duration,
    op: &str,
    unavailable: fn(String) -> Error,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(unavailable(format!("{} timed out after {:?}", op, timeout))),
    }
}

/// Best-effort removal of a blob whose record never made it. A failure
/// leaves an orphan for the sweeper to reclaim.
async fn compensating_delete(blobs: Arc<dyn BlobStore>, id: ImageId, timeout: Duration) -> bool {
    match bounded(
        timeout,
        "compensating blob delete",
        Error::StorageUnavailable,
        blobs.delete(&id),
    )
    .await
    {
        Ok(()) => {
            info!("Compensating delete removed blob {}", id);
            true
        }
        Err(e) => {
            warn!("Compensating delete for {} failed, blob orphaned: {}", id, e);
            false
        }
    }
}

/// Armed between a successful blob write and the record insert. If the
/// publish future is dropped in that window the delete is spawned instead.
struct CompensationGuard {
    blobs: Option<Arc<dyn BlobStore>>,
    id: ImageId,
    timeout: Duration,
}

impl CompensationGuard {
    fn arm(blobs: Arc<dyn BlobStore>, id: ImageId, timeout: Duration) -> Self {
        Self {
            blobs: Some(blobs),
            id,
            timeout,
        }
    }

    fn disarm(mut self) {
        self.blobs = None;
    }

    async fn compensate(mut self) -> bool {
        match self.blobs.take() {
            Some(blobs) => compensating_delete(blobs, self.id.clone(), self.timeout).await,
            None => true,
        }
    }
}

impl Drop for CompensationGuard {
    fn drop(&mut self) {
        let Some(blobs) = self.blobs.take() else {
            return;
        };
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Publish of {} abandoned mid-flight, compensating", id);
                handle.spawn(compensating_delete(blobs, id, self.timeout));
            }
            Err(_) => warn!("Publish of {} abandoned without a runtime, blob orphaned", id),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::blob::MockBlobStore;
    use crate::clock::FixedClock;
    use crate::id::ScriptedIdGenerator;
    use crate::metadata::MockMetadataStore;
    use chrono::{DateTime, TimeZone, Utc};

    pub(crate) fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    pub(crate) struct Harness {
        pub host: ImageHost,
        pub blobs: MockBlobStore,
        pub metadata: MockMetadataStore,
        pub clock: FixedClock,
    }

    pub(crate) fn harness_with(
        blobs: MockBlobStore,
        metadata: MockMetadataStore,
        ids: ScriptedIdGenerator,
        config: LifecycleConfig,
    ) -> Harness {
        let clock = FixedClock::new(start());
        let blobs = blobs.with_clock(Arc::new(clock.clone()));
        let host = ImageHost::with_services(
            HostServices {
                blobs: Arc::new(blobs.clone()),
                metadata: Arc::new(metadata.clone()),
                ids: Box::new(ids),
                clock: Arc::new(clock.clone()),
            },
            config,
        );
        Harness {
            host,
            blobs,
            metadata,
            clock,
        }
    }

    pub(crate) fn harness() -> Harness {
        harness_with(
            MockBlobStore::new(),
            MockMetadataStore::new(),
            ScriptedIdGenerator::new(),
            LifecycleConfig::default(),
        )
    }

    pub(crate) const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
    pub(crate) const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
}
