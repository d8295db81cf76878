use super::ImageHost;
use crate::models::{SweepFailure, SweepReport, SweepStage};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

impl ImageHost {
    /// Purge every expired image from both stores.
    ///
    /// Items are independent: a failure on one is recorded in the report and
    /// the sweep moves on. Only failing to list the expired batch is fatal.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let span = info_span!("sweep", sweep_id = %Uuid::new_v4());
        self.run_sweep().instrument(span).await
    }

    async fn run_sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let batch = self
            .bounded(
                "expired query",
                Error::MetadataUnavailable,
                self.metadata.query_expired(now),
            )
            .await?;
        info!("Sweeping {} expired images", batch.len());

        let mut report = SweepReport::default();

        for id in batch {
            // Blob first: if the record went first, a failed blob delete
            // would leave an orphan nothing points at.
            if let Err(e) = self
                .bounded("blob delete", Error::StorageUnavailable, self.blobs.delete(&id))
                .await
            {
                warn!("Failed to delete blob {}: {}", id, e);
                report.failures.push(SweepFailure {
                    id,
                    stage: SweepStage::Blob,
                    error: e.to_string(),
                });
                continue;
            }

            match self
                .bounded(
                    "record delete",
                    Error::MetadataUnavailable,
                    self.metadata.delete(&id),
                )
                .await
            {
                Ok(_) => {
                    info!("Purged {}", id);
                    report.purged += 1;
                }
                Err(e) => {
                    warn!("Failed to delete record {}: {}", id, e);
                    report.failures.push(SweepFailure {
                        id,
                        stage: SweepStage::Record,
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.config.reclaim_orphans {
            self.reclaim_orphans(now, &mut report).await;
        }

        info!(
            "Sweep finished: {} purged, {} orphans reclaimed, {} failures",
            report.purged,
            report.orphans_reclaimed,
            report.failures.len()
        );
        Ok(report)
    }

    async fn reclaim_orphans(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let entries = match self
            .bounded("blob listing", Error::StorageUnavailable, self.blobs.list())
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping orphan reconciliation: {}", e);
                return;
            }
        };

        // A negative grace would put the cutoff in the future
        let grace = self.config.orphan_grace.max(chrono::Duration::zero());
        let Some(cutoff) = now.checked_sub_signed(grace) else {
            return;
        };

        for entry in entries.into_iter().filter(|e| e.last_modified < cutoff) {
            match self
                .bounded(
                    "metadata lookup",
                    Error::MetadataUnavailable,
                    self.metadata.contains(&entry.id),
                )
                .await
            {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    warn!("Could not check blob {} for a record: {}", entry.id, e);
                    continue;
                }
            }

            match self
                .bounded(
                    "orphan delete",
                    Error::StorageUnavailable,
                    self.blobs.delete(&entry.id),
                )
                .await
            {
                Ok(()) => {
                    info!("Reclaimed orphan blob {}", entry.id);
                    report.orphans_reclaimed += 1;
                }
                Err(e) => {
                    warn!("Failed to reclaim orphan blob {}: {}", entry.id, e);
                    report.failures.push(SweepFailure {
                        id: entry.id,
                        stage: SweepStage::Orphan,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Spawn a background task that sweeps every `interval`.
///
/// The first sweep runs one full interval after startup. Returns a
/// `JoinHandle` that can be aborted on shutdown.
pub fn spawn_sweeper(host: Arc<ImageHost>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        timer.tick().await;

        loop {
            timer.tick().await;
            match host.sweep().await {
                Ok(report) if report.is_clean() => {}
                Ok(report) => warn!(
                    "Sweep left {} items for the next run",
                    report.failures.len()
                ),
                Err(e) => warn!("Sweep failed: {}", e),
            }
        }
    })
}
