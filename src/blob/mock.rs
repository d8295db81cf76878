use super::{Blob, BlobEntry, BlobStore, PutOutcome};
use crate::clock::{Clock, SystemClock};
use crate::id::ImageId;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredBlob {
    blob: Blob,
    stored_at: DateTime<Utc>,
}

/// In-memory blob store with call counters and failure injection.
#[derive(Clone)]
pub struct MockBlobStore {
    blobs: Arc<Mutex<HashMap<ImageId, StoredBlob>>>,
    clock: Arc<dyn Clock>,
    put_count: Arc<Mutex<usize>>,
    get_count: Arc<Mutex<usize>>,
    delete_count: Arc<Mutex<usize>>,
    list_count: Arc<Mutex<usize>>,
    fail_puts: Arc<Mutex<bool>>,
    fail_gets: Arc<Mutex<bool>>,
    fail_deletes: Arc<Mutex<HashSet<ImageId>>>,
    fail_all_deletes: Arc<Mutex<bool>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(SystemClock),
            put_count: Arc::new(Mutex::new(0)),
            get_count: Arc::new(Mutex::new(0)),
            delete_count: Arc::new(Mutex::new(0)),
            list_count: Arc::new(Mutex::new(0)),
            fail_puts: Arc::new(Mutex::new(false)),
            fail_gets: Arc::new(Mutex::new(false)),
            fail_deletes: Arc::new(Mutex::new(HashSet::new())),
            fail_all_deletes: Arc::new(Mutex::new(false)),
            delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Stamp stored blobs with `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_blob(self, id: &ImageId, bytes: Vec<u8>, content_type: &str) -> Self {
        let stored_at = self.clock.now();
        self.blobs.lock().unwrap().insert(
            id.clone(),
            StoredBlob {
                blob: Blob {
                    bytes,
                    content_type: content_type.to_string(),
                },
                stored_at,
            },
        );
        self
    }

    pub fn with_put_failure(self, should_fail: bool) -> Self {
        *self.fail_puts.lock().unwrap() = should_fail;
        self
    }

    pub fn with_get_failure(self, should_fail: bool) -> Self {
        *self.fail_gets.lock().unwrap() = should_fail;
        self
    }

    /// Every store call sleeps this long before doing anything.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn set_delete_failure(&self, should_fail: bool) {
        *self.fail_all_deletes.lock().unwrap() = should_fail;
    }

    pub fn fail_delete_for(&self, id: &ImageId) {
        self.fail_deletes.lock().unwrap().insert(id.clone());
    }

    pub fn clear_delete_failures(&self) {
        self.fail_deletes.lock().unwrap().clear();
        *self.fail_all_deletes.lock().unwrap() = false;
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.blobs.lock().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_put_count(&self) -> usize {
        *self.put_count.lock().unwrap()
    }

    pub fn get_get_count(&self) -> usize {
        *self.get_count.lock().unwrap()
    }

    pub fn get_delete_count(&self) -> usize {
        *self.delete_count.lock().unwrap()
    }

    pub fn get_list_count(&self) -> usize {
        *self.list_count.lock().unwrap()
    }

    /// Total calls of any kind.
    pub fn get_call_count(&self) -> usize {
        self.get_put_count() + self.get_get_count() + self.get_delete_count() + self.get_list_count()
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn put(&self, id: &ImageId, data: &[u8], content_type: &str) -> Result<PutOutcome> {
        *self.put_count.lock().unwrap() += 1;
        self.maybe_delay().await;

        if *self.fail_puts.lock().unwrap() {
            return Err(Error::StorageUnavailable("mock put failure".to_string()));
        }

        let stored_at = self.clock.now();
        let mut blobs = self.blobs.lock().unwrap();
        if blobs.contains_key(id) {
            return Ok(PutOutcome::AlreadyExists);
        }
        blobs.insert(
            id.clone(),
            StoredBlob {
                blob: Blob {
                    bytes: data.to_vec(),
                    content_type: content_type.to_string(),
                },
                stored_at,
            },
        );
        Ok(PutOutcome::Stored)
    }

    async fn get(&self, id: &ImageId) -> Result<Option<Blob>> {
        *self.get_count.lock().unwrap() += 1;
        self.maybe_delay().await;

        if *self.fail_gets.lock().unwrap() {
            return Err(Error::StorageUnavailable("mock get failure".to_string()));
        }

        Ok(self
            .blobs
            .lock()
            .unwrap()
            .get(id)
            .map(|stored| stored.blob.clone()))
    }

    async fn delete(&self, id: &ImageId) -> Result<()> {
        *self.delete_count.lock().unwrap() += 1;
        self.maybe_delay().await;

        if *self.fail_all_deletes.lock().unwrap() || self.fail_deletes.lock().unwrap().contains(id)
        {
            return Err(Error::StorageUnavailable(format!(
                "mock delete failure for {}",
                id
            )));
        }

        self.blobs.lock().unwrap().remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<BlobEntry>> {
        *self.list_count.lock().unwrap() += 1;
        self.maybe_delay().await;

        let mut entries: Vec<BlobEntry> = self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .map(|(id, stored)| BlobEntry {
                id: id.clone(),
                last_modified: stored.stored_at,
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}
