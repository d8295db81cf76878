use super::{InsertOutcome, MetadataStore};
use crate::id::ImageId;
use crate::models::ImageRecord;
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory metadata store with call counters and failure injection.
#[derive(Clone)]
pub struct MockMetadataStore {
    records: Arc<Mutex<HashMap<ImageId, ImageRecord>>>,
    call_count: Arc<Mutex<usize>>,
    fail_inserts: Arc<Mutex<bool>>,
    fail_queries: Arc<Mutex<bool>>,
    fail_deletes: Arc<Mutex<HashSet<ImageId>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    insert_delay: Arc<Mutex<Option<Duration>>>,
}

impl MockMetadataStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            call_count: Arc::new(Mutex::new(0)),
            fail_inserts: Arc::new(Mutex::new(false)),
            fail_queries: Arc::new(Mutex::new(false)),
            fail_deletes: Arc::new(Mutex::new(HashSet::new())),
            delay: Arc::new(Mutex::new(None)),
            insert_delay: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_record(self, record: ImageRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
        self
    }

    pub fn with_insert_failure(self, should_fail: bool) -> Self {
        *self.fail_inserts.lock().unwrap() = should_fail;
        self
    }

    pub fn with_query_failure(self, should_fail: bool) -> Self {
        *self.fail_queries.lock().unwrap() = should_fail;
        self
    }

    /// Every store call sleeps this long before doing anything.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Stall only `insert`, after the call has been counted.
    pub fn with_insert_delay(self, delay: Duration) -> Self {
        *self.insert_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn fail_delete_for(&self, id: &ImageId) {
        self.fail_deletes.lock().unwrap().insert(id.clone());
    }

    pub fn clear_delete_failures(&self) {
        self.fail_deletes.lock().unwrap().clear();
    }

    pub fn record(&self, id: &ImageId) -> Option<ImageRecord> {
        self.records.lock().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    async fn begin_call(&self) {
        *self.call_count.lock().unwrap() += 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_queries(&self) -> Result<()> {
        if *self.fail_queries.lock().unwrap() {
            return Err(Error::MetadataUnavailable("mock query failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MockMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for MockMetadataStore {
    async fn insert(&self, record: &ImageRecord) -> Result<InsertOutcome> {
        self.begin_call().await;
        let insert_delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = insert_delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_inserts.lock().unwrap() {
            return Err(Error::MetadataUnavailable("mock insert failure".to_string()));
        }

        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.id) {
            return Ok(InsertOutcome::Duplicate);
        }
        records.insert(record.id.clone(), record.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn query_live(&self, id: &ImageId, now: DateTime<Utc>) -> Result<Option<ImageRecord>> {
        self.begin_call().await;
        self.check_queries()?;

        Ok(self
            .records
            .lock()
            .unwrap()
            .get(id)
            .filter(|record| record.is_live(now))
            .cloned())
    }

    async fn query_expired(&self, now: DateTime<Utc>) -> Result<Vec<ImageId>> {
        self.begin_call().await;
        self.check_queries()?;

        let mut expired: Vec<ImageRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|record| !record.is_live(now))
            .cloned()
            .collect();
        expired.sort_by(|a, b| a.expires_at.cmp(&b.expires_at).then(a.id.cmp(&b.id)));
        Ok(expired.into_iter().map(|record| record.id).collect())
    }

    async fn delete(&self, id: &ImageId) -> Result<bool> {
        self.begin_call().await;

        if self.fail_deletes.lock().unwrap().contains(id) {
            return Err(Error::MetadataUnavailable(format!(
                "mock delete failure for {}",
                id
            )));
        }

        Ok(self.records.lock().unwrap().remove(id).is_some())
    }

    async fn contains(&self, id: &ImageId) -> Result<bool> {
        self.begin_call().await;
        self.check_queries()?;

        Ok(self.records.lock().unwrap().contains_key(id))
    }
}
