//! In-memory record store.
//!
//! Backs local runs and the integration test suites. Versioning and
//! conflict behavior match the port contract so engine code exercised
//! against this store behaves the same against a real API server.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::{ChangeKind, RecordStore, StoreError, WatchEvent};
use crate::model::{ClusterRecord, ClusterStatus, ResourceId};

/// Thread-safe in-memory implementation of [`RecordStore`].
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<ResourceId, ClusterRecord>>,
    watch_tx: broadcast::Sender<WatchEvent>,
}

impl InMemoryRecordStore {
    pub fn new(watch_capacity: usize) -> Self {
        let (watch_tx, _) = broadcast::channel(watch_capacity);
        Self {
            records: RwLock::new(HashMap::new()),
            watch_tx,
        }
    }

    /// Insert a new record on behalf of the external declarer.
    ///
    /// The stored record starts at resource version 1 with whatever status
    /// the caller supplied (normally the default, unspecified one).
    pub fn create(&self, mut record: ClusterRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(StoreError::Backend(format!(
                "record {} already exists",
                record.id
            )));
        }
        record.resource_version = 1;
        let id = record.id.clone();
        records.insert(id.clone(), record);
        drop(records);

        self.notify(id, ChangeKind::Created);
        Ok(())
    }

    /// Remove a record on behalf of the external declarer.
    pub fn delete(&self, id: &ResourceId) -> Result<(), StoreError> {
        let removed = self.records.write().remove(id);
        match removed {
            Some(_) => {
                self.notify(id.clone(), ChangeKind::Deleted);
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    fn notify(&self, id: ResourceId, kind: ChangeKind) {
        // A send with no subscribers is fine; the watch stream is
        // best-effort notification, not a queue.
        let _ = self.watch_tx.send(WatchEvent { id, kind });
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, id: &ResourceId) -> Result<ClusterRecord, StoreError> {
        self.records
            .read()
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_status(
        &self,
        id: &ResourceId,
        status: ClusterStatus,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut records = self.records.write();
        let record = records.get_mut(id).ok_or(StoreError::NotFound)?;
        if record.resource_version != expected_version {
            debug!(
                namespace = %id.namespace,
                name = %id.name,
                expected = expected_version,
                actual = record.resource_version,
                "status write rejected on stale version"
            );
            return Err(StoreError::Conflict);
        }
        record.status = status;
        record.resource_version += 1;
        let new_version = record.resource_version;
        drop(records);

        self.notify(id.clone(), ChangeKind::Updated);
        Ok(new_version)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.watch_tx.subscribe()
    }
}
