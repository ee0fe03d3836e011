//! # Desired-State Store Port
//!
//! Capability surface over the declarative record store: fetch records by
//! identity, persist status with optimistic concurrency, and subscribe to
//! change notifications. The engine never creates or deletes records
//! through this port; those operations belong to the external declarer
//! and exist only on concrete implementations.

pub mod memory;

pub use memory::InMemoryRecordStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::{ClusterRecord, ClusterStatus, ResourceId};

/// Errors surfaced by the store port.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// No record exists for the identity. Expected during normal
    /// operation, not a failure.
    #[error("record not found")]
    NotFound,
    /// The record changed since it was read; the status write carried a
    /// stale resource version.
    #[error("resource version conflict")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
}

/// What changed about a record, as delivered on the watch stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A change notification for one record identity.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub id: ResourceId,
    pub kind: ChangeKind,
}

/// Desired-state store capability consumed by the engine and the
/// trigger adapter.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record for an identity, `StoreError::NotFound` if absent.
    async fn get(&self, id: &ResourceId) -> Result<ClusterRecord, StoreError>;

    /// Persist a status sub-record. Fails with `StoreError::Conflict` when
    /// `expected_version` is stale. Returns the new resource version.
    async fn update_status(
        &self,
        id: &ResourceId,
        status: ClusterStatus,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Subscribe to change notifications. One shared stream fans out to
    /// per-identity scheduling; only the trigger adapter consumes it.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
