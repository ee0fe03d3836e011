//! # Data Model
//!
//! Desired-state records and provider-observed snapshots for managed
//! clusters. The engine reads `ClusterRecord.spec` and writes only
//! `ClusterRecord.status`; everything else belongs to the external
//! declarer.

pub mod phase;

pub use phase::ClusterPhase;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a desired-state record: namespace plus name, globally
/// unique and immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Desired configuration for a managed cluster. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Name of the cluster as known to the provider
    pub cluster_name: String,
    /// Provider zone the cluster lives in
    pub zone: String,
    /// Node count requested at creation time
    pub initial_node_count: i64,
    /// Provider-specific options passed through at creation
    #[serde(default)]
    pub options: HashMap<String, String>,
}

/// Observed status sub-record. The only field the engine may write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub phase: ClusterPhase,
    /// Human-readable condition message accompanying the phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ClusterStatus {
    pub fn new(phase: ClusterPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: Some(message.into()),
        }
    }
}

/// A desired-state record as stored in the declarative record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ResourceId,
    pub spec: ClusterSpec,
    #[serde(default)]
    pub status: ClusterStatus,
    /// Optimistic-concurrency token; status writes carry the version the
    /// record was read at and fail on staleness.
    pub resource_version: u64,
}

/// Provider-observed actual state of a cluster.
///
/// Ephemeral: fetched per reconciliation, never cached across invocations
/// and never persisted except by copying fields into `ClusterStatus`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    /// Cluster name as reported by the provider
    pub name: String,
    /// Status in the provider's own encoding, e.g. "PROVISIONING"
    pub status: String,
    pub zone: String,
    pub node_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ClusterSnapshot {
    /// Decode the provider status string into a phase.
    pub fn phase(&self) -> ClusterPhase {
        ClusterPhase::from_provider_status(&self.status)
    }
}

/// Kind of provider-side mutation an operation handle confirms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Delete,
}

/// Handle for an accepted provider-side mutation.
///
/// Confirms the mutation was accepted, nothing more. The engine does not
/// poll operations to completion; it re-derives progress by fetching
/// fresh snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub name: String,
    pub kind: OperationKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_display() {
        let id = ResourceId::new("default", "test-cluster");
        assert_eq!(id.to_string(), "default/test-cluster");
    }

    #[test]
    fn test_snapshot_phase_decoding() {
        let snapshot = ClusterSnapshot {
            name: "c1".to_string(),
            status: "RUNNING".to_string(),
            zone: "z1".to_string(),
            node_count: 3,
            endpoint: Some("10.0.0.1".to_string()),
        };
        assert_eq!(snapshot.phase(), ClusterPhase::Running);
    }

    #[test]
    fn test_default_status_is_unspecified() {
        let status = ClusterStatus::default();
        assert_eq!(status.phase, ClusterPhase::Unspecified);
        assert!(status.message.is_none());
    }

    #[test]
    fn test_record_serde_round_trip() {
        let record = ClusterRecord {
            id: ResourceId::new("default", "c1"),
            spec: ClusterSpec {
                cluster_name: "c1".to_string(),
                zone: "us-central1-a".to_string(),
                initial_node_count: 1,
                options: HashMap::new(),
            },
            status: ClusterStatus::new(ClusterPhase::Provisioning, "creating"),
            resource_version: 4,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ClusterRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
