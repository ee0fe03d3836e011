//! # Event Publisher
//!
//! Human-observable transition events for managed clusters. Emission is
//! fire-and-forget over a broadcast channel: a reconciliation never blocks
//! on, and never fails because of, event delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::model::ResourceId;

/// Well-known event reasons recorded by the engine.
pub mod reasons {
    pub const CLUSTER_CREATION: &str = "ClusterCreation";
    pub const CLUSTER_CREATION_FAILED: &str = "ClusterCreationFailed";
    pub const CLUSTER_RUNNING: &str = "ClusterRunning";
    pub const CLUSTER_ERROR: &str = "ClusterError";
}

/// Severity of a recorded event, mirroring the normal/warning pair the
/// record store's event surface understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Normal,
    Warning,
}

impl fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Warning => write!(f, "Warning"),
        }
    }
}

/// A recorded transition event for one cluster identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterEvent {
    pub id: ResourceId,
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// Broadcast-backed event publisher shared across worker routines.
///
/// ```
/// use cloudcontrol_core::events::{EventPublisher, EventSeverity, reasons};
/// use cloudcontrol_core::model::ResourceId;
///
/// # tokio_test::block_on(async {
/// let publisher = EventPublisher::new(16);
/// let mut events = publisher.subscribe();
///
/// let id = ResourceId::new("default", "c1");
/// publisher.emit(&id, EventSeverity::Normal, reasons::CLUSTER_CREATION, "creating");
///
/// let event = events.recv().await.unwrap();
/// assert_eq!(event.reason, reasons::CLUSTER_CREATION);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<ClusterEvent>,
}

impl EventPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Record an event. Never fails: delivery with no subscribers is a
    /// successful no-op, and slow subscribers lag rather than block.
    pub fn emit(
        &self,
        id: &ResourceId,
        severity: EventSeverity,
        reason: &str,
        message: impl Into<String>,
    ) {
        let event = ClusterEvent {
            id: id.clone(),
            severity,
            reason: reason.to_string(),
            message: message.into(),
            recorded_at: Utc::now(),
        };
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
