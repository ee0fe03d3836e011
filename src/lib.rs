//! # CloudControl Core
//!
//! Reconciliation core for declaratively managed cloud clusters: observe
//! user-declared desired state and drive the provider-hosted resource
//! toward it, continuously, without a human in the loop.
//!
//! ## Architecture
//!
//! The crate is organized around narrow ports and one engine:
//!
//! - [`provider`] — capability surface over the cloud SDK (get, create,
//!   delete); returns opaque errors
//! - [`store`] — capability surface over the declarative record store
//!   (get, status update with optimistic concurrency, watch)
//! - [`classifier`] — maps opaque provider errors to not-found /
//!   transient / fatal
//! - [`engine`] — the reconciliation state machine and convergence wait
//! - [`scheduler`] — trigger adapter enforcing per-identity mutual
//!   exclusion over a worker pool
//! - [`events`] — fire-and-forget transition event publishing
//! - [`registry`] — explicit kind-to-reconciler registration, one
//!   scheduler per kind
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudcontrol_core::classifier::StandardErrorClassifier;
//! use cloudcontrol_core::config::CloudControlConfig;
//! use cloudcontrol_core::engine::{EngineConfig, ReconcileEngine};
//! use cloudcontrol_core::events::EventPublisher;
//! use cloudcontrol_core::provider::CloudProvider;
//! use cloudcontrol_core::registry::ReconcilerRegistry;
//! use cloudcontrol_core::scheduler::SchedulerConfig;
//! use cloudcontrol_core::store::InMemoryRecordStore;
//!
//! # async fn example(provider: Arc<dyn CloudProvider>) -> cloudcontrol_core::Result<()> {
//! let config = CloudControlConfig::from_env()?;
//! let store = Arc::new(InMemoryRecordStore::default());
//! let engine = Arc::new(ReconcileEngine::new(
//!     provider,
//!     store.clone(),
//!     Arc::new(StandardErrorClassifier::new()),
//!     EventPublisher::new(config.event_capacity),
//!     EngineConfig::from(&config),
//! ));
//!
//! let mut registry = ReconcilerRegistry::new();
//! registry.register("gcpkubernetescluster", store, engine)?;
//! let controllers = registry.start_all(SchedulerConfig::default());
//!
//! // ... run until shutdown is requested ...
//! controllers.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod model;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod store;

pub use classifier::{ErrorClass, ProviderErrorClassifier, StandardErrorClassifier};
pub use config::CloudControlConfig;
pub use engine::{EngineConfig, ReconcileEngine, ReconcileError, ReconcileOutcome, Reconciler};
pub use error::{CloudControlError, Result};
pub use events::{ClusterEvent, EventPublisher, EventSeverity};
pub use model::{
    ClusterPhase, ClusterRecord, ClusterSnapshot, ClusterSpec, ClusterStatus, OperationHandle,
    OperationKind, ResourceId,
};
pub use provider::{CloudProvider, ProviderError};
pub use registry::{ControllerSet, ReconcilerRegistry};
pub use scheduler::{ReconcileScheduler, SchedulerConfig};
pub use store::{ChangeKind, InMemoryRecordStore, RecordStore, StoreError, WatchEvent};
