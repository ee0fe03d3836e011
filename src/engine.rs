//! # Reconciliation Engine
//!
//! The convergence loop at the center of the crate: given a desired-state
//! record and the provider's actual-state snapshot, decide whether to
//! create, wait, confirm, or report failure, and converge safely under
//! repeated invocation.
//!
//! ## Contract
//!
//! `reconcile` returns one of three caller-visible outcomes — done,
//! requeue after a delay, or cancelled — with fatal failures surfaced as
//! the error arm. Raw provider and store errors never leak past this
//! module; they are classified at the boundary and folded into status
//! writes and events.
//!
//! ## Invariants
//!
//! - At most one provider `create_cluster` call per invocation. Combined
//!   with per-identity serialization in the scheduler, this prevents
//!   duplicate clusters when triggers overlap.
//! - Recorded phase never regresses from `Running` to `Provisioning`, and
//!   the absorbing `Error`/`Degraded` phases are only left by deleting
//!   and recreating the record.
//! - Status writes use optimistic concurrency: one refetch-and-retry on
//!   conflict, then the pass is downgraded to a transient requeue.
//! - Cancellation during a convergence wait returns promptly, within one
//!   poll tick, without a partial status write.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::classifier::{ErrorClass, ProviderErrorClassifier};
use crate::config::CloudControlConfig;
use crate::events::{reasons, EventPublisher, EventSeverity};
use crate::model::{ClusterPhase, ClusterRecord, ClusterStatus, ResourceId};
use crate::provider::{CloudProvider, ProviderError};
use crate::store::{RecordStore, StoreError};

/// Caller-visible outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing further to do until an external change notification
    Done,
    /// Schedule another pass no earlier than the given delay
    RequeueAfter(Duration),
    /// The pass was abandoned on shutdown; nothing terminal was recorded
    Cancelled,
}

/// Fatal reconciliation failures. Not retried by the scheduler; a fresh
/// external change notification is required.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    #[error("cluster creation failed for {id}: {source}")]
    CreateFailed {
        id: ResourceId,
        source: ProviderError,
    },
    #[error("provider error for {id}: {source}")]
    Provider {
        id: ResourceId,
        source: ProviderError,
    },
    #[error("store error for {id}: {source}")]
    Store { id: ResourceId, source: StoreError },
}

/// Narrow reconciler seam the scheduler and registry work against.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(
        &self,
        id: &ResourceId,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ReconcileOutcome, ReconcileError>;
}

/// Timing knobs for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub resync_interval: Duration,
    pub transient_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            resync_interval: Duration::from_secs(60),
            transient_backoff: Duration::from_secs(5),
        }
    }
}

impl From<&CloudControlConfig> for EngineConfig {
    fn from(config: &CloudControlConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            resync_interval: config.resync_interval(),
            transient_backoff: config.transient_backoff(),
        }
    }
}

/// Internal status-write failure modes after the single conflict retry.
enum StatusWriteError {
    /// Lost the optimistic-concurrency race twice; surface as transient
    Contended,
    /// The record disappeared mid-pass; nothing left to reconcile
    Missing,
    Backend(StoreError),
}

/// The reconciliation engine for managed clusters.
pub struct ReconcileEngine {
    provider: Arc<dyn CloudProvider>,
    store: Arc<dyn RecordStore>,
    classifier: Arc<dyn ProviderErrorClassifier>,
    events: EventPublisher,
    config: EngineConfig,
}

impl ReconcileEngine {
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        store: Arc<dyn RecordStore>,
        classifier: Arc<dyn ProviderErrorClassifier>,
        events: EventPublisher,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            store,
            classifier,
            events,
            config,
        }
    }

    /// Run one reconciliation pass for the identity.
    pub async fn reconcile(
        &self,
        id: &ResourceId,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let record = match self.store.get(id).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                debug!(namespace = %id.namespace, name = %id.name, "record not found, nothing to reconcile");
                return Ok(ReconcileOutcome::Done);
            }
            Err(source) => {
                return Err(ReconcileError::Store {
                    id: id.clone(),
                    source,
                })
            }
        };

        // Absorbing phases are terminal for the record's lifetime: no
        // provider traffic until the record is deleted and recreated.
        if record.status.phase.is_absorbing() {
            debug!(
                namespace = %id.namespace,
                name = %id.name,
                phase = %record.status.phase,
                "record in absorbing phase, skipping"
            );
            return Ok(ReconcileOutcome::Done);
        }

        let lookup = self
            .provider
            .get_cluster(&record.spec.zone, &record.spec.cluster_name)
            .await;

        match lookup {
            Ok(snapshot) => {
                let phase = snapshot.phase();
                match phase {
                    ClusterPhase::Running => self.confirm_steady_state(&record).await,
                    p if p.is_in_progress() => {
                        debug!(
                            namespace = %id.namespace,
                            name = %id.name,
                            phase = %p,
                            "cluster still in progress, resuming convergence wait"
                        );
                        let record = self.note_provisioning(record).await?;
                        self.converge(record, shutdown).await
                    }
                    p => {
                        self.mark_failed(&record, format!("cluster reported phase {p}"))
                            .await
                    }
                }
            }
            Err(error) => match self.classifier.classify(&error) {
                ErrorClass::NotFound => self.create_and_converge(record, shutdown).await,
                ErrorClass::Transient => {
                    info!(
                        namespace = %id.namespace,
                        name = %id.name,
                        error = %error,
                        "transient provider error, requeueing"
                    );
                    Ok(ReconcileOutcome::RequeueAfter(self.config.transient_backoff))
                }
                ErrorClass::Fatal => {
                    self.events.emit(
                        id,
                        EventSeverity::Warning,
                        reasons::CLUSTER_ERROR,
                        format!("provider lookup failed: {error}"),
                    );
                    // Best effort: the fatal error is surfaced either way.
                    let _ = self
                        .write_status(
                            &record,
                            ClusterPhase::Error,
                            &format!("provider lookup failed: {error}"),
                        )
                        .await;
                    Err(ReconcileError::Provider {
                        id: id.clone(),
                        source: error,
                    })
                }
            },
        }
    }

    /// The cluster does not exist: issue exactly one create, then wait
    /// for convergence.
    async fn create_and_converge(
        &self,
        record: ClusterRecord,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let id = record.id.clone();
        info!(
            namespace = %id.namespace,
            name = %id.name,
            cluster = %record.spec.cluster_name,
            zone = %record.spec.zone,
            "cluster not found, creating"
        );

        let operation = match self
            .provider
            .create_cluster(&record.spec.zone, &record.spec)
            .await
        {
            Ok(operation) => operation,
            Err(error) => {
                self.events.emit(
                    &id,
                    EventSeverity::Warning,
                    reasons::CLUSTER_CREATION_FAILED,
                    format!("cluster creation failed: {error}"),
                );
                let _ = self
                    .write_status(
                        &record,
                        ClusterPhase::Error,
                        &format!("cluster creation failed: {error}"),
                    )
                    .await;
                return Err(ReconcileError::CreateFailed { id, source: error });
            }
        };

        info!(
            namespace = %id.namespace,
            name = %id.name,
            operation = %operation.name,
            "cluster creation accepted"
        );
        self.events.emit(
            &id,
            EventSeverity::Normal,
            reasons::CLUSTER_CREATION,
            "cluster creation started",
        );

        let record = self.note_provisioning(record).await?;
        self.converge(record, shutdown).await
    }

    /// Record the provisioning phase if the status does not already show
    /// it. A contended write is tolerated here; the convergence wait
    /// records the terminal phase regardless.
    async fn note_provisioning(
        &self,
        record: ClusterRecord,
    ) -> Result<ClusterRecord, ReconcileError> {
        if record.status.phase == ClusterPhase::Provisioning {
            return Ok(record);
        }
        match self
            .write_status(&record, ClusterPhase::Provisioning, "cluster creation in progress")
            .await
        {
            Ok(updated) => Ok(updated),
            Err(StatusWriteError::Contended) => {
                warn!(
                    namespace = %record.id.namespace,
                    name = %record.id.name,
                    "provisioning status write contended, continuing to convergence wait"
                );
                Ok(record)
            }
            Err(StatusWriteError::Missing) => Ok(record),
            Err(StatusWriteError::Backend(source)) => Err(ReconcileError::Store {
                id: record.id.clone(),
                source,
            }),
        }
    }

    /// Poll actual state until it reaches a terminal phase, observing the
    /// shutdown signal between polls.
    async fn converge(
        &self,
        record: ClusterRecord,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let id = record.id.clone();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    info!(
                        namespace = %id.namespace,
                        name = %id.name,
                        "convergence wait cancelled, next pass resumes from current actual state"
                    );
                    return Ok(ReconcileOutcome::Cancelled);
                }
                _ = ticker.tick() => {
                    let lookup = self
                        .provider
                        .get_cluster(&record.spec.zone, &record.spec.cluster_name)
                        .await;
                    match lookup {
                        Ok(snapshot) => {
                            let phase = snapshot.phase();
                            if phase == ClusterPhase::Running {
                                return self.mark_running(&record).await;
                            }
                            if phase.is_in_progress() {
                                debug!(
                                    namespace = %id.namespace,
                                    name = %id.name,
                                    phase = %phase,
                                    "cluster not converged yet"
                                );
                                continue;
                            }
                            // Error, Degraded or Unspecified: terminal.
                            return self
                                .mark_failed(&record, format!("cluster reported phase {phase}"))
                                .await;
                        }
                        Err(error) => match self.classifier.classify(&error) {
                            // Creation can briefly report absence; both
                            // cases mean "ask again next tick".
                            ErrorClass::NotFound | ErrorClass::Transient => {
                                debug!(
                                    namespace = %id.namespace,
                                    name = %id.name,
                                    error = %error,
                                    "poll failed, retrying next tick"
                                );
                                continue;
                            }
                            ErrorClass::Fatal => {
                                self.events.emit(
                                    &id,
                                    EventSeverity::Warning,
                                    reasons::CLUSTER_ERROR,
                                    format!("provider lookup failed: {error}"),
                                );
                                let _ = self
                                    .write_status(
                                        &record,
                                        ClusterPhase::Error,
                                        &format!("provider lookup failed: {error}"),
                                    )
                                    .await;
                                return Err(ReconcileError::Provider { id, source: error });
                            }
                        },
                    }
                }
            }
        }
    }

    /// Actual state is already running: confirm, writing status only when
    /// it differs, and come back at the long resync interval.
    async fn confirm_steady_state(
        &self,
        record: &ClusterRecord,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if record.status.phase == ClusterPhase::Running {
            debug!(
                namespace = %record.id.namespace,
                name = %record.id.name,
                "steady state confirmed"
            );
            return Ok(ReconcileOutcome::RequeueAfter(self.config.resync_interval));
        }

        match self.mark_running(record).await? {
            ReconcileOutcome::Done => {
                Ok(ReconcileOutcome::RequeueAfter(self.config.resync_interval))
            }
            other => Ok(other),
        }
    }

    async fn mark_running(
        &self,
        record: &ClusterRecord,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self
            .write_status(record, ClusterPhase::Running, "cluster is running")
            .await
        {
            Ok(_) => {
                info!(
                    namespace = %record.id.namespace,
                    name = %record.id.name,
                    "cluster running"
                );
                self.events.emit(
                    &record.id,
                    EventSeverity::Normal,
                    reasons::CLUSTER_RUNNING,
                    "cluster is running",
                );
                Ok(ReconcileOutcome::Done)
            }
            Err(StatusWriteError::Contended) => {
                Ok(ReconcileOutcome::RequeueAfter(self.config.transient_backoff))
            }
            Err(StatusWriteError::Missing) => Ok(ReconcileOutcome::Done),
            Err(StatusWriteError::Backend(source)) => Err(ReconcileError::Store {
                id: record.id.clone(),
                source,
            }),
        }
    }

    /// Record a terminal failure phase and emit the failure event. The
    /// result is Done, not an error: the failure is absorbed into status
    /// and will not be retried until the record changes.
    async fn mark_failed(
        &self,
        record: &ClusterRecord,
        detail: String,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        warn!(
            namespace = %record.id.namespace,
            name = %record.id.name,
            detail = %detail,
            "cluster failed"
        );
        self.events.emit(
            &record.id,
            EventSeverity::Warning,
            reasons::CLUSTER_ERROR,
            detail.clone(),
        );
        match self
            .write_status(record, ClusterPhase::Error, &detail)
            .await
        {
            Ok(_) => Ok(ReconcileOutcome::Done),
            Err(StatusWriteError::Contended) => {
                Ok(ReconcileOutcome::RequeueAfter(self.config.transient_backoff))
            }
            Err(StatusWriteError::Missing) => Ok(ReconcileOutcome::Done),
            Err(StatusWriteError::Backend(source)) => Err(ReconcileError::Store {
                id: record.id.clone(),
                source,
            }),
        }
    }

    /// Persist a status sub-record with optimistic concurrency, retrying
    /// exactly once on conflict with a refreshed version.
    ///
    /// Guards the phase invariants: never regresses Running back to
    /// Provisioning, and never overwrites an absorbing phase recorded by
    /// a concurrent writer.
    async fn write_status(
        &self,
        record: &ClusterRecord,
        phase: ClusterPhase,
        message: &str,
    ) -> Result<ClusterRecord, StatusWriteError> {
        if record.status.phase == ClusterPhase::Running && phase == ClusterPhase::Provisioning {
            warn!(
                namespace = %record.id.namespace,
                name = %record.id.name,
                "refusing phase regression running -> provisioning"
            );
            return Ok(record.clone());
        }

        let status = ClusterStatus::new(phase, message);
        match self
            .store
            .update_status(&record.id, status.clone(), record.resource_version)
            .await
        {
            Ok(version) => {
                let mut updated = record.clone();
                updated.status = status;
                updated.resource_version = version;
                Ok(updated)
            }
            Err(StoreError::Conflict) => {
                debug!(
                    namespace = %record.id.namespace,
                    name = %record.id.name,
                    "status write conflicted, refetching and retrying once"
                );
                let fresh = match self.store.get(&record.id).await {
                    Ok(fresh) => fresh,
                    Err(StoreError::NotFound) => return Err(StatusWriteError::Missing),
                    Err(source) => return Err(StatusWriteError::Backend(source)),
                };
                if fresh.status.phase.is_absorbing() && fresh.status.phase != phase {
                    return Ok(fresh);
                }
                if fresh.status.phase == ClusterPhase::Running
                    && phase == ClusterPhase::Provisioning
                {
                    return Ok(fresh);
                }
                match self
                    .store
                    .update_status(&record.id, status.clone(), fresh.resource_version)
                    .await
                {
                    Ok(version) => {
                        let mut updated = fresh;
                        updated.status = status;
                        updated.resource_version = version;
                        Ok(updated)
                    }
                    Err(StoreError::Conflict) => Err(StatusWriteError::Contended),
                    Err(StoreError::NotFound) => Err(StatusWriteError::Missing),
                    Err(source) => Err(StatusWriteError::Backend(source)),
                }
            }
            Err(StoreError::NotFound) => Err(StatusWriteError::Missing),
            Err(source) => Err(StatusWriteError::Backend(source)),
        }
    }
}

#[async_trait]
impl Reconciler for ReconcileEngine {
    async fn reconcile(
        &self,
        id: &ResourceId,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        ReconcileEngine::reconcile(self, id, shutdown).await
    }
}
