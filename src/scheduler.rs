//! # Trigger Adapter
//!
//! Decides when the engine runs. A small pool of worker routines drains a
//! queue of identities fed by the store's watch stream, manual triggers,
//! and requeue timers.
//!
//! ## Shared-resource invariant
//!
//! Per-identity mutual exclusion with global parallelism: an identity is
//! never present in the queue more than once and never executing on two
//! workers simultaneously. A trigger arriving while the identity is in
//! flight coalesces into a single rerun once the current pass finishes.
//!
//! ## Outcome handling
//!
//! - `Done` — nothing scheduled; any stale requeue timer is invalidated.
//! - `RequeueAfter(d)` — a timer re-enqueues the identity no earlier
//!   than `d`. A coalesced rerun takes precedence over the timer.
//! - `Cancelled` — nothing scheduled; the watch stream resynchronizes
//!   after restart.
//! - Fatal error — deliberately not rescheduled; only a fresh change
//!   notification retries it.

use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::{ReconcileOutcome, Reconciler};
use crate::model::ResourceId;
use crate::store::RecordStore;

/// Scheduling knobs for the trigger adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Worker routines draining the reconcile queue
    pub worker_count: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { worker_count: 2 }
    }
}

/// Per-identity scheduling state.
#[derive(Debug, Default)]
struct IdentityState {
    /// Identity is sitting in the queue awaiting a worker
    queued: bool,
    /// Identity is currently executing on a worker
    in_flight: bool,
    /// A trigger arrived mid-flight; rerun once the pass finishes
    rerun_pending: bool,
    /// Bumped on every completion; a requeue timer armed under an older
    /// generation is stale and must not fire
    timer_generation: u64,
}

struct SchedulerInner {
    reconciler: Arc<dyn Reconciler>,
    store: Arc<dyn RecordStore>,
    states: DashMap<ResourceId, IdentityState>,
    queue_tx: mpsc::UnboundedSender<ResourceId>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<ResourceId>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SchedulerInner {
    /// Enqueue an identity, deduplicating against queued and in-flight
    /// work for the same identity.
    fn enqueue(&self, id: ResourceId) {
        {
            let mut state = self.states.entry(id.clone()).or_default();
            if state.in_flight {
                state.rerun_pending = true;
                debug!(namespace = %id.namespace, name = %id.name, "coalesced trigger into in-flight reconcile");
                return;
            }
            if state.queued {
                return;
            }
            state.queued = true;
        }
        // The receiver lives as long as self; a send failure only happens
        // during teardown and is safe to drop.
        let _ = self.queue_tx.send(id);
    }

    fn mark_in_flight(&self, id: &ResourceId) {
        if let Some(mut state) = self.states.get_mut(id) {
            state.queued = false;
            state.in_flight = true;
        }
    }

    /// Record completion, returning whether a coalesced rerun is owed.
    fn complete(&self, id: &ResourceId) -> bool {
        match self.states.get_mut(id) {
            Some(mut state) => {
                state.in_flight = false;
                state.timer_generation += 1;
                std::mem::take(&mut state.rerun_pending)
            }
            None => false,
        }
    }

    fn arm_timer(self: &Arc<Self>, id: ResourceId, delay: Duration) {
        let generation = match self.states.get(&id) {
            Some(state) => state.timer_generation,
            None => return,
        };
        let inner = Arc::clone(self);
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => return,
                _ = tokio::time::sleep(delay) => {}
            }
            let still_current = inner
                .states
                .get(&id)
                .map(|state| state.timer_generation == generation)
                .unwrap_or(false);
            if still_current {
                debug!(namespace = %id.namespace, name = %id.name, "requeue timer fired");
                inner.enqueue(id);
            }
        });
    }

    async fn worker_loop(self: Arc<Self>) {
        let worker_id = Uuid::new_v4();
        let mut shutdown = self.shutdown_rx.clone();
        debug!(worker_id = %worker_id, "reconcile worker started");

        loop {
            let id = {
                let mut queue = self.queue_rx.lock().await;
                tokio::select! {
                    _ = shutdown.wait_for(|stop| *stop) => None,
                    id = queue.recv() => id,
                }
            };
            let Some(id) = id else {
                debug!(worker_id = %worker_id, "reconcile worker stopping");
                return;
            };

            self.mark_in_flight(&id);
            let outcome = self
                .reconciler
                .reconcile(&id, self.shutdown_rx.clone())
                .await;
            let rerun_pending = self.complete(&id);

            match outcome {
                Ok(ReconcileOutcome::Done) => {
                    debug!(worker_id = %worker_id, namespace = %id.namespace, name = %id.name, "reconcile done");
                    if rerun_pending {
                        self.enqueue(id);
                    }
                }
                Ok(ReconcileOutcome::RequeueAfter(delay)) => {
                    debug!(
                        worker_id = %worker_id,
                        namespace = %id.namespace,
                        name = %id.name,
                        delay_ms = delay.as_millis() as u64,
                        "reconcile requeued"
                    );
                    if rerun_pending {
                        self.enqueue(id);
                    } else {
                        self.arm_timer(id, delay);
                    }
                }
                Ok(ReconcileOutcome::Cancelled) => {
                    debug!(worker_id = %worker_id, namespace = %id.namespace, name = %id.name, "reconcile cancelled");
                }
                Err(err) => {
                    // Fatal is terminal: no timer, no retry. A coalesced
                    // trigger is an external change notification and is
                    // still honored.
                    error!(
                        worker_id = %worker_id,
                        namespace = %id.namespace,
                        name = %id.name,
                        error = %err,
                        "reconcile failed, waiting for external change"
                    );
                    if rerun_pending {
                        self.enqueue(id);
                    }
                }
            }
        }
    }

    async fn watch_pump(self: Arc<Self>) {
        let mut events = self.store.watch();
        let mut shutdown = self.shutdown_rx.clone();
        debug!("watch pump started");

        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => return,
                event = events.recv() => match event {
                    Ok(event) => {
                        debug!(
                            namespace = %event.id.namespace,
                            name = %event.id.name,
                            kind = ?event.kind,
                            "change notification"
                        );
                        self.enqueue(event.id);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "watch stream lagged, notifications dropped");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        info!("watch stream closed, pump stopping");
                        return;
                    }
                },
            }
        }
    }
}

/// The trigger adapter: owns the queue, the worker pool and the watch
/// pump for one reconciler.
pub struct ReconcileScheduler {
    inner: Arc<SchedulerInner>,
    config: SchedulerConfig,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl ReconcileScheduler {
    pub fn new(
        reconciler: Arc<dyn Reconciler>,
        store: Arc<dyn RecordStore>,
        config: SchedulerConfig,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                reconciler,
                store,
                states: DashMap::new(),
                queue_tx,
                queue_rx: Mutex::new(queue_rx),
                shutdown_tx,
                shutdown_rx,
            }),
            config,
            handles: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Spawn the watch pump and worker pool. Returns immediately.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            warn!("scheduler already started");
            return;
        }

        info!(worker_count = self.config.worker_count, "starting reconcile scheduler");
        handles.push(tokio::spawn(Arc::clone(&self.inner).watch_pump()));
        for _ in 0..self.config.worker_count {
            handles.push(tokio::spawn(Arc::clone(&self.inner).worker_loop()));
        }
    }

    /// Manually trigger a reconciliation, as a change notification would.
    pub fn trigger(&self, id: ResourceId) {
        self.inner.enqueue(id);
    }

    /// True when no identity is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.inner
            .states
            .iter()
            .all(|state| !state.queued && !state.in_flight)
    }

    /// Signal shutdown, cancel in-flight convergence waits and join all
    /// worker routines.
    pub async fn shutdown(&self) {
        info!("shutting down reconcile scheduler");
        let _ = self.inner.shutdown_tx.send(true);
        let handles = std::mem::take(&mut *self.handles.lock());
        join_all(handles).await;
        info!("reconcile scheduler stopped");
    }
}
