//! Shared test support: scripted provider and store doubles plus record
//! builders for driving the engine and scheduler without a real cloud.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use cloudcontrol_core::engine::{ReconcileError, ReconcileOutcome, Reconciler};
use cloudcontrol_core::model::{
    ClusterRecord, ClusterSnapshot, ClusterSpec, ClusterStatus, OperationHandle, OperationKind,
    ResourceId,
};
use cloudcontrol_core::provider::{CloudProvider, ProviderError};
use cloudcontrol_core::store::{InMemoryRecordStore, RecordStore, StoreError, WatchEvent};
use cloudcontrol_core::ClusterPhase;

pub const TEST_ZONE: &str = "test-zone";

/// Build a snapshot with the given provider status encoding.
pub fn snapshot(name: &str, status: &str) -> ClusterSnapshot {
    ClusterSnapshot {
        name: name.to_string(),
        status: status.to_string(),
        zone: TEST_ZONE.to_string(),
        node_count: 1,
        endpoint: None,
    }
}

/// Build a desired-state record for tests.
pub fn record(namespace: &str, name: &str, node_count: i64) -> ClusterRecord {
    ClusterRecord {
        id: ResourceId::new(namespace, name),
        spec: ClusterSpec {
            cluster_name: name.to_string(),
            zone: TEST_ZONE.to_string(),
            initial_node_count: node_count,
            options: HashMap::new(),
        },
        status: ClusterStatus::default(),
        resource_version: 0,
    }
}

pub fn not_found_error() -> ProviderError {
    ProviderError::new("googleapi: Error 404: Not found")
}

/// Scripted state behind the provider double.
#[derive(Debug, Default)]
pub struct ProviderState {
    get_script: VecDeque<Result<ClusterSnapshot, ProviderError>>,
    create_script: VecDeque<Result<OperationHandle, ProviderError>>,
    pub get_calls: Vec<(String, String)>,
    pub create_calls: Vec<(String, ClusterSpec)>,
    pub delete_calls: Vec<(String, String)>,
}

/// Provider double that replays a scripted sequence of responses.
///
/// The final scripted get response repeats forever, so convergence polls
/// keep observing the last state instead of exhausting the script.
pub struct ScriptedProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    pub fn with_get(self, response: Result<ClusterSnapshot, ProviderError>) -> Self {
        self.state.lock().unwrap().get_script.push_back(response);
        self
    }

    pub fn with_create_ok(self, operation_name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .create_script
            .push_back(Ok(OperationHandle {
                name: operation_name.to_string(),
                kind: OperationKind::Create,
            }));
        self
    }

    pub fn with_create_error(self, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .create_script
            .push_back(Err(ProviderError::new(message)));
        self
    }

    pub fn get_call_count(&self) -> usize {
        self.state.lock().unwrap().get_calls.len()
    }

    pub fn create_call_count(&self) -> usize {
        self.state.lock().unwrap().create_calls.len()
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudProvider for ScriptedProvider {
    async fn get_cluster(
        &self,
        zone: &str,
        name: &str,
    ) -> Result<ClusterSnapshot, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.get_calls.push((zone.to_string(), name.to_string()));
        if state.get_script.len() > 1 {
            state.get_script.pop_front().unwrap()
        } else {
            state
                .get_script
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::new("scripted provider: no get response")))
        }
    }

    async fn create_cluster(
        &self,
        zone: &str,
        spec: &ClusterSpec,
    ) -> Result<OperationHandle, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls.push((zone.to_string(), spec.clone()));
        state
            .create_script
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::new("scripted provider: no create response")))
    }

    async fn delete_cluster(
        &self,
        zone: &str,
        name: &str,
    ) -> Result<OperationHandle, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls.push((zone.to_string(), name.to_string()));
        Ok(OperationHandle {
            name: format!("delete-{name}"),
            kind: OperationKind::Delete,
        })
    }
}

/// Store wrapper that records every status write and can inject a fixed
/// number of synthetic conflicts before letting writes through.
pub struct RecordingStore {
    inner: InMemoryRecordStore,
    conflicts_remaining: AtomicUsize,
    writes: Mutex<Vec<ClusterPhase>>,
}

impl RecordingStore {
    pub fn new(inner: InMemoryRecordStore) -> Self {
        Self {
            inner,
            conflicts_remaining: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_conflicts(self, count: usize) -> Self {
        self.conflicts_remaining.store(count, Ordering::SeqCst);
        self
    }

    pub fn create(&self, record: ClusterRecord) -> Result<(), StoreError> {
        self.inner.create(record)
    }

    pub fn delete(&self, id: &ResourceId) -> Result<(), StoreError> {
        self.inner.delete(id)
    }

    /// Phases written through `update_status`, in order.
    pub fn written_phases(&self) -> Vec<ClusterPhase> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn get(&self, id: &ResourceId) -> Result<ClusterRecord, StoreError> {
        self.inner.get(id).await
    }

    async fn update_status(
        &self,
        id: &ResourceId,
        status: ClusterStatus,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        if self
            .conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Conflict);
        }
        let version = self.inner.update_status(id, status.clone(), expected_version).await?;
        self.writes.lock().unwrap().push(status.phase);
        Ok(version)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.watch()
    }
}

/// What the stub reconciler should do on each call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StubBehavior {
    Outcome(ReconcileOutcome),
    Fail,
}

/// Reconciler double for scheduler tests: tracks call counts, concurrency
/// and the identities it was invoked for.
pub struct StubReconciler {
    delay: Duration,
    script: Mutex<VecDeque<StubBehavior>>,
    calls: AtomicUsize,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    ids: Mutex<Vec<ResourceId>>,
}

impl StubReconciler {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(0),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            ids: Mutex::new(Vec::new()),
        }
    }

    /// Hold each call open for `delay`, observing the shutdown signal.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a behavior; the final one repeats. Defaults to `Done`.
    pub fn with_behavior(self, behavior: StubBehavior) -> Self {
        self.script.lock().unwrap().push_back(behavior);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }

    pub fn seen_ids(&self) -> Vec<ResourceId> {
        self.ids.lock().unwrap().clone()
    }

    fn next_behavior(&self) -> StubBehavior {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script
                .front()
                .copied()
                .unwrap_or(StubBehavior::Outcome(ReconcileOutcome::Done))
        }
    }
}

impl Default for StubReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reconciler for StubReconciler {
    async fn reconcile(
        &self,
        id: &ResourceId,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ids.lock().unwrap().push(id.clone());

        let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);

        let cancelled = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => true,
            _ = tokio::time::sleep(self.delay) => false,
        };

        self.current.fetch_sub(1, Ordering::SeqCst);

        if cancelled {
            return Ok(ReconcileOutcome::Cancelled);
        }
        match self.next_behavior() {
            StubBehavior::Outcome(outcome) => Ok(outcome),
            StubBehavior::Fail => Err(ReconcileError::Provider {
                id: id.clone(),
                source: ProviderError::new("stubbed provider failure"),
            }),
        }
    }
}
