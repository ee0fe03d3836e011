//! # Reconciler Registry
//!
//! Explicit registration of reconcilers by resource kind. The registry is
//! a plain value built by the embedder and handed to `start_all`; there is
//! no process-wide registration state. Each registered kind gets its own
//! scheduler, mirroring the one-controller-per-resource-kind layout of
//! the surrounding control plane.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::engine::Reconciler;
use crate::error::{CloudControlError, Result};
use crate::scheduler::{ReconcileScheduler, SchedulerConfig};
use crate::store::RecordStore;

/// One registered resource kind: its store subscription and its
/// reconciler.
struct Registration {
    store: Arc<dyn RecordStore>,
    reconciler: Arc<dyn Reconciler>,
}

/// Value-typed registry mapping kind names to reconcilers.
#[derive(Default)]
pub struct ReconcilerRegistry {
    entries: HashMap<String, Registration>,
}

impl ReconcilerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reconciler for a kind. Kind names must be unique.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        store: Arc<dyn RecordStore>,
        reconciler: Arc<dyn Reconciler>,
    ) -> Result<()> {
        let kind = kind.into();
        if self.entries.contains_key(&kind) {
            return Err(CloudControlError::Registry(format!(
                "kind {kind} already registered"
            )));
        }
        info!(kind = %kind, "registered reconciler");
        self.entries.insert(kind, Registration { store, reconciler });
        Ok(())
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start one scheduler per registered kind.
    pub fn start_all(self, config: SchedulerConfig) -> ControllerSet {
        let mut controllers = Vec::with_capacity(self.entries.len());
        for (kind, registration) in self.entries {
            info!(kind = %kind, "starting controller");
            let scheduler = ReconcileScheduler::new(
                registration.reconciler,
                registration.store,
                config.clone(),
            );
            scheduler.start();
            controllers.push((kind, scheduler));
        }
        ControllerSet { controllers }
    }
}

/// Handle over the running controllers, used to drive shutdown.
pub struct ControllerSet {
    controllers: Vec<(String, ReconcileScheduler)>,
}

impl ControllerSet {
    pub fn kinds(&self) -> Vec<&str> {
        self.controllers.iter().map(|(kind, _)| kind.as_str()).collect()
    }

    pub fn scheduler(&self, kind: &str) -> Option<&ReconcileScheduler> {
        self.controllers
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, scheduler)| scheduler)
    }

    /// Stop every controller, cancelling in-flight convergence waits.
    pub async fn shutdown(self) {
        for (kind, scheduler) in &self.controllers {
            info!(kind = %kind, "stopping controller");
            scheduler.shutdown().await;
        }
    }
}
