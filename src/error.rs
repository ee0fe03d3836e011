use thiserror::Error;

/// Top-level error type for embedders of the reconciliation core.
///
/// Boundary-specific errors (`ProviderError`, `StoreError`, `ReconcileError`)
/// live next to the components that produce them; this enum is the coarse
/// surface exposed by construction and lifecycle entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CloudControlError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("reconciliation error: {0}")]
    Reconciliation(String),
    #[error("scheduler error: {0}")]
    Scheduler(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, CloudControlError>;
