//! # Provider Port
//!
//! Narrow capability surface the engine uses to inspect and mutate the
//! external resource. Implementations wrap a cloud SDK client; the
//! in-tree consumers never see SDK types, only `ClusterSnapshot`,
//! `OperationHandle` and the opaque `ProviderError`.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ClusterSnapshot, ClusterSpec, OperationHandle};

/// Opaque provider error: the SDK's message plus an optional status code.
///
/// Provider SDKs encode failures in free-form strings (for example
/// `googleapi: Error 404: Not found`). The message is carried verbatim so
/// the classifier can match against it; nothing else in the crate
/// interprets it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
    pub code: Option<u16>,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}

/// Capability set the engine consumes to manage clusters at the provider.
///
/// Implementations must be safe for concurrent use across worker routines;
/// calls are stateless request/response.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Fetch the current snapshot of a cluster by zone and provider name.
    async fn get_cluster(&self, zone: &str, name: &str)
        -> Result<ClusterSnapshot, ProviderError>;

    /// Request creation of a cluster. Not idempotent at the provider: the
    /// engine guarantees at most one call per reconcile invocation.
    async fn create_cluster(
        &self,
        zone: &str,
        spec: &ClusterSpec,
    ) -> Result<OperationHandle, ProviderError>;

    /// Request deletion of a cluster. Present for completeness of the
    /// port; deletion reconciliation is not implemented.
    async fn delete_cluster(
        &self,
        zone: &str,
        name: &str,
    ) -> Result<OperationHandle, ProviderError>;
}
