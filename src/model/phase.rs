use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a managed cluster.
///
/// The variant set mirrors the status values reported by the cloud
/// provider's cluster API, so provider snapshots and recorded status share
/// one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterPhase {
    /// No phase observed or recorded yet
    Unspecified,
    /// Cluster creation accepted, resources being brought up
    Provisioning,
    /// Cluster is up and serving
    Running,
    /// Provider is applying changes to a running cluster
    Reconciling,
    /// Provider is tearing the cluster down
    Stopping,
    /// Cluster is broken and requires external intervention
    Error,
    /// Cluster is up but unhealthy
    Degraded,
}

impl ClusterPhase {
    /// Absorbing failure states: only deleting and recreating the desired
    /// record leaves them.
    pub fn is_absorbing(&self) -> bool {
        matches!(self, Self::Error | Self::Degraded)
    }

    /// Phases a convergence wait treats as final.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Running | Self::Error | Self::Degraded)
    }

    /// Phases where the provider is still working and polling continues.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, Self::Provisioning | Self::Reconciling | Self::Stopping)
    }

    /// Map the provider's status encoding onto a phase.
    ///
    /// Unknown encodings map to `Unspecified` rather than failing; the
    /// engine treats `Unspecified` actual state as a failure outcome.
    pub fn from_provider_status(status: &str) -> Self {
        match status {
            "PROVISIONING" => Self::Provisioning,
            "RUNNING" => Self::Running,
            "RECONCILING" => Self::Reconciling,
            "STOPPING" => Self::Stopping,
            "ERROR" => Self::Error,
            "DEGRADED" => Self::Degraded,
            _ => Self::Unspecified,
        }
    }
}

impl Default for ClusterPhase {
    fn default() -> Self {
        Self::Unspecified
    }
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "unspecified"),
            Self::Provisioning => write!(f, "provisioning"),
            Self::Running => write!(f, "running"),
            Self::Reconciling => write!(f, "reconciling"),
            Self::Stopping => write!(f, "stopping"),
            Self::Error => write!(f, "error"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

impl std::str::FromStr for ClusterPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unspecified" => Ok(Self::Unspecified),
            "provisioning" => Ok(Self::Provisioning),
            "running" => Ok(Self::Running),
            "reconciling" => Ok(Self::Reconciling),
            "stopping" => Ok(Self::Stopping),
            "error" => Ok(Self::Error),
            "degraded" => Ok(Self::Degraded),
            _ => Err(format!("Invalid cluster phase: {s}")),
        }
    }
}
