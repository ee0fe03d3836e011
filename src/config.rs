use crate::error::{CloudControlError, Result};
use std::time::Duration;

/// Tunable knobs for the reconciliation core.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudControlConfig {
    /// Interval between actual-state polls inside a convergence wait
    pub poll_interval_ms: u64,
    /// Steady-state resync delay returned after a drift-free confirmation
    pub resync_interval_ms: u64,
    /// Requeue delay after a transiently-classified provider error
    pub transient_backoff_ms: u64,
    /// Worker routines draining the reconcile queue
    pub worker_count: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for CloudControlConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            resync_interval_ms: 60_000,
            transient_backoff_ms: 5_000,
            worker_count: 2,
            event_capacity: 1_000,
        }
    }
}

impl CloudControlConfig {
    /// Build a config from `CLOUDCONTROL_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("CLOUDCONTROL_POLL_INTERVAL_MS") {
            config.poll_interval_ms = v.parse().map_err(|e| {
                CloudControlError::Configuration(format!("Invalid poll_interval_ms: {e}"))
            })?;
        }

        if let Ok(v) = std::env::var("CLOUDCONTROL_RESYNC_INTERVAL_MS") {
            config.resync_interval_ms = v.parse().map_err(|e| {
                CloudControlError::Configuration(format!("Invalid resync_interval_ms: {e}"))
            })?;
        }

        if let Ok(v) = std::env::var("CLOUDCONTROL_TRANSIENT_BACKOFF_MS") {
            config.transient_backoff_ms = v.parse().map_err(|e| {
                CloudControlError::Configuration(format!("Invalid transient_backoff_ms: {e}"))
            })?;
        }

        if let Ok(v) = std::env::var("CLOUDCONTROL_WORKER_COUNT") {
            config.worker_count = v.parse().map_err(|e| {
                CloudControlError::Configuration(format!("Invalid worker_count: {e}"))
            })?;
        }

        if let Ok(v) = std::env::var("CLOUDCONTROL_EVENT_CAPACITY") {
            config.event_capacity = v.parse().map_err(|e| {
                CloudControlError::Configuration(format!("Invalid event_capacity: {e}"))
            })?;
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms)
    }

    pub fn transient_backoff(&self) -> Duration {
        Duration::from_millis(self.transient_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CloudControlConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.resync_interval(), Duration::from_secs(60));
        assert_eq!(config.transient_backoff(), Duration::from_secs(5));
        assert_eq!(config.worker_count, 2);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        std::env::set_var("CLOUDCONTROL_WORKER_COUNT", "many");
        let err = CloudControlConfig::from_env().unwrap_err();
        assert!(matches!(err, CloudControlError::Configuration(_)));
        std::env::remove_var("CLOUDCONTROL_WORKER_COUNT");
    }
}
