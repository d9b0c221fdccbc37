//! Types for the cluster mutation adapter.

use std::fmt;
use std::time::Duration;

use remedy_core::ConfigError;
use serde::{Deserialize, Serialize};

/// Kind of workload a replica patch landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkloadKind {
    /// `apps/v1` Deployment.
    Deployment,
    /// `apps/v1` StatefulSet.
    StatefulSet,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
        })
    }
}

/// What a rollback switched the deployment to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    /// The ReplicaSet rolled back to.
    pub replica_set: String,
    /// Its revision number.
    pub revision: u64,
    /// The image now on the deployment's first container.
    pub image: String,
    /// False if the deployment already ran that image and no patch was sent.
    pub patched: bool,
}

/// How the background pod-recreation watch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecreationOutcome {
    /// A replacement pod reached `Running`.
    Recreated {
        /// Name of the replacement pod.
        new_pod: String,
    },
    /// No replacement was observed before the deadline.
    TimedOut,
    /// The adapter shut down first.
    Cancelled,
}

/// Configuration for the cluster mutation adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeConfig {
    /// Namespace every call is scoped to.
    pub namespace: String,
    /// Deadline for a single API round-trip.
    pub api_timeout: Duration,
    /// How long the pod-recreation watch waits.
    pub ready_timeout: Duration,
    /// How often the pod-recreation watch polls.
    pub ready_poll_interval: Duration,
}

impl Default for KubeConfig {
    fn default() -> Self {
        Self {
            namespace: "self-healing-cloud".to_string(),
            api_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(5 * 60),
            ready_poll_interval: Duration::from_secs(5),
        }
    }
}

impl KubeConfig {
    /// Create a config with the given namespace.
    #[must_use]
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `KUBERNETES_NAMESPACE`: namespace to operate in
    /// - `KUBE_API_TIMEOUT_SECS`: per-call API deadline
    /// - `POD_READY_TIMEOUT_SECS`: pod-recreation watch deadline
    /// - `POD_READY_POLL_SECS`: pod-recreation poll interval
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("KUBERNETES_NAMESPACE") {
            if !val.trim().is_empty() {
                config.namespace = val.trim().to_string();
            }
        }
        if let Some(secs) = ConfigError::parse_env::<u64>("KUBE_API_TIMEOUT_SECS")? {
            config.api_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = ConfigError::parse_env::<u64>("POD_READY_TIMEOUT_SECS")? {
            config.ready_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = ConfigError::parse_env::<u64>("POD_READY_POLL_SECS")? {
            if secs == 0 {
                return Err(ConfigError::Invalid {
                    key: "POD_READY_POLL_SECS",
                    value: secs.to_string(),
                });
            }
            config.ready_poll_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kube_config_defaults() {
        let config = KubeConfig::default();
        assert_eq!(config.namespace, "self-healing-cloud");
        assert_eq!(config.api_timeout, Duration::from_secs(30));
        assert_eq!(config.ready_timeout, Duration::from_secs(300));
        assert_eq!(config.ready_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn with_namespace_keeps_timeouts() {
        let config = KubeConfig::with_namespace("prod");
        assert_eq!(config.namespace, "prod");
        assert_eq!(config.api_timeout, Duration::from_secs(30));
    }

    #[test]
    fn workload_kind_display() {
        assert_eq!(WorkloadKind::StatefulSet.to_string(), "StatefulSet");
    }
}
