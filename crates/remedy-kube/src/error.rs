//! Error types for cluster mutations.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while mutating the cluster.
#[derive(Error, Debug)]
pub enum MutationError {
    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// No resource of the expected kind exists.
    #[error("{kind} not found: {name}")]
    ResourceNotFound {
        /// The kind(s) looked up.
        kind: &'static str,
        /// The resource name.
        name: String,
    },

    /// The deployment has no earlier revision to roll back to.
    #[error("no previous revision found for deployment {deployment}")]
    NoPreviousRevision {
        /// The deployment name.
        deployment: String,
    },

    /// The pod carries no `app` label, so its owner cannot be resolved.
    #[error("pod {pod} does not have an 'app' label")]
    MissingAppLabel {
        /// The pod name.
        pod: String,
    },

    /// A workload has no container to patch or read an image from.
    #[error("{kind} {name} has no container image")]
    MissingContainer {
        /// The resource kind.
        kind: &'static str,
        /// The resource name.
        name: String,
    },

    /// A call did not complete in time; the mutation may or may not have been applied.
    #[error("{operation} did not complete within {timeout:?}; mutation state unknown")]
    DeadlineExceeded {
        /// The operation that timed out.
        operation: &'static str,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Client configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MutationError {
    /// Check if this error is retriable.
    ///
    /// Transient infrastructure failures are retried by the caller with
    /// backoff, never inside the adapter.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::KubeApi(kube::Error::Api(e)) => e.code == 429 || e.code >= 500,
            Self::KubeApi(_) | Self::DeadlineExceeded { .. } => true,
            _ => false,
        }
    }

    /// Short category name used in user-visible reasoning.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::KubeApi(_) => "transient_infra_error",
            Self::ResourceNotFound { .. } => "resource_not_found",
            Self::NoPreviousRevision { .. } => "no_previous_revision",
            Self::MissingAppLabel { .. } | Self::MissingContainer { .. } => "invalid_resource",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Config(_) => "configuration_error",
        }
    }
}

/// A specialized Result type for cluster mutations.
pub type Result<T> = std::result::Result<T, MutationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_retriable_and_says_state_unknown() {
        let err = MutationError::DeadlineExceeded {
            operation: "set_replicas",
            timeout: Duration::from_secs(30),
        };
        assert!(err.is_retriable());
        assert_eq!(err.category(), "deadline_exceeded");
        assert!(err.to_string().contains("mutation state unknown"));
    }

    #[test]
    fn not_found_is_not_retried() {
        let err = MutationError::ResourceNotFound {
            kind: "Deployment/StatefulSet",
            name: "web".into(),
        };
        assert!(!err.is_retriable());
        assert_eq!(err.to_string(), "Deployment/StatefulSet not found: web");
    }
}
