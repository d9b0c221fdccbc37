//! Error types for the decision engines and their external collaborators.

use std::time::Duration;

use thiserror::Error;

/// Reasons the external advisor could not be used.
///
/// These never leave the engine: [`crate::advisor::consult`] logs them and
/// the engine falls back to its rule table.
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// The advisor did not answer before the deadline.
    #[error("advisor timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be sent or the response not read.
    #[error("advisor request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The advisor answered with a non-success status.
    #[error("advisor returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error text from the body, if any.
        message: String,
    },

    /// The response was missing a field or carried an unknown action.
    #[error("malformed advisor response: {0}")]
    Malformed(String),

    /// The advisor recommended doing nothing.
    #[error("advisor returned nothing actionable ({0})")]
    NothingActionable(String),
}

impl AdvisorError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Malformed(_) | Self::NothingActionable(_) => false,
        }
    }

    /// Short category name used in log fields.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "advisor_timeout",
            Self::Transport(_) | Self::Status { .. } => "advisor_unavailable",
            Self::Malformed(_) => "advisor_malformed",
            Self::NothingActionable(_) => "advisor_no_action",
        }
    }
}

/// Errors from the metrics source.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The request could not be sent or the response not read.
    #[error("metrics request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("metrics backend returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The backend reported a query error.
    #[error("query {query} failed: {error}")]
    Query {
        /// The metric name being fetched.
        query: String,
        /// The backend's error text.
        error: String,
    },
}

impl MetricsError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Query { .. } => false,
        }
    }

    /// Short category name used in log fields.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) | Self::Status { .. } => "transient_infra_error",
            Self::Query { .. } => "metrics_query_error",
        }
    }
}
