//! Common error types for remedy.

use crate::agent::AgentState;
use crate::ids::{AgentId, IdError};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors shared across the remedy crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// The requested lifecycle transition is not allowed.
    #[error("invalid state transition for agent {agent_id}: cannot transition from {from} to {to}")]
    InvalidTransition {
        /// The agent being transitioned.
        agent_id: AgentId,
        /// The current state.
        from: AgentState,
        /// The requested target state.
        to: AgentState,
    },

    /// An event payload did not match the shape its topic requires.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

impl CoreError {
    /// Check if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        false
    }

    /// Short category name used in user-visible reasoning.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::InvalidId(_) => "invalid_identifier",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Payload(_) => "malformed_payload",
        }
    }
}

/// Errors raised while validating event payloads at the routing boundary.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// No event variant is bound to this topic.
    #[error("unknown event topic: {0}")]
    UnknownTopic(String),

    /// The payload could not be decoded for the topic.
    #[error("malformed payload for topic {topic}: {source}")]
    Malformed {
        /// The topic the payload arrived on.
        topic: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// The event could not be encoded.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors raised while loading configuration at startup.
///
/// These are fatal: a process that cannot read its configuration must not
/// start making cluster mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is missing.
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// The variable name.
        key: &'static str,
        /// The raw value.
        value: String,
    },
}

impl ConfigError {
    /// Configuration errors are fatal and never retried.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        false
    }

    /// Short category name used in user-visible reasoning.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        "configuration_error"
    }

    /// Read an optional environment variable and parse it.
    ///
    /// An unset variable yields `Ok(None)`; a set but unparsable one is an error.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the value cannot be parsed.
    pub fn parse_env<T: std::str::FromStr>(key: &'static str) -> std::result::Result<Option<T>, Self> {
        match std::env::var(key) {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| Self::Invalid { key, value: raw }),
            Err(_) => Ok(None),
        }
    }
}
