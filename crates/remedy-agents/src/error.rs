//! Error types for agents, the registry and the router.

use remedy_core::{AgentId, AgentState, CoreError, PayloadError};
use remedy_engine::MetricsError;
use thiserror::Error;

/// A result type using `AgentError`.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by agents and the registry.
#[derive(Debug, Error)]
pub enum AgentError {
    /// An agent with this ID is already registered.
    #[error("agent already registered: {0}")]
    DuplicateId(AgentId),

    /// No agent with this ID is registered.
    #[error("agent not found: {0}")]
    NotFound(AgentId),

    /// The agent is not running and cannot take events.
    #[error("agent {agent_id} is {state} and does not accept events")]
    NotRunning {
        /// The agent that rejected the event.
        agent_id: AgentId,
        /// Its state at the time.
        state: AgentState,
    },

    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Lifecycle(#[from] CoreError),

    /// An event could not be encoded or decoded.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Publishing on the event bus failed.
    #[error("event bus error: {0}")]
    Bus(String),

    /// The metrics source failed.
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Agent-specific setup or handling failed.
    #[error("agent {agent_id} failed: {message}")]
    Handler {
        /// The failing agent.
        agent_id: AgentId,
        /// What went wrong.
        message: String,
    },
}

impl AgentError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Bus(_) => true,
            Self::Metrics(e) => e.is_retriable(),
            Self::DuplicateId(_)
            | Self::NotFound(_)
            | Self::NotRunning { .. }
            | Self::Lifecycle(_)
            | Self::Payload(_)
            | Self::Handler { .. } => false,
        }
    }

    /// Short category name used in log fields and delivery reports.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::DuplicateId(_) => "duplicate_registration",
            Self::NotFound(_) => "agent_not_found",
            Self::NotRunning { .. } => "agent_not_running",
            Self::Lifecycle(e) => e.category(),
            Self::Payload(_) => "malformed_payload",
            Self::Bus(_) => "bus_error",
            Self::Metrics(e) => e.category(),
            Self::Handler { .. } => "handler_error",
        }
    }
}

/// One subscriber that did not handle an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// The subscriber.
    pub agent_id: AgentId,
    /// Error category, or `handler_panicked`.
    pub category: &'static str,
    /// Error text.
    pub error: String,
}

/// Errors returned by [`crate::router::EventRouter::route`].
#[derive(Debug, Error)]
pub enum RouteError {
    /// The payload was rejected before dispatch.
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// Every subscriber failed.
    #[error("all {} subscribers of {topic} failed", failures.len())]
    AllFailed {
        /// The routed topic.
        topic: String,
        /// One entry per subscriber.
        failures: Vec<DeliveryFailure>,
    },
}

impl RouteError {
    /// Check if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::AllFailed { .. })
    }

    /// Short category name used in log fields.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Payload(_) => "malformed_payload",
            Self::AllFailed { .. } => "delivery_failed",
        }
    }
}
