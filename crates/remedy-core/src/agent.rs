//! Agent identity, lifecycle state and health.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// Immutable identity of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Unique identifier, used as the registry key.
    pub id: AgentId,
    /// Human-readable name.
    pub name: String,
    /// What the agent does.
    pub description: String,
}

impl AgentIdentity {
    /// Create a new identity.
    #[must_use]
    pub fn new(id: AgentId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Lifecycle states for an agent.
///
/// See [`crate::lifecycle`] for the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Constructed, never started.
    #[default]
    Created,
    /// `start` in progress.
    Starting,
    /// Subscribed and handling events.
    Running,
    /// `stop` in progress.
    Stopping,
    /// Stopped; may be restarted.
    Stopped,
    /// Startup failed; may be restarted.
    Error,
}

impl AgentState {
    /// Return the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a single agent, derived from its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// True iff the agent is `Running`.
    pub healthy: bool,
    /// Current lifecycle state.
    pub state: AgentState,
    /// Human-readable detail (last error, if any).
    pub message: String,
    /// When the check was taken.
    pub checked_at: DateTime<Utc>,
}

impl HealthStatus {
    /// Derive health from a state and an optional last error.
    ///
    /// A recorded error does not make a `Running` agent unhealthy on its own;
    /// handler failures are reported in `message` only.
    #[must_use]
    pub fn from_state(state: AgentState, last_error: Option<&str>) -> Self {
        let message = match last_error {
            Some(err) if !err.is_empty() => err.to_string(),
            _ => format!("agent is {state}"),
        };
        Self {
            healthy: state == AgentState::Running,
            state,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_only_when_running() {
        for state in [
            AgentState::Created,
            AgentState::Starting,
            AgentState::Stopping,
            AgentState::Stopped,
            AgentState::Error,
        ] {
            assert!(!HealthStatus::from_state(state, None).healthy, "{state}");
        }
        assert!(HealthStatus::from_state(AgentState::Running, None).healthy);
    }

    #[test]
    fn health_message_prefers_last_error() {
        let status = HealthStatus::from_state(AgentState::Error, Some("bus unavailable"));
        assert_eq!(status.message, "bus unavailable");

        let status = HealthStatus::from_state(AgentState::Stopped, Some(""));
        assert_eq!(status.message, "agent is stopped");
    }

    #[test]
    fn state_serde_snake_case() {
        let json = serde_json::to_string(&AgentState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
