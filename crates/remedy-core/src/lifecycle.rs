//! Agent lifecycle state machine.
//!
//! ```text
//!   ┌─────────┐     ┌──────────┐     ┌─────────┐     ┌──────────┐     ┌─────────┐
//!   │ Created │────▶│ Starting │────▶│ Running │────▶│ Stopping │────▶│ Stopped │
//!   └─────────┘     └────┬─────┘     └────┬────┘     └──────────┘     └────┬────┘
//!                        │                │               ▲                │
//!                        ▼                ▼               │                │
//!                   ┌─────────┐◀──────────┘               │                │
//!                   │  Error  │───────────────────────────┘                │
//!                   └────┬────┘                                            │
//!                        │            (restart)                            │
//!                        └──────────────────▶ Starting ◀───────────────────┘
//! ```
//!
//! Stopping never fails: once an agent enters `Stopping` it always reaches
//! `Stopped`, cleanup errors are logged by the agent instead.

use crate::agent::AgentState;
use crate::error::{CoreError, Result};
use crate::ids::AgentId;

/// Validates a state transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `CoreError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(agent_id: &AgentId, from: AgentState, to: AgentState) -> Result<AgentState> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(CoreError::InvalidTransition {
            agent_id: agent_id.clone(),
            from,
            to,
        })
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: AgentState, to: AgentState) -> bool {
    use AgentState::{Created, Error, Running, Starting, Stopped, Stopping};

    matches!(
        (from, to),
        // Fresh start and restarts
        (Created | Stopped | Error, Starting)
            | (Starting, Running | Error)
            | (Running, Stopping | Error)
            // A failed agent can still be shut down
            | (Error, Stopping)
            | (Stopping, Stopped)
    )
}

/// Returns true if `start` may be called from this state.
#[must_use]
pub const fn can_start(state: AgentState) -> bool {
    is_valid_transition(state, AgentState::Starting)
}

/// Returns true if `stop` has work to do from this state.
#[must_use]
pub const fn can_stop(state: AgentState) -> bool {
    is_valid_transition(state, AgentState::Stopping)
}

/// Returns true if the agent should receive events.
#[must_use]
pub const fn accepts_events(state: AgentState) -> bool {
    matches!(state, AgentState::Running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_path_is_valid() {
        use AgentState::*;

        assert!(is_valid_transition(Created, Starting));
        assert!(is_valid_transition(Starting, Running));
        assert!(is_valid_transition(Running, Stopping));
        assert!(is_valid_transition(Stopping, Stopped));
    }

    #[test]
    fn restarts_are_valid() {
        use AgentState::*;

        assert!(is_valid_transition(Stopped, Starting));
        assert!(is_valid_transition(Error, Starting));
    }

    #[test]
    fn backwards_and_skips_are_invalid() {
        use AgentState::*;

        assert!(!is_valid_transition(Running, Starting));
        assert!(!is_valid_transition(Created, Running));
        assert!(!is_valid_transition(Stopped, Running));
        assert!(!is_valid_transition(Stopping, Error));
        assert!(!is_valid_transition(Stopped, Stopping));
    }

    #[test]
    fn validate_transition_err() {
        let agent_id = AgentId::new("scaling-agent").unwrap();
        let result = validate_transition(&agent_id, AgentState::Stopped, AgentState::Running);

        match result {
            Err(CoreError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, AgentState::Stopped);
                assert_eq!(to, AgentState::Running);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    #[test]
    fn start_and_stop_eligibility() {
        assert!(can_start(AgentState::Created));
        assert!(can_start(AgentState::Error));
        assert!(!can_start(AgentState::Running));

        assert!(can_stop(AgentState::Running));
        assert!(can_stop(AgentState::Error));
        assert!(!can_stop(AgentState::Created));
        assert!(!can_stop(AgentState::Stopped));
    }

    #[test]
    fn only_running_accepts_events() {
        assert!(accepts_events(AgentState::Running));
        assert!(!accepts_events(AgentState::Starting));
        assert!(!accepts_events(AgentState::Stopping));
    }
}
