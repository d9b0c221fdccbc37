//! The agent lifecycle contract.
//!
//! Concrete agents embed an [`AgentCore`] and implement the `on_*` hooks.
//! The provided methods of [`Agent`] run the state machine around them:
//!
//! - `start`: `→ Starting`, `init`, `on_start`, `→ Running`; any failure
//!   leaves the agent in `Error` and is returned so the caller may retry
//! - `stop`: `→ Stopping`, `on_stop`, `→ Stopped`; cleanup errors are
//!   logged and never returned
//! - `handle_message`: one event at a time per agent, only while `Running`
//!
//! Lifecycle calls on one agent are serialized by the registry, not here.

use async_trait::async_trait;
use parking_lot::Mutex;
use remedy_core::lifecycle::{accepts_events, validate_transition};
use remedy_core::{AgentId, AgentIdentity, AgentState, Event, HealthStatus};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};

/// State shared by every agent implementation.
#[derive(Debug)]
pub struct AgentCore {
    identity: AgentIdentity,
    state: Mutex<AgentState>,
    last_error: Mutex<Option<String>>,
    gate: tokio::sync::Mutex<()>,
}

impl AgentCore {
    /// Create a core in the `Created` state.
    #[must_use]
    pub fn new(identity: AgentIdentity) -> Self {
        Self {
            identity,
            state: Mutex::new(AgentState::Created),
            last_error: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The agent's identity.
    #[must_use]
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// The agent's ID.
    #[must_use]
    pub fn id(&self) -> &AgentId {
        &self.identity.id
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> AgentState {
        *self.state.lock()
    }

    /// The most recent recorded error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Move to `to` if the lifecycle table allows it.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Lifecycle` if the transition is not allowed.
    pub fn transition(&self, to: AgentState) -> Result<()> {
        let mut state = self.state.lock();
        let from = *state;
        *state = validate_transition(self.id(), from, to)?;
        debug!(agent_id = %self.id(), from = %from, to = %to, "Agent state changed");
        Ok(())
    }

    /// Record an error for health reporting.
    pub fn record_error(&self, error: &AgentError) {
        *self.last_error.lock() = Some(error.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.lock() = None;
    }

    /// Serializes event handling for this agent.
    ///
    /// Hold the guard for the whole of any work that touches agent state.
    pub async fn gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    /// Health derived from the current state and last error.
    #[must_use]
    pub fn health(&self) -> HealthStatus {
        let last_error = self.last_error();
        HealthStatus::from_state(self.state(), last_error.as_deref())
    }
}

/// An autonomous unit that reacts to events.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The shared lifecycle state.
    fn core(&self) -> &AgentCore;

    /// Topics this agent wants delivered.
    fn subscriptions(&self) -> &'static [&'static str];

    /// Handle one event. Called only while `Running`, one call at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be handled.
    async fn on_event(&self, event: &Event) -> Result<()>;

    /// Agent-specific setup run by `start`.
    ///
    /// # Errors
    ///
    /// Returns an error if setup failed; the agent moves to `Error`.
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Agent-specific cleanup run by `stop`. Errors are logged only.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup failed.
    async fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    /// The agent's identity.
    fn identity(&self) -> &AgentIdentity {
        self.core().identity()
    }

    /// The current lifecycle state.
    fn state(&self) -> AgentState {
        self.core().state()
    }

    /// Health derived from the current state.
    fn health_check(&self) -> HealthStatus {
        self.core().health()
    }

    /// Validate configuration before setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent cannot run.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Start the agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the agent cannot start from its current state,
    /// or if `init` or `on_start` fails. In the latter case the agent is
    /// left in `Error` and `start` may be called again.
    async fn start(&self) -> Result<()> {
        let core = self.core();
        core.transition(AgentState::Starting)?;

        let setup = match self.init().await {
            Ok(()) => self.on_start().await,
            Err(e) => Err(e),
        };

        match setup {
            Ok(()) => {
                core.transition(AgentState::Running)?;
                core.clear_error();
                info!(agent_id = %core.id(), "Agent started");
                Ok(())
            }
            Err(e) => {
                warn!(
                    agent_id = %core.id(),
                    category = e.category(),
                    error = %e,
                    "Agent failed to start"
                );
                core.record_error(&e);
                core.transition(AgentState::Error)?;
                Err(e)
            }
        }
    }

    /// Stop the agent. A no-op if it never ran or is already stopped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the agent is mid-start.
    async fn stop(&self) -> Result<()> {
        let core = self.core();
        if matches!(core.state(), AgentState::Created | AgentState::Stopped) {
            return Ok(());
        }
        core.transition(AgentState::Stopping)?;

        if let Err(e) = self.on_stop().await {
            warn!(
                agent_id = %core.id(),
                category = e.category(),
                error = %e,
                "Agent cleanup failed"
            );
            core.record_error(&e);
        }

        core.transition(AgentState::Stopped)?;
        info!(agent_id = %core.id(), "Agent stopped");
        Ok(())
    }

    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::NotRunning` outside `Running`, or the error from
    /// `on_event`.
    async fn handle_message(&self, event: &Event) -> Result<()> {
        let core = self.core();
        let _gate = core.gate().await;

        let state = core.state();
        if !accepts_events(state) {
            return Err(AgentError::NotRunning {
                agent_id: core.id().clone(),
                state,
            });
        }

        let result = self.on_event(event).await;
        if let Err(e) = &result {
            core.record_error(e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use remedy_core::{FailureReport, FailureType};

    struct Tracked {
        core: AgentCore,
        fail_start: AtomicBool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Tracked {
        fn new() -> Self {
            Self {
                core: AgentCore::new(AgentIdentity::new(
                    AgentId::new("tracked").unwrap(),
                    "Tracked",
                    "test agent",
                )),
                fail_start: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Agent for Tracked {
        fn core(&self) -> &AgentCore {
            &self.core
        }

        fn subscriptions(&self) -> &'static [&'static str] {
            &["healing.required"]
        }

        async fn on_start(&self) -> Result<()> {
            if self.fail_start.load(Ordering::SeqCst) {
                return Err(AgentError::Handler {
                    agent_id: self.core.id().clone(),
                    message: "no cluster".into(),
                });
            }
            Ok(())
        }

        async fn on_event(&self, _event: &Event) -> Result<()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event() -> Event {
        Event::FailureDetected(FailureReport::new("web-1", FailureType::Crash))
    }

    #[tokio::test]
    async fn start_then_stop() {
        let agent = Tracked::new();
        assert_eq!(agent.state(), AgentState::Created);
        assert!(!agent.health_check().healthy);

        agent.start().await.unwrap();
        assert_eq!(agent.state(), AgentState::Running);
        assert!(agent.health_check().healthy);

        agent.stop().await.unwrap();
        assert_eq!(agent.state(), AgentState::Stopped);
        agent.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_start_can_be_retried() {
        let agent = Tracked::new();
        agent.fail_start.store(true, Ordering::SeqCst);

        let err = agent.start().await.unwrap_err();
        assert_eq!(err.category(), "handler_error");
        assert_eq!(agent.state(), AgentState::Error);
        let health = agent.health_check();
        assert!(!health.healthy);
        assert!(health.message.contains("no cluster"));

        agent.fail_start.store(false, Ordering::SeqCst);
        agent.start().await.unwrap();
        assert_eq!(agent.state(), AgentState::Running);
        assert_eq!(agent.core().last_error(), None);
    }

    #[tokio::test]
    async fn starting_twice_is_rejected() {
        let agent = Tracked::new();
        agent.start().await.unwrap();
        let err = agent.start().await.unwrap_err();
        assert_eq!(err.category(), "invalid_transition");
        assert_eq!(agent.state(), AgentState::Running);
    }

    #[tokio::test]
    async fn events_rejected_unless_running() {
        let agent = Tracked::new();
        let err = agent.handle_message(&event()).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::NotRunning {
                state: AgentState::Created,
                ..
            }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handler_runs_one_event_at_a_time() {
        let agent = Arc::new(Tracked::new());
        agent.start().await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let agent = agent.clone();
                tokio::spawn(async move { agent.handle_message(&event()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(agent.max_in_flight.load(Ordering::SeqCst), 1);
    }
}
