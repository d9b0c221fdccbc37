//! The agent registry.
//!
//! The registry is the only way to find an agent. Its map sits behind a
//! read-write lock, so [`AgentRegistry::get_all`] always sees whole
//! registrations. Lifecycle calls on one agent are serialized through a
//! per-agent async lock; different agents start and stop independently.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use remedy_core::lifecycle::{can_start, can_stop};
use remedy_core::AgentId;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::error::{AgentError, Result};

struct Registration {
    agent: Arc<dyn Agent>,
    lifecycle: Arc<tokio::sync::Mutex<()>>,
}

/// Tracks live agents by ID.
#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<AgentId, Registration>>,
}

impl AgentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its identity's ID.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::DuplicateId` if the ID is taken; the existing
    /// registration is left untouched.
    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let id = agent.identity().id.clone();
        let mut agents = self.agents.write();
        if agents.contains_key(&id) {
            return Err(AgentError::DuplicateId(id));
        }
        info!(agent_id = %id, name = %agent.identity().name, "Registered agent");
        agents.insert(
            id,
            Registration {
                agent,
                lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            },
        );
        Ok(())
    }

    /// Look up an agent.
    #[must_use]
    pub fn get(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.agents.read().get(id).map(|r| Arc::clone(&r.agent))
    }

    /// A snapshot of every registered agent.
    #[must_use]
    pub fn get_all(&self) -> HashMap<AgentId, Arc<dyn Agent>> {
        self.agents
            .read()
            .iter()
            .map(|(id, r)| (id.clone(), Arc::clone(&r.agent)))
            .collect()
    }

    /// Remove an agent and return it. The agent is not stopped.
    pub fn deregister(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        let removed = self.agents.write().remove(id).map(|r| r.agent);
        if removed.is_some() {
            info!(agent_id = %id, "Deregistered agent");
        }
        removed
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    /// Whether no agents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.read().is_empty()
    }

    /// Start one agent.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::NotFound` for an unknown ID, or the agent's
    /// start error.
    pub async fn start_agent(&self, id: &AgentId) -> Result<()> {
        let (agent, lifecycle) = self.lifecycle_handle(id)?;
        let _serial = lifecycle.lock().await;
        agent.start().await
    }

    /// Stop one agent.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::NotFound` for an unknown ID, or the agent's
    /// stop error.
    pub async fn stop_agent(&self, id: &AgentId) -> Result<()> {
        let (agent, lifecycle) = self.lifecycle_handle(id)?;
        let _serial = lifecycle.lock().await;
        agent.stop().await
    }

    /// Start every registered agent that is not already started.
    ///
    /// Every agent is attempted even if an earlier one fails. Agents already
    /// running are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first start error after all agents were attempted.
    pub async fn start_all(&self) -> Result<()> {
        let mut first_error = None;
        for id in self.sorted_ids() {
            let Ok((agent, lifecycle)) = self.lifecycle_handle(&id) else {
                continue;
            };
            let _serial = lifecycle.lock().await;
            let state = agent.state();
            if !can_start(state) {
                debug!(agent_id = %id, state = %state, "Agent not startable, skipping");
                continue;
            }
            if let Err(e) = agent.start().await {
                warn!(agent_id = %id, category = e.category(), error = %e, "Failed to start agent");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop every registered agent that has something to stop. Failures are
    /// logged.
    pub async fn stop_all(&self) {
        for id in self.sorted_ids() {
            let Ok((agent, lifecycle)) = self.lifecycle_handle(&id) else {
                continue;
            };
            let _serial = lifecycle.lock().await;
            let state = agent.state();
            if !can_stop(state) {
                debug!(agent_id = %id, state = %state, "Agent not running, skipping stop");
                continue;
            }
            if let Err(e) = agent.stop().await {
                warn!(agent_id = %id, category = e.category(), error = %e, "Failed to stop agent");
            }
        }
    }

    fn lifecycle_handle(
        &self,
        id: &AgentId,
    ) -> Result<(Arc<dyn Agent>, Arc<tokio::sync::Mutex<()>>)> {
        self.agents
            .read()
            .get(id)
            .map(|r| (Arc::clone(&r.agent), Arc::clone(&r.lifecycle)))
            .ok_or_else(|| AgentError::NotFound(id.clone()))
    }

    fn sorted_ids(&self) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self.agents.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.sorted_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentCore;
    use async_trait::async_trait;
    use remedy_core::{AgentIdentity, AgentState, Event};

    struct Idle {
        core: AgentCore,
    }

    impl Idle {
        fn arc(id: &str, name: &str) -> Arc<dyn Agent> {
            Arc::new(Self {
                core: AgentCore::new(AgentIdentity::new(AgentId::new(id).unwrap(), name, "")),
            })
        }
    }

    #[async_trait]
    impl Agent for Idle {
        fn core(&self) -> &AgentCore {
            &self.core
        }

        fn subscriptions(&self) -> &'static [&'static str] {
            &[]
        }

        async fn on_event(&self, _event: &Event) -> Result<()> {
            Ok(())
        }
    }

    fn id(s: &str) -> AgentId {
        AgentId::new(s).unwrap()
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let registry = AgentRegistry::new();
        registry.register(Idle::arc("healer", "first")).unwrap();

        let err = registry.register(Idle::arc("healer", "second")).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateId(ref d) if d.as_str() == "healer"));

        let kept = registry.get(&id("healer")).unwrap();
        assert_eq!(kept.identity().name, "first");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn snapshot_is_detached() {
        let registry = AgentRegistry::new();
        registry.register(Idle::arc("a", "A")).unwrap();
        let snapshot = registry.get_all();

        registry.register(Idle::arc("b", "B")).unwrap();
        assert!(registry.deregister(&id("a")).is_some());

        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key(&id("a")));
        assert_eq!(registry.get_all().len(), 1);
        assert!(registry.deregister(&id("a")).is_none());
    }

    #[tokio::test]
    async fn start_and_stop_all() {
        let registry = AgentRegistry::new();
        registry.register(Idle::arc("a", "A")).unwrap();
        registry.register(Idle::arc("b", "B")).unwrap();

        registry.start_all().await.unwrap();
        for agent in registry.get_all().values() {
            assert_eq!(agent.state(), AgentState::Running);
        }

        registry.stop_all().await;
        for agent in registry.get_all().values() {
            assert_eq!(agent.state(), AgentState::Stopped);
        }
    }

    #[tokio::test]
    async fn start_all_skips_running_agents() {
        let registry = AgentRegistry::new();
        registry.register(Idle::arc("a", "A")).unwrap();
        registry.register(Idle::arc("b", "B")).unwrap();

        registry.start_agent(&id("a")).await.unwrap();
        registry.start_all().await.unwrap();
        for agent in registry.get_all().values() {
            assert_eq!(agent.state(), AgentState::Running);
        }
    }

    #[tokio::test]
    async fn stop_all_leaves_unstarted_agents_alone() {
        let registry = AgentRegistry::new();
        registry.register(Idle::arc("a", "A")).unwrap();
        registry.register(Idle::arc("b", "B")).unwrap();

        registry.start_agent(&id("a")).await.unwrap();
        registry.stop_all().await;
        assert_eq!(registry.get(&id("a")).unwrap().state(), AgentState::Stopped);
        assert_eq!(registry.get(&id("b")).unwrap().state(), AgentState::Created);
    }

    #[tokio::test]
    async fn unknown_agent() {
        let registry = AgentRegistry::new();
        let err = registry.start_agent(&id("ghost")).await.unwrap_err();
        assert_eq!(err.category(), "agent_not_found");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_starts_are_serialized() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register(Idle::arc("a", "A")).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.start_agent(&id("a")).await })
            })
            .collect();

        let mut started = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(registry.get(&id("a")).unwrap().state(), AgentState::Running);
    }
}
