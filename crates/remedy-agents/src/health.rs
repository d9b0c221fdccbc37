//! System-wide health aggregation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use remedy_core::{AgentId, HealthStatus};
use serde::Serialize;

use crate::registry::AgentRegistry;

/// Health of every registered agent at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    /// True iff at least one agent is registered and all are healthy.
    pub overall_healthy: bool,
    /// Per-agent status, keyed by id.
    pub agents: BTreeMap<AgentId, HealthStatus>,
    /// When the snapshot was taken.
    pub checked_at: DateTime<Utc>,
}

impl SystemHealth {
    /// Check every agent in a registry snapshot.
    ///
    /// Never waits on an agent's lifecycle; one mid-transition reports the
    /// state it is in.
    #[must_use]
    pub fn collect(registry: &AgentRegistry) -> Self {
        let agents: BTreeMap<AgentId, HealthStatus> = registry
            .get_all()
            .into_iter()
            .map(|(id, agent)| (id, agent.health_check()))
            .collect();

        Self {
            overall_healthy: !agents.is_empty() && agents.values().all(|s| s.healthy),
            agents,
            checked_at: Utc::now(),
        }
    }

    /// Ids of agents that are not healthy.
    #[must_use]
    pub fn unhealthy(&self) -> Vec<&AgentId> {
        self.agents
            .iter()
            .filter(|(_, status)| !status.healthy)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentCore};
    use crate::error::Result;
    use async_trait::async_trait;
    use remedy_core::{AgentIdentity, AgentState, Event};
    use std::sync::Arc;

    struct Idle(AgentCore);

    #[async_trait]
    impl Agent for Idle {
        fn core(&self) -> &AgentCore {
            &self.0
        }

        fn subscriptions(&self) -> &'static [&'static str] {
            &[]
        }

        async fn on_event(&self, _event: &Event) -> Result<()> {
            Ok(())
        }
    }

    fn idle(id: &str) -> Arc<Idle> {
        Arc::new(Idle(AgentCore::new(AgentIdentity::new(
            AgentId::new(id).unwrap(),
            id,
            "",
        ))))
    }

    #[test]
    fn empty_registry_is_not_healthy() {
        let health = SystemHealth::collect(&AgentRegistry::new());
        assert!(!health.overall_healthy);
        assert!(health.agents.is_empty());
    }

    #[tokio::test]
    async fn one_stopped_agent_makes_system_unhealthy() {
        let registry = AgentRegistry::new();
        let a = idle("a");
        let b = idle("b");
        registry.register(a.clone()).unwrap();
        registry.register(b.clone()).unwrap();

        registry.start_all().await.unwrap();
        assert!(SystemHealth::collect(&registry).overall_healthy);

        b.stop().await.unwrap();
        let health = SystemHealth::collect(&registry);
        assert!(!health.overall_healthy);
        assert_eq!(health.unhealthy(), vec![&AgentId::new("b").unwrap()]);
        assert_eq!(health.agents[&AgentId::new("b").unwrap()].state, AgentState::Stopped);
    }

    #[tokio::test]
    async fn serializes_with_string_keys() {
        let registry = AgentRegistry::new();
        registry.register(idle("monitor")).unwrap();
        registry.start_all().await.unwrap();

        let json = serde_json::to_value(SystemHealth::collect(&registry)).unwrap();
        assert_eq!(json["overall_healthy"], true);
        assert_eq!(json["agents"]["monitor"]["state"], "running");
    }
}
