//! Self-healing agent.

use std::sync::Arc;

use async_trait::async_trait;
use remedy_core::events::topics;
use remedy_core::{AgentId, AgentIdentity, Event, FailureReport, HealingRecord};
use remedy_engine::HealingEngine;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentCore};
use crate::bus::EventBus;
use crate::error::Result;

/// Heals failed services and publishes `healing.completed`.
pub struct SelfHealingAgent {
    core: AgentCore,
    engine: HealingEngine,
    bus: Arc<dyn EventBus>,
}

impl SelfHealingAgent {
    /// Create the agent.
    #[must_use]
    pub fn new(id: AgentId, engine: HealingEngine, bus: Arc<dyn EventBus>) -> Self {
        let identity = AgentIdentity::new(
            id,
            "Self-Healing Agent",
            "Detects failed services and restarts, rolls back or replaces them",
        );
        Self {
            core: AgentCore::new(identity),
            engine,
            bus,
        }
    }

    /// Heal one failure and publish the record.
    ///
    /// # Errors
    ///
    /// Returns an error only if the record cannot be published; a failed
    /// remediation is reported inside the record.
    pub async fn heal(&self, report: &FailureReport) -> Result<HealingRecord> {
        let record = self.engine.heal(report).await;

        if record.result.success {
            info!(
                service_id = %record.result.service_id,
                action = %record.result.action,
                duration_ms = u64::try_from(record.result.duration.as_millis()).unwrap_or(u64::MAX),
                "Service healed"
            );
        } else {
            warn!(
                service_id = %record.result.service_id,
                action = %record.result.action,
                reasoning = %record.result.reasoning,
                "Healing failed"
            );
        }

        self.bus
            .publish_event(&Event::HealingCompleted(record.clone()))
            .await?;
        Ok(record)
    }
}

#[async_trait]
impl Agent for SelfHealingAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn subscriptions(&self) -> &'static [&'static str] {
        &[topics::HEALING_REQUIRED, topics::ERROR_DETECTED]
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        match event {
            Event::FailureDetected(report) => self.heal(report).await.map(|_| ()),
            other => {
                debug!(agent_id = %self.core.id(), topic = other.topic(), "Ignoring event");
                Ok(())
            }
        }
    }
}
