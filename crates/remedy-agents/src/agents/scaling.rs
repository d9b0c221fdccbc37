//! Scaling agent.

use std::sync::Arc;

use async_trait::async_trait;
use remedy_core::events::topics;
use remedy_core::{AgentId, AgentIdentity, Event, ScaleRequiredEvent, ScalingRecord};
use remedy_engine::ScalingEngine;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentCore};
use crate::bus::EventBus;
use crate::error::Result;

/// Adjusts replica counts and publishes `scaling.completed`.
pub struct ScalingAgent {
    core: AgentCore,
    engine: ScalingEngine,
    bus: Arc<dyn EventBus>,
}

impl ScalingAgent {
    /// Create the agent.
    #[must_use]
    pub fn new(id: AgentId, engine: ScalingEngine, bus: Arc<dyn EventBus>) -> Self {
        let identity = AgentIdentity::new(
            id,
            "Scaling Agent",
            "Scales services up or down based on load",
        );
        Self {
            core: AgentCore::new(identity),
            engine,
            bus,
        }
    }

    /// Scale one service and publish the record.
    ///
    /// # Errors
    ///
    /// Returns an error only if the record cannot be published.
    pub async fn scale(&self, request: &ScaleRequiredEvent) -> Result<ScalingRecord> {
        let record = self.engine.scale_service(request).await;

        if record.result.success {
            info!(
                service_id = %record.result.service_id,
                action = %record.result.action,
                from = record.result.previous_replicas,
                to = record.result.new_replicas,
                "Scaling complete"
            );
        } else {
            warn!(
                service_id = %record.result.service_id,
                error = record.result.error.as_deref().unwrap_or_default(),
                "Scaling failed"
            );
        }

        self.bus
            .publish_event(&Event::ScalingCompleted(record.clone()))
            .await?;
        Ok(record)
    }
}

#[async_trait]
impl Agent for ScalingAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn subscriptions(&self) -> &'static [&'static str] {
        &[topics::SCALE_REQUIRED, topics::THRESHOLD_EXCEEDED]
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        match event {
            Event::ScaleRequired(request) => self.scale(request).await.map(|_| ()),
            other => {
                debug!(agent_id = %self.core.id(), topic = other.topic(), "Ignoring event");
                Ok(())
            }
        }
    }
}
