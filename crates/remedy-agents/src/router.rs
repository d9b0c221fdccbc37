//! Event routing with per-subscriber fault isolation.
//!
//! [`EventRouter::route`] decodes a raw payload once, then hands the typed
//! event to every subscriber on its own task. A subscriber that errors or
//! panics is recorded in the [`RouteReport`]; the others still receive the
//! event. `route` only fails when the payload is rejected or every
//! subscriber failed. Dispatch order across subscribers is unspecified.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use futures::future::join_all;
use futures::FutureExt;
use parking_lot::RwLock;
use remedy_core::events::topics;
use remedy_core::{AgentId, Event};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::bus::{BusHandler, EventBus};
use crate::error::{AgentError, DeliveryFailure, Result, RouteError};
use crate::registry::AgentRegistry;

/// Outcome of one `route` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Subscribers that handled the event.
    pub delivered: Vec<AgentId>,
    /// Subscribers that did not.
    pub failures: Vec<DeliveryFailure>,
}

impl RouteReport {
    /// Whether any subscriber failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Maps topics to subscribing agents.
pub struct EventRouter {
    registry: Arc<AgentRegistry>,
    subscriptions: RwLock<HashMap<String, Vec<AgentId>>>,
}

impl EventRouter {
    /// Create a router that resolves agents through `registry`.
    #[must_use]
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe `agent_id` to `topic`. Subscribing twice has no effect.
    pub fn subscribe(&self, topic: &str, agent_id: AgentId) {
        let mut subs = self.subscriptions.write();
        let ids = subs.entry(topic.to_string()).or_default();
        if !ids.contains(&agent_id) {
            debug!(topic, agent_id = %agent_id, "Subscribed agent");
            ids.push(agent_id);
        }
    }

    /// Subscribe `agent` to every topic it declares.
    pub fn subscribe_agent(&self, agent: &dyn Agent) {
        for topic in agent.subscriptions() {
            self.subscribe(topic, agent.identity().id.clone());
        }
    }

    /// Remove every subscription held by `agent_id`.
    pub fn unsubscribe_agent(&self, agent_id: &AgentId) {
        let mut subs = self.subscriptions.write();
        for ids in subs.values_mut() {
            ids.retain(|id| id != agent_id);
        }
        subs.retain(|_, ids| !ids.is_empty());
    }

    /// Current subscribers of `topic`.
    #[must_use]
    pub fn subscribers(&self, topic: &str) -> Vec<AgentId> {
        self.subscriptions
            .read()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Every topic with at least one subscriber.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Decode `payload` for `topic` and dispatch it.
    ///
    /// # Errors
    ///
    /// Returns `RouteError::Payload` if the payload does not match the
    /// topic, and `RouteError::AllFailed` if there were subscribers and none
    /// handled the event.
    pub async fn route(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> std::result::Result<RouteReport, RouteError> {
        let event = match Event::decode(topic, payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(topic, error = %e, "Rejected event payload");
                return Err(e.into());
            }
        };
        self.dispatch(topic, event).await
    }

    /// Dispatch an already-typed event on `topic`.
    ///
    /// # Errors
    ///
    /// Returns `RouteError::AllFailed` if there were subscribers and none
    /// handled the event.
    pub async fn dispatch(
        &self,
        topic: &str,
        event: Event,
    ) -> std::result::Result<RouteReport, RouteError> {
        let subscribers = self.subscribers(topic);
        if subscribers.is_empty() {
            debug!(topic, "No subscribers for event");
            return Ok(RouteReport::default());
        }

        let event = Arc::new(event);
        let mut report = RouteReport::default();
        let mut tasks = Vec::with_capacity(subscribers.len());

        for agent_id in subscribers {
            let Some(agent) = self.registry.get(&agent_id) else {
                report.failures.push(failure(agent_id.clone(), &AgentError::NotFound(agent_id)));
                continue;
            };
            let event = Arc::clone(&event);
            let handle = tokio::spawn(async move { agent.handle_message(&event).await });
            tasks.push((agent_id, handle));
        }

        let (ids, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        for (agent_id, outcome) in ids.into_iter().zip(join_all(handles).await) {
            match outcome {
                Ok(Ok(())) => report.delivered.push(agent_id),
                Ok(Err(e)) => report.failures.push(failure(agent_id, &e)),
                Err(join_error) => report.failures.push(DeliveryFailure {
                    agent_id,
                    category: "handler_panicked",
                    error: join_error.to_string(),
                }),
            }
        }

        for f in &report.failures {
            warn!(
                topic,
                agent_id = %f.agent_id,
                category = f.category,
                error = %f.error,
                "Event delivery failed"
            );
        }

        if report.delivered.is_empty() {
            return Err(RouteError::AllFailed {
                topic: topic.to_string(),
                failures: report.failures,
            });
        }

        debug!(
            topic,
            delivered = report.delivered.len(),
            failed = report.failures.len(),
            "Event routed"
        );
        Ok(report)
    }

    /// Feed every well-known topic on `bus` into this router.
    ///
    /// Agents may subscribe before or after attaching. The bus holds only a
    /// weak reference, so dropping the router ends delivery.
    ///
    /// # Errors
    ///
    /// Returns an error if the bus rejects a subscription.
    pub async fn attach(self: &Arc<Self>, bus: &dyn EventBus) -> Result<()> {
        for topic in topics::ALL {
            bus.subscribe(topic, self.bus_handler(topic)).await?;
        }
        debug!(topics = topics::ALL.len(), "Attached router to bus");
        Ok(())
    }

    fn bus_handler(self: &Arc<Self>, topic: &str) -> BusHandler {
        let router: Weak<Self> = Arc::downgrade(self);
        let topic = topic.to_string();
        Arc::new(move |payload: Vec<u8>| {
            let router = router.clone();
            let topic = topic.clone();
            async move {
                let Some(router) = router.upgrade() else {
                    return;
                };
                if let Err(e) = router.route(&topic, &payload).await {
                    warn!(topic = %topic, category = e.category(), error = %e, "Failed to route bus event");
                }
            }
            .boxed()
        })
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("topics", &self.topics())
            .finish_non_exhaustive()
    }
}

fn failure(agent_id: AgentId, error: &AgentError) -> DeliveryFailure {
    DeliveryFailure {
        agent_id,
        category: error.category(),
        error: error.to_string(),
    }
}
