//! Event bus adapter.
//!
//! The bus moves raw bytes between topics and handlers. Delivery is
//! at-least-once per subscriber with no ordering across topics; payload
//! validation happens in the router, not here.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use parking_lot::RwLock;
use remedy_core::Event;
use tracing::debug;

use crate::error::Result;

/// A handler receiving raw payloads for one topic.
pub type BusHandler = Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Publish/subscribe transport.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Bus` if the transport rejects the message.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Register `handler` for `topic`.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Bus` if the subscription cannot be created.
    async fn subscribe(&self, topic: &str, handler: BusHandler) -> Result<()>;

    /// Encode `event` and publish it on its default topic.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or publishing fails.
    async fn publish_event(&self, event: &Event) -> Result<()> {
        let (topic, payload) = event.encode()?;
        self.publish(topic, payload).await
    }
}

/// An in-process bus.
///
/// `publish` returns once every handler for the topic has finished, which
/// keeps in-process chains deterministic.
#[derive(Default)]
pub struct InMemoryBus {
    handlers: RwLock<HashMap<String, Vec<BusHandler>>>,
}

impl InMemoryBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn handler_count(&self, topic: &str) -> usize {
        self.handlers.read().get(topic).map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let handlers = self.handlers.read().get(topic).cloned().unwrap_or_default();
        debug!(topic, handlers = handlers.len(), bytes = payload.len(), "Publishing event");
        join_all(handlers.iter().map(|h| h(payload.clone()))).await;
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: BusHandler) -> Result<()> {
        self.handlers
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let topics: Vec<String> = self.handlers.read().keys().cloned().collect();
        f.debug_struct("InMemoryBus").field("topics", &topics).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use remedy_core::{FailureReport, FailureType};

    fn recorder(log: Arc<Mutex<Vec<Vec<u8>>>>) -> BusHandler {
        Arc::new(move |payload| {
            let log = log.clone();
            async move { log.lock().push(payload) }.boxed()
        })
    }

    #[tokio::test]
    async fn delivers_to_every_handler_of_topic() {
        let bus = InMemoryBus::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("a", recorder(first.clone())).await.unwrap();
        bus.subscribe("a", recorder(second.clone())).await.unwrap();
        bus.subscribe("b", recorder(Arc::new(Mutex::new(Vec::new()))))
            .await
            .unwrap();

        bus.publish("a", b"x".to_vec()).await.unwrap();
        bus.publish("nobody", b"y".to_vec()).await.unwrap();

        assert_eq!(*first.lock(), vec![b"x".to_vec()]);
        assert_eq!(*second.lock(), vec![b"x".to_vec()]);
        assert_eq!(bus.handler_count("a"), 2);
    }

    #[tokio::test]
    async fn publish_event_uses_default_topic() {
        let bus = InMemoryBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("healing.required", recorder(log.clone()))
            .await
            .unwrap();

        let event = Event::FailureDetected(FailureReport::new("web-1", FailureType::Crash));
        bus.publish_event(&event).await.unwrap();

        let payloads = log.lock().clone();
        assert_eq!(payloads.len(), 1);
        assert_eq!(Event::decode("healing.required", &payloads[0]).unwrap(), event);
    }
}
