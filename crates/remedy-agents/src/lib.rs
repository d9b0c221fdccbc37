//! Agent runtime for remedy.
//!
//! This crate hosts the long-lived agents that react to cluster signals:
//!
//! - [`Agent`] is the lifecycle contract every agent implements, backed by
//!   a shared [`AgentCore`] that serializes message handling
//! - [`AgentRegistry`] tracks live agents by id and starts or stops them
//! - [`EventRouter`] decodes bus payloads and fans them out to subscribers
//!   on separate tasks, so one failing agent never blocks the others
//! - [`InMemoryBus`] is the in-process [`EventBus`]
//! - [`MonitoringAgent`], [`SelfHealingAgent`] and [`ScalingAgent`] wrap
//!   the decision engines from `remedy-engine`
//!
//! # Architecture
//!
//! ```text
//!   publisher ──► EventBus ──► EventRouter ──► Agent::handle_message
//!                    ▲              │
//!                    │              ▼
//!                    │        AgentRegistry
//!                    │
//!                    └── agents publish results (healing.completed, ...)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use remedy_agents::{AgentRegistry, EventBus, EventRouter, InMemoryBus, SelfHealingAgent};
//! use remedy_core::AgentId;
//! use remedy_engine::HealingEngine;
//! use remedy_kube::MockCluster;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = Arc::new(InMemoryBus::new());
//! let registry = Arc::new(AgentRegistry::new());
//! let router = Arc::new(EventRouter::new(registry.clone()));
//!
//! let agent = Arc::new(SelfHealingAgent::new(
//!     AgentId::new("self-healing")?,
//!     HealingEngine::new(Arc::new(MockCluster::new())),
//!     bus.clone(),
//! ));
//! registry.register(agent.clone())?;
//! router.subscribe_agent(agent.as_ref());
//! router.attach(bus.as_ref()).await?;
//! registry.start_all().await?;
//!
//! bus.publish("healing.required", br#"{"service_id":"web-1","failure_type":"crash"}"#.to_vec())
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod agents;
pub mod bus;
pub mod error;
pub mod health;
pub mod registry;
pub mod router;

pub use agent::{Agent, AgentCore};
pub use agents::{MonitoringAgent, ScalingAgent, SelfHealingAgent};
pub use bus::{BusHandler, EventBus, InMemoryBus};
pub use error::{AgentError, DeliveryFailure, Result, RouteError};
pub use health::SystemHealth;
pub use registry::AgentRegistry;
pub use router::{EventRouter, RouteReport};
