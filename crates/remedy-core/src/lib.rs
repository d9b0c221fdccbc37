//! Core types for the remedy control plane.
//!
//! This crate provides the vocabulary shared by every other remedy crate:
//!
//! - **Identifiers**: [`AgentId`] slugs
//! - **Data model**: failure reports, healing/scaling results, metric samples, anomalies
//! - **Events**: the well-known bus topics and the typed [`Event`] sum type
//! - **Lifecycle**: the agent state machine
//! - **Explanations**: the one-sentence decision explanation format
//!
//! # Example
//!
//! ```
//! use remedy_core::{Event, FailureType};
//! use remedy_core::events::topics;
//!
//! let payload = br#"{"service_id":"web-1","failure_type":"crash"}"#;
//! let event = Event::decode(topics::HEALING_REQUIRED, payload).unwrap();
//!
//! let Event::FailureDetected(report) = event else { unreachable!() };
//! assert_eq!(report.failure_type, FailureType::Crash);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod agent;
pub mod error;
pub mod events;
pub mod explain;
pub mod healing;
pub mod ids;
pub mod lifecycle;
pub mod metrics;
mod millis;
pub mod scaling;

pub use agent::{AgentIdentity, AgentState, HealthStatus};
pub use error::{ConfigError, CoreError, PayloadError, Result};
pub use events::{Event, HealingRecord, ScaleRequiredEvent, ScalingRecord};
pub use explain::format_explanation;
pub use healing::{FailureReport, FailureType, HealingAction, HealingResult};
pub use ids::{AgentId, IdError};
pub use metrics::{Anomaly, MetricSample, Severity};
pub use scaling::{clamp_replicas, ReplicaBounds, ScalingAction, ScalingRequest, ScalingResult};
