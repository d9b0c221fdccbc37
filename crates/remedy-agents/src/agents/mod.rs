//! The concrete agents.
//!
//! Each agent wraps one engine, listens on its topics, and publishes its
//! decisions back onto the bus.

pub mod healing;
pub mod monitoring;
pub mod scaling;

pub use healing::SelfHealingAgent;
pub use monitoring::MonitoringAgent;
pub use scaling::ScalingAgent;
