//! Decision engines for remedy.
//!
//! This crate turns signals into cluster mutations:
//!
//! - [`AnomalyDetector`] flags outliers in a metric batch by z-score, with a
//!   fixed-threshold fallback for short or flat histories
//! - [`HealingEngine`] maps a failure report to restart, rollback or replace
//!   and executes it through a [`remedy_kube::ClusterMutator`]
//! - [`ScalingEngine`] computes an autoscaler-bounded replica target and
//!   applies it
//!
//! Both engines may consult an optional [`Advisor`]. Its answer is bounded
//! by a deadline and validated; on any failure the engine uses its own rule
//! table, so decisions never fail because the advisor is down.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use remedy_core::{FailureReport, FailureType};
//! use remedy_engine::HealingEngine;
//! use remedy_kube::{K8sMutator, KubeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mutator = Arc::new(K8sMutator::new(KubeConfig::default()).await?);
//! let engine = HealingEngine::new(mutator);
//!
//! let record = engine.heal(&FailureReport::new("web-1", FailureType::Crash)).await;
//! println!("{}", record.explanation);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod advisor;
pub mod config;
pub mod detector;
pub mod error;
pub mod healing;
pub mod metrics;
pub mod scaling;

pub use advisor::{consult, AdviceRequest, AdviceResponse, Advisor, HttpAdvisor};
pub use config::{AdvisorConfig, DetectorConfig, EngineConfig, ScalingConfig};
pub use detector::{AnomalyDetector, GroupStats};
pub use error::{AdvisorError, MetricsError};
pub use healing::{fallback_strategy, DecisionSource, HealingEngine, HealingStage, StrategyDecision};
pub use metrics::{default_queries, MetricQuery, MetricsSource, PrometheusSource};
pub use scaling::ScalingEngine;
