//! Monitoring agent.
//!
//! Runs the anomaly detector over metric batches, whether they arrive on
//! `metrics.collected` or are pulled from a [`MetricsSource`]. Every anomaly
//! is published on `anomaly.detected`. A high-severity anomaly on a sample
//! labelled with a service also raises `threshold.exceeded` for that
//! service, once per batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remedy_core::events::topics;
use remedy_core::lifecycle::accepts_events;
use remedy_core::{
    AgentId, AgentIdentity, Anomaly, Event, MetricSample, ScaleRequiredEvent, Severity,
};
use remedy_engine::{AnomalyDetector, MetricQuery, MetricsSource};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentCore};
use crate::bus::EventBus;
use crate::error::{AgentError, Result};

/// Detects anomalies and raises scaling signals.
pub struct MonitoringAgent {
    core: AgentCore,
    detector: AnomalyDetector,
    bus: Arc<dyn EventBus>,
    source: Option<Arc<dyn MetricsSource>>,
    queries: Vec<MetricQuery>,
}

impl MonitoringAgent {
    /// Create the agent without a metrics source.
    #[must_use]
    pub fn new(id: AgentId, detector: AnomalyDetector, bus: Arc<dyn EventBus>) -> Self {
        let identity = AgentIdentity::new(
            id,
            "Monitoring Agent",
            "Collects metrics and detects anomalies",
        );
        Self {
            core: AgentCore::new(identity),
            detector,
            bus,
            source: None,
            queries: Vec::new(),
        }
    }

    /// Pull `queries` from `source` in [`Self::collect_once`].
    #[must_use]
    pub fn with_source(
        mut self,
        source: Arc<dyn MetricsSource>,
        queries: Vec<MetricQuery>,
    ) -> Self {
        self.source = Some(source);
        self.queries = queries;
        self
    }

    /// Analyse a batch and publish what was found.
    ///
    /// # Errors
    ///
    /// Returns an error if publishing fails.
    pub async fn analyze(&self, samples: &[MetricSample]) -> Result<Vec<Anomaly>> {
        let anomalies = self.detector.analyze(samples);
        debug!(
            samples = samples.len(),
            anomalies = anomalies.len(),
            "Analysed metric batch"
        );

        for anomaly in &anomalies {
            info!(
                metric = %anomaly.metric_name,
                severity = %anomaly.severity,
                actual = anomaly.actual_value,
                expected = anomaly.expected_value,
                "Anomaly detected"
            );
            self.bus
                .publish_event(&Event::AnomalyDetected(anomaly.clone()))
                .await?;
        }

        let mut flagged: BTreeMap<&str, &Anomaly> = BTreeMap::new();
        for anomaly in anomalies.iter().filter(|a| a.severity == Severity::High) {
            if let Some(service) = anomaly.service() {
                flagged.entry(service).or_insert(anomaly);
            }
        }

        for (service, anomaly) in flagged {
            let request = ScaleRequiredEvent {
                service_id: service.to_string(),
                reason: anomaly.description.clone(),
                metrics: samples
                    .iter()
                    .filter(|s| s.service() == Some(service))
                    .cloned()
                    .collect(),
                target_replicas: None,
            };
            let (_, payload) = Event::ScaleRequired(request).encode()?;
            info!(service_id = service, "Threshold exceeded, requesting scaling");
            self.bus.publish(topics::THRESHOLD_EXCEEDED, payload).await?;
        }

        Ok(anomalies)
    }

    /// Pull one batch from the metrics source and analyse it.
    ///
    /// # Errors
    ///
    /// Returns an error if no source is configured, the agent is not
    /// running, the fetch fails, or publishing fails.
    pub async fn collect_once(&self) -> Result<Vec<Anomaly>> {
        let Some(source) = &self.source else {
            return Err(AgentError::Handler {
                agent_id: self.core.id().clone(),
                message: "no metrics source configured".to_string(),
            });
        };

        let _gate = self.core.gate().await;
        let state = self.core.state();
        if !accepts_events(state) {
            return Err(AgentError::NotRunning {
                agent_id: self.core.id().clone(),
                state,
            });
        }

        let samples = source.fetch(&self.queries).await?;
        debug!(samples = samples.len(), "Collected metrics");
        self.analyze(&samples).await
    }

    /// Run [`Self::collect_once`] every `interval` until `shutdown` flips.
    ///
    /// Ticks while the agent is not running are skipped.
    pub fn spawn_collector(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Metrics collector stopped");
                            return;
                        }
                    }
                    _ = ticker.tick() => {
                        if !accepts_events(self.core.state()) {
                            continue;
                        }
                        if let Err(e) = self.collect_once().await {
                            warn!(category = e.category(), error = %e, "Metrics collection failed");
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Agent for MonitoringAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn subscriptions(&self) -> &'static [&'static str] {
        &[topics::METRICS_COLLECTED]
    }

    async fn init(&self) -> Result<()> {
        if self.source.is_some() && self.queries.is_empty() {
            return Err(AgentError::Handler {
                agent_id: self.core.id().clone(),
                message: "metrics source configured without queries".to_string(),
            });
        }
        Ok(())
    }

    async fn on_event(&self, event: &Event) -> Result<()> {
        match event {
            Event::MetricsCollected(samples) => self.analyze(samples).await.map(|_| ()),
            other => {
                debug!(agent_id = %self.core.id(), topic = other.topic(), "Ignoring event");
                Ok(())
            }
        }
    }
}
