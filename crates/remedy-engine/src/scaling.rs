//! Scaling decision engine.
//!
//! [`ScalingEngine::evaluate_scaling`] turns a metric window into a
//! [`ScalingRequest`] whose target is always clamped to the autoscaler
//! bounds (or to at least one replica). [`ScalingEngine::scale_service`]
//! applies it. Replica patches are idempotent, so a `no_change` request is
//! simply not sent.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use remedy_core::metrics::names;
use remedy_core::{
    clamp_replicas, format_explanation, MetricSample, ReplicaBounds, ScaleRequiredEvent,
    ScalingAction, ScalingRecord, ScalingRequest, ScalingResult,
};
use remedy_kube::{ClusterMutator, MutationError};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::advisor::{consult, AdviceRequest, AdviceResponse, Advisor};
use crate::config::ScalingConfig;
use crate::healing::DecisionSource;

/// A monitored metric and the threshold that triggers scale-up.
struct Watched {
    name: &'static str,
    label: &'static str,
    unit: &'static str,
    threshold: f64,
}

/// Chooses and applies replica counts.
#[derive(Clone)]
pub struct ScalingEngine {
    mutator: Arc<dyn ClusterMutator>,
    advisor: Option<Arc<dyn Advisor>>,
    advisor_timeout: Duration,
    config: ScalingConfig,
}

impl ScalingEngine {
    /// Create an engine that only uses the threshold rule.
    #[must_use]
    pub fn new(mutator: Arc<dyn ClusterMutator>, config: ScalingConfig) -> Self {
        Self {
            mutator,
            advisor: None,
            advisor_timeout: Duration::from_secs(3),
            config,
        }
    }

    /// Consult `advisor` before the threshold rule, waiting at most `timeout`.
    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>, timeout: Duration) -> Self {
        self.advisor = Some(advisor);
        self.advisor_timeout = timeout;
        self
    }

    /// Get the threshold rule configuration.
    #[must_use]
    pub fn config(&self) -> &ScalingConfig {
        &self.config
    }

    /// Compute a replica target for `service_id`. Never fails.
    ///
    /// The advisor is asked first when configured; the threshold rule
    /// answers when it is absent, slow, or unhelpful.
    pub async fn evaluate_scaling(
        &self,
        service_id: &str,
        metrics: &[MetricSample],
        current: u32,
        bounds: Option<ReplicaBounds>,
    ) -> ScalingRequest {
        if let Some(advisor) = &self.advisor {
            let request = AdviceRequest::Scaling {
                historical_metrics: history(metrics),
                system_state: json!({
                    "service_id": service_id,
                    "current_replicas": current,
                    "min_replicas": bounds.map(|b| b.min),
                    "max_replicas": bounds.map(|b| b.max),
                }),
            };
            if let Some(advice) = consult(advisor.as_ref(), &request, self.advisor_timeout).await {
                let advised = self.request_from_advice(service_id, current, bounds, advice);
                if let Some(request) = advised {
                    return request;
                }
            }
        }

        self.fallback_evaluation(service_id, metrics, current, bounds)
    }

    /// Apply the threshold rule without consulting the advisor.
    ///
    /// Scale up by `scale_up_step` if the latest CPU, memory or latency
    /// sample exceeds its threshold. Scale down by `scale_down_step` if every
    /// CPU sample in the window is below `cpu_low_threshold`. Otherwise hold.
    #[must_use]
    pub fn fallback_evaluation(
        &self,
        service_id: &str,
        metrics: &[MetricSample],
        current: u32,
        bounds: Option<ReplicaBounds>,
    ) -> ScalingRequest {
        let c = &self.config;
        let watched = [
            Watched {
                name: names::CPU_USAGE,
                label: "CPU usage",
                unit: "%",
                threshold: c.cpu_threshold,
            },
            Watched {
                name: names::MEMORY_USAGE,
                label: "Memory usage",
                unit: "%",
                threshold: c.memory_threshold,
            },
            Watched {
                name: names::LATENCY_MS,
                label: "Latency",
                unit: "ms",
                threshold: c.latency_threshold_ms,
            },
        ];

        for w in &watched {
            if let Some(latest) = latest(metrics, w.name).filter(|v| *v > w.threshold) {
                let reason = format!(
                    "{} exceeded {}{} (current: {latest:.1}{})",
                    w.label, w.threshold, w.unit, w.unit
                );
                return build_request(
                    service_id,
                    current,
                    current.saturating_add(c.scale_up_step),
                    bounds,
                    reason,
                    DecisionSource::RuleTable,
                    Some(w.name),
                );
            }
        }

        let cpu: Vec<f64> = metrics
            .iter()
            .filter(|s| s.name == names::CPU_USAGE)
            .map(|s| s.value)
            .collect();
        if !cpu.is_empty() && cpu.iter().all(|v| *v < c.cpu_low_threshold) {
            let peak = cpu.iter().copied().fold(f64::MIN, f64::max);
            let reason = format!(
                "CPU usage stayed below {}% across {} samples (peak: {peak:.1}%)",
                c.cpu_low_threshold,
                cpu.len()
            );
            return build_request(
                service_id,
                current,
                current.saturating_sub(c.scale_down_step),
                bounds,
                reason,
                DecisionSource::RuleTable,
                Some(names::CPU_USAGE),
            );
        }

        build_request(
            service_id,
            current,
            current,
            bounds,
            "All metrics are within thresholds".to_string(),
            DecisionSource::RuleTable,
            None,
        )
    }

    /// Handle a scale request end to end: read the current state, decide,
    /// patch, and explain.
    ///
    /// Always returns a record; a failed lookup or patch is reported through
    /// `result.success` and `result.error`.
    pub async fn scale_service(&self, event: &ScaleRequiredEvent) -> ScalingRecord {
        let started = Instant::now();
        let service_id = event.service_id.as_str();

        let current = match self.mutator.current_replicas(service_id).await {
            Ok(n) => n,
            Err(e) => return lookup_failed(event, &e, started),
        };

        let bounds = match self.mutator.replica_bounds(service_id).await {
            Ok(bounds) => bounds,
            Err(e) => {
                warn!(
                    service_id,
                    category = e.category(),
                    error = %e,
                    "Autoscaler bounds unavailable, clamping to at least one replica"
                );
                None
            }
        };

        let request = match event.target_replicas {
            Some(target) if event.metrics.is_empty() => {
                let reason = if event.reason.trim().is_empty() {
                    format!("Requested {target} replicas")
                } else {
                    event.reason.clone()
                };
                build_request(service_id, current, target, bounds, reason, DecisionSource::RuleTable, None)
            }
            _ => {
                self.evaluate_scaling(service_id, &event.metrics, current, bounds)
                    .await
            }
        };

        info!(
            service_id,
            action = %request.action(),
            current = request.current_replicas,
            target = request.target_replicas,
            "Scaling decision made"
        );

        let result = self.apply(&request, started).await;
        let explanation = explain(&request, &result);

        ScalingRecord {
            request,
            result,
            explanation,
        }
    }

    async fn apply(&self, request: &ScalingRequest, started: Instant) -> ScalingResult {
        let action = request.action();
        let mut result = ScalingResult {
            service_id: request.service_id.clone(),
            action,
            previous_replicas: request.current_replicas,
            new_replicas: request.current_replicas,
            success: true,
            duration: Duration::ZERO,
            error: None,
        };

        if action != ScalingAction::NoChange {
            match self
                .mutator
                .set_replicas(&request.service_id, request.target_replicas)
                .await
            {
                Ok(kind) => {
                    info!(
                        service_id = %request.service_id,
                        kind = %kind,
                        replicas = request.target_replicas,
                        "Replicas updated"
                    );
                    result.new_replicas = request.target_replicas;
                }
                Err(e) => {
                    warn!(
                        service_id = %request.service_id,
                        category = e.category(),
                        error = %e,
                        "Failed to update replicas"
                    );
                    result.success = false;
                    result.error = Some(format!("{}: {e}", e.category()));
                }
            }
        }

        result.duration = started.elapsed();
        result
    }

    fn request_from_advice(
        &self,
        service_id: &str,
        current: u32,
        bounds: Option<ReplicaBounds>,
        advice: AdviceResponse,
    ) -> Option<ScalingRequest> {
        let target = match advice.target_replicas {
            Some(target) => target,
            None => match ScalingAction::parse(&advice.action) {
                Some(ScalingAction::ScaleUp) => current.saturating_add(self.config.scale_up_step),
                Some(ScalingAction::ScaleDown) => {
                    current.saturating_sub(self.config.scale_down_step)
                }
                Some(ScalingAction::NoChange) => current,
                None => {
                    warn!(
                        service_id,
                        action = %advice.action,
                        category = "advisor_malformed",
                        "Advisor recommended an unknown action, using fallback rules"
                    );
                    return None;
                }
            },
        };

        let reason = if advice.reasoning.trim().is_empty() {
            format!("Advisor recommended {}", advice.action)
        } else {
            advice.reasoning
        };
        debug!(service_id, target, "Using advisor scaling recommendation");
        Some(build_request(
            service_id,
            current,
            target,
            bounds,
            reason,
            DecisionSource::Advisor,
            None,
        ))
    }
}

impl fmt::Debug for ScalingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalingEngine")
            .field("advisor", &self.advisor.is_some())
            .field("advisor_timeout", &self.advisor_timeout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Latest value of `name` by timestamp; later input wins ties.
fn latest(metrics: &[MetricSample], name: &str) -> Option<f64> {
    metrics
        .iter()
        .filter(|s| s.name == name)
        .max_by_key(|s| s.timestamp)
        .map(|s| s.value)
}

/// Values per metric name, oldest first.
fn history(metrics: &[MetricSample]) -> BTreeMap<String, Vec<f64>> {
    let mut sorted: Vec<&MetricSample> = metrics.iter().collect();
    sorted.sort_by_key(|s| s.timestamp);

    let mut history: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for sample in sorted {
        history.entry(sample.name.clone()).or_default().push(sample.value);
    }
    history
}

fn build_request(
    service_id: &str,
    current: u32,
    target: u32,
    bounds: Option<ReplicaBounds>,
    reason: String,
    source: DecisionSource,
    trigger: Option<&str>,
) -> ScalingRequest {
    let mut metadata = Map::new();
    metadata.insert("source".into(), Value::from(source.as_str()));
    if let Some(trigger) = trigger {
        metadata.insert("trigger".into(), Value::from(trigger));
    }
    if let Some(b) = bounds {
        metadata.insert("min_replicas".into(), Value::from(b.min));
        metadata.insert("max_replicas".into(), Value::from(b.max));
    }

    ScalingRequest {
        service_id: service_id.to_string(),
        current_replicas: current,
        target_replicas: clamp_replicas(target, bounds),
        reason,
        metadata,
    }
}

fn lookup_failed(event: &ScaleRequiredEvent, error: &MutationError, started: Instant) -> ScalingRecord {
    warn!(
        service_id = %event.service_id,
        category = error.category(),
        error = %error,
        "Failed to read current replicas"
    );

    let mut metadata = Map::new();
    metadata.insert("source".into(), Value::from(DecisionSource::RuleTable.as_str()));
    let request = ScalingRequest {
        service_id: event.service_id.clone(),
        current_replicas: 0,
        target_replicas: clamp_replicas(event.target_replicas.unwrap_or(1), None),
        reason: event.reason.clone(),
        metadata,
    };
    let result = ScalingResult {
        service_id: event.service_id.clone(),
        action: ScalingAction::NoChange,
        previous_replicas: 0,
        new_replicas: 0,
        success: false,
        duration: started.elapsed(),
        error: Some(format!("{}: {error}", error.category())),
    };

    let problem = format!(
        "the replica count of {} could not be read ({})",
        event.service_id,
        error.category()
    );
    let explanation = format_explanation(
        &problem,
        "left the service unchanged",
        "avoid scaling blindly until the workload can be read",
    );

    ScalingRecord {
        request,
        result,
        explanation,
    }
}

fn explain(request: &ScalingRequest, result: &ScalingResult) -> String {
    let service = &request.service_id;
    let (from, to) = (request.current_replicas, request.target_replicas);

    if !result.success {
        let category = result
            .error
            .as_deref()
            .and_then(|e| e.split(':').next())
            .unwrap_or("unknown");
        return format_explanation(
            &request.reason,
            &format!("attempted to scale {service} from {from} to {to} replicas but the change failed ({category})"),
            "",
        );
    }

    let (action, reason) = match result.action {
        ScalingAction::ScaleUp => (
            format!("scaled {service} up from {from} to {to} replicas"),
            "prevent service degradation and ensure optimal performance",
        ),
        ScalingAction::ScaleDown => (
            format!("scaled {service} down from {from} to {to} replicas"),
            "reduce resource usage while maintaining performance",
        ),
        ScalingAction::NoChange => (
            format!("kept {service} at {from} replicas"),
            "avoid unnecessary changes",
        ),
    };
    format_explanation(&request.reason, &action, reason)
}
