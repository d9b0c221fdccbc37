//! Event topics and typed event payloads.
//!
//! The bus carries raw bytes per topic. [`Event::decode`] is the single place
//! where a payload is checked against the shape its topic implies, so agents
//! only ever see a typed [`Event`].

use serde::{Deserialize, Serialize};

use crate::error::PayloadError;
use crate::healing::{FailureReport, HealingResult};
use crate::metrics::{Anomaly, MetricSample};
use crate::scaling::{ScalingRequest, ScalingResult};

/// Well-known bus topics.
pub mod topics {
    /// A service needs healing.
    pub const HEALING_REQUIRED: &str = "healing.required";
    /// An error was observed on a service.
    pub const ERROR_DETECTED: &str = "error.detected";
    /// A service needs scaling.
    pub const SCALE_REQUIRED: &str = "scale.required";
    /// A service crossed a metric threshold.
    pub const THRESHOLD_EXCEEDED: &str = "threshold.exceeded";
    /// A batch of metric samples was collected.
    pub const METRICS_COLLECTED: &str = "metrics.collected";
    /// The detector flagged an anomaly.
    pub const ANOMALY_DETECTED: &str = "anomaly.detected";
    /// A healing decision was executed.
    pub const HEALING_COMPLETED: &str = "healing.completed";
    /// A scaling decision was executed.
    pub const SCALING_COMPLETED: &str = "scaling.completed";

    /// Every topic [`super::Event::decode`] accepts.
    pub const ALL: [&str; 8] = [
        HEALING_REQUIRED,
        ERROR_DETECTED,
        SCALE_REQUIRED,
        THRESHOLD_EXCEEDED,
        METRICS_COLLECTED,
        ANOMALY_DETECTED,
        HEALING_COMPLETED,
        SCALING_COMPLETED,
    ];
}

/// Payload of `scale.required` and `threshold.exceeded`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleRequiredEvent {
    /// Service (Deployment or StatefulSet name) to evaluate.
    pub service_id: String,
    /// Why scaling was requested.
    #[serde(default)]
    pub reason: String,
    /// Recent samples for the service, if the publisher has them.
    #[serde(default)]
    pub metrics: Vec<MetricSample>,
    /// Explicit target suggested by the publisher; still clamped to bounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_replicas: Option<u32>,
}

/// Published on `healing.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingRecord {
    /// What was done.
    pub result: HealingResult,
    /// Human-readable explanation.
    pub explanation: String,
}

/// Published on `scaling.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRecord {
    /// The decision.
    pub request: ScalingRequest,
    /// What was applied.
    pub result: ScalingResult,
    /// Human-readable explanation.
    pub explanation: String,
}

/// A typed event, one variant per payload shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `healing.required` / `error.detected`.
    FailureDetected(FailureReport),
    /// `scale.required` / `threshold.exceeded`.
    ScaleRequired(ScaleRequiredEvent),
    /// `metrics.collected`.
    MetricsCollected(Vec<MetricSample>),
    /// `anomaly.detected`.
    AnomalyDetected(Anomaly),
    /// `healing.completed`.
    HealingCompleted(HealingRecord),
    /// `scaling.completed`.
    ScalingCompleted(ScalingRecord),
}

impl Event {
    /// Decode a raw bus payload for `topic`.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::UnknownTopic` for a topic with no variant, and
    /// `PayloadError::Malformed` if the JSON does not match the variant.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, PayloadError> {
        fn parse<T: serde::de::DeserializeOwned>(
            topic: &str,
            payload: &[u8],
        ) -> Result<T, PayloadError> {
            serde_json::from_slice(payload).map_err(|source| PayloadError::Malformed {
                topic: topic.to_string(),
                source,
            })
        }

        match topic {
            topics::HEALING_REQUIRED | topics::ERROR_DETECTED => {
                parse(topic, payload).map(Self::FailureDetected)
            }
            topics::SCALE_REQUIRED | topics::THRESHOLD_EXCEEDED => {
                parse(topic, payload).map(Self::ScaleRequired)
            }
            topics::METRICS_COLLECTED => parse(topic, payload).map(Self::MetricsCollected),
            topics::ANOMALY_DETECTED => parse(topic, payload).map(Self::AnomalyDetected),
            topics::HEALING_COMPLETED => parse(topic, payload).map(Self::HealingCompleted),
            topics::SCALING_COMPLETED => parse(topic, payload).map(Self::ScalingCompleted),
            other => Err(PayloadError::UnknownTopic(other.to_string())),
        }
    }

    /// The topic this event is published on by default.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::FailureDetected(_) => topics::HEALING_REQUIRED,
            Self::ScaleRequired(_) => topics::SCALE_REQUIRED,
            Self::MetricsCollected(_) => topics::METRICS_COLLECTED,
            Self::AnomalyDetected(_) => topics::ANOMALY_DETECTED,
            Self::HealingCompleted(_) => topics::HEALING_COMPLETED,
            Self::ScalingCompleted(_) => topics::SCALING_COMPLETED,
        }
    }

    /// Encode the payload for its default topic.
    ///
    /// # Errors
    ///
    /// Returns `PayloadError::Encode` if serialization fails.
    pub fn encode(&self) -> Result<(&'static str, Vec<u8>), PayloadError> {
        let bytes = match self {
            Self::FailureDetected(p) => serde_json::to_vec(p),
            Self::ScaleRequired(p) => serde_json::to_vec(p),
            Self::MetricsCollected(p) => serde_json::to_vec(p),
            Self::AnomalyDetected(p) => serde_json::to_vec(p),
            Self::HealingCompleted(p) => serde_json::to_vec(p),
            Self::ScalingCompleted(p) => serde_json::to_vec(p),
        }
        .map_err(PayloadError::Encode)?;
        Ok((self.topic(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::healing::FailureType;

    #[test]
    fn decode_failure_on_both_topics() {
        let payload = br#"{"service_id":"web-1","failure_type":"crash"}"#;
        for topic in [topics::HEALING_REQUIRED, topics::ERROR_DETECTED] {
            match Event::decode(topic, payload).unwrap() {
                Event::FailureDetected(report) => {
                    assert_eq!(report.service_id, "web-1");
                    assert_eq!(report.failure_type, FailureType::Crash);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    #[test]
    fn decode_scale_required_ignores_extra_fields() {
        let payload = br#"{"service_id":"api-service","current_load":0.95,"target_replicas":5,"reason":"CPU usage exceeded threshold"}"#;
        let Event::ScaleRequired(event) = Event::decode(topics::SCALE_REQUIRED, payload).unwrap()
        else {
            panic!("expected ScaleRequired");
        };
        assert_eq!(event.target_replicas, Some(5));
        assert!(event.metrics.is_empty());
    }

    #[test]
    fn decode_rejects_unknown_topic() {
        let err = Event::decode("weather.changed", b"{}").unwrap_err();
        assert!(matches!(err, PayloadError::UnknownTopic(t) if t == "weather.changed"));
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        // A metrics batch is an array, not an object.
        let err = Event::decode(topics::METRICS_COLLECTED, br#"{"name":"cpu_usage"}"#).unwrap_err();
        assert!(matches!(err, PayloadError::Malformed { .. }));

        let err = Event::decode(topics::HEALING_REQUIRED, b"not json").unwrap_err();
        assert!(matches!(err, PayloadError::Malformed { topic, .. } if topic == "healing.required"));
    }

    #[test]
    fn encode_uses_default_topic() {
        let event = Event::FailureDetected(FailureReport::new("web-1", "timeout"));
        let (topic, bytes) = event.encode().unwrap();
        assert_eq!(topic, topics::HEALING_REQUIRED);
        assert_eq!(Event::decode(topic, &bytes).unwrap(), event);
    }
}
