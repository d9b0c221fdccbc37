//! Metric samples and detected anomalies.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known metric names produced by the default metrics queries.
pub mod names {
    /// CPU utilisation percentage.
    pub const CPU_USAGE: &str = "cpu_usage";
    /// Memory utilisation percentage.
    pub const MEMORY_USAGE: &str = "memory_usage";
    /// Request latency in milliseconds.
    pub const LATENCY_MS: &str = "latency_ms";
    /// Number of running pods.
    pub const POD_COUNT: &str = "pod_count";
    /// Requests per second.
    pub const REQUEST_RATE: &str = "request_rate";
}

/// Label carrying the service a sample belongs to.
pub const SERVICE_LABEL: &str = "service";

/// A single named, labelled, timestamped metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Metric name, used to group samples.
    pub name: String,
    /// Sampled value.
    pub value: f64,
    /// Sample labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
}

impl MetricSample {
    /// Create an unlabelled sample taken now.
    #[must_use]
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            labels: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The `service` label, if present.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.labels.get(SERVICE_LABEL).map(String::as_str)
    }
}

/// Severity of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Low,
    /// `2 < |z| <= 3`.
    Medium,
    /// `|z| > 3`, or a raw value over the fallback threshold.
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// An outlier flagged by the anomaly detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Name of the metric the sample belongs to.
    pub metric_name: String,
    /// When the anomaly was detected.
    pub detected_at: DateTime<Utc>,
    /// How far off the sample is.
    pub severity: Severity,
    /// Human-readable description.
    pub description: String,
    /// The value the detector expected (group mean, or the configured target).
    pub expected_value: f64,
    /// The sampled value.
    pub actual_value: f64,
    /// Labels copied from the offending sample.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Anomaly {
    /// The `service` label of the offending sample, if present.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.labels.get(SERVICE_LABEL).map(String::as_str)
    }
}
