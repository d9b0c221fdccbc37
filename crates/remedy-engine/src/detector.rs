//! Statistical anomaly detection over metric batches.
//!
//! Samples are grouped by metric name. Groups with at least two samples and
//! a non-zero spread are scored by z-score against the population standard
//! deviation. Every other group falls back to a fixed raw-value threshold,
//! so a short history still produces a signal.

use std::collections::BTreeMap;

use chrono::Utc;
use remedy_core::{Anomaly, MetricSample, Severity};
use tracing::debug;

use crate::config::DetectorConfig;

/// Mean and population standard deviation of one metric group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupStats {
    /// Number of samples.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Population standard deviation, `sqrt(Σ(v - mean)² / n)`.
    pub std_dev: f64,
}

impl GroupStats {
    /// Compute statistics for `values`. Returns `None` for an empty slice.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            count: values.len(),
            mean,
            std_dev: variance.sqrt(),
        })
    }

    /// Whether the z-score path can score this group.
    #[must_use]
    pub fn is_scorable(&self) -> bool {
        self.count >= 2 && self.std_dev > 0.0
    }

    /// Z-score of `value` within this group.
    #[must_use]
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std_dev
    }
}

/// Flags outliers in a metric batch.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    /// Create a detector.
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Get the detector configuration.
    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyse a batch and return every anomaly found.
    ///
    /// Results are ordered by metric name, then by input order within a
    /// metric. The input is never modified.
    #[must_use]
    pub fn analyze(&self, samples: &[MetricSample]) -> Vec<Anomaly> {
        let mut groups: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();
        for sample in samples {
            groups.entry(sample.name.as_str()).or_default().push(sample);
        }

        let mut anomalies = Vec::new();
        for (name, group) in groups {
            let values: Vec<f64> = group.iter().map(|s| s.value).collect();
            match GroupStats::of(&values) {
                Some(stats) if stats.is_scorable() => {
                    anomalies.extend(group.iter().filter_map(|s| self.score(s, &stats)));
                }
                _ => {
                    debug!(metric = name, count = group.len(), "Too little spread for z-scores, using threshold");
                    anomalies.extend(group.iter().filter_map(|s| self.threshold(s)));
                }
            }
        }
        anomalies
    }

    fn score(&self, sample: &MetricSample, stats: &GroupStats) -> Option<Anomaly> {
        let z = stats.z_score(sample.value);
        let magnitude = z.abs();
        if magnitude <= self.config.z_threshold {
            return None;
        }
        let severity = if magnitude > self.config.high_z_threshold {
            Severity::High
        } else {
            Severity::Medium
        };

        Some(Anomaly {
            metric_name: sample.name.clone(),
            detected_at: Utc::now(),
            severity,
            description: format!(
                "{} value {:.2} deviates from mean {:.2} (z-score {z:.2})",
                sample.name, sample.value, stats.mean
            ),
            expected_value: stats.mean,
            actual_value: sample.value,
            labels: sample.labels.clone(),
        })
    }

    fn threshold(&self, sample: &MetricSample) -> Option<Anomaly> {
        if sample.value <= self.config.fallback_threshold {
            return None;
        }
        Some(Anomaly {
            metric_name: sample.name.clone(),
            detected_at: Utc::now(),
            severity: Severity::High,
            description: format!(
                "{} value {:.2} exceeds threshold {:.2}",
                sample.name, sample.value, self.config.fallback_threshold
            ),
            expected_value: self.config.fallback_expected,
            actual_value: sample.value,
            labels: sample.labels.clone(),
        })
    }
}
