//! Engine configuration.

use std::time::Duration;

use remedy_core::ConfigError;

/// Thresholds and steps for the default scaling rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingConfig {
    /// Scale up when CPU percent exceeds this.
    pub cpu_threshold: f64,
    /// Scale up when memory percent exceeds this.
    pub memory_threshold: f64,
    /// Scale up when latency in milliseconds exceeds this.
    pub latency_threshold_ms: f64,
    /// Scale down when every CPU sample is below this.
    pub cpu_low_threshold: f64,
    /// Replicas added on scale-up.
    pub scale_up_step: u32,
    /// Replicas removed on scale-down.
    pub scale_down_step: u32,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold: 80.0,
            latency_threshold_ms: 500.0,
            cpu_low_threshold: 20.0,
            scale_up_step: 2,
            scale_down_step: 1,
        }
    }
}

/// Anomaly detector settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// `|z|` above this is an anomaly.
    pub z_threshold: f64,
    /// `|z|` above this is a high-severity anomaly.
    pub high_z_threshold: f64,
    /// Raw value above this is flagged when statistics are skipped.
    pub fallback_threshold: f64,
    /// Expected value reported for threshold anomalies.
    pub fallback_expected: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            z_threshold: 2.0,
            high_z_threshold: 3.0,
            fallback_threshold: 100.0,
            fallback_expected: 80.0,
        }
    }
}

/// External advisor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisorConfig {
    /// Base URL; `None` disables the advisor.
    pub url: Option<String>,
    /// Deadline for one recommendation.
    pub timeout: Duration,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_secs(3),
        }
    }
}

/// Configuration for the decision engines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineConfig {
    /// External advisor.
    pub advisor: AdvisorConfig,
    /// Default scaling rule.
    pub scaling: ScalingConfig,
    /// Anomaly detector.
    pub detector: DetectorConfig,
    /// Prometheus base URL; `None` disables periodic collection.
    pub prometheus_url: Option<String>,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `ADVISOR_URL`: base URL of the external advisor
    /// - `ADVISOR_TIMEOUT_MS`: advisor deadline in milliseconds
    /// - `CPU_THRESHOLD`, `MEMORY_THRESHOLD`: scale-up percentages
    /// - `LATENCY_THRESHOLD_MS`: scale-up latency
    /// - `CPU_LOW_THRESHOLD`: scale-down percentage
    /// - `SCALE_UP_STEP`, `SCALE_DOWN_STEP`: replica steps
    /// - `PROMETHEUS_URL`: metrics backend
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a variable is set but cannot be parsed,
    /// or a step is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.advisor.url = non_empty_env("ADVISOR_URL");
        if let Some(ms) = ConfigError::parse_env::<u64>("ADVISOR_TIMEOUT_MS")? {
            config.advisor.timeout = Duration::from_millis(ms);
        }

        let scaling = &mut config.scaling;
        if let Some(v) = parse_finite("CPU_THRESHOLD")? {
            scaling.cpu_threshold = v;
        }
        if let Some(v) = parse_finite("MEMORY_THRESHOLD")? {
            scaling.memory_threshold = v;
        }
        if let Some(v) = parse_finite("LATENCY_THRESHOLD_MS")? {
            scaling.latency_threshold_ms = v;
        }
        if let Some(v) = parse_finite("CPU_LOW_THRESHOLD")? {
            scaling.cpu_low_threshold = v;
        }
        if let Some(step) = parse_step("SCALE_UP_STEP")? {
            scaling.scale_up_step = step;
        }
        if let Some(step) = parse_step("SCALE_DOWN_STEP")? {
            scaling.scale_down_step = step;
        }

        config.prometheus_url = non_empty_env("PROMETHEUS_URL");

        Ok(config)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
}

fn parse_finite(key: &'static str) -> Result<Option<f64>, ConfigError> {
    match ConfigError::parse_env::<f64>(key)? {
        Some(v) if !v.is_finite() => Err(ConfigError::Invalid {
            key,
            value: v.to_string(),
        }),
        other => Ok(other),
    }
}

fn parse_step(key: &'static str) -> Result<Option<u32>, ConfigError> {
    match ConfigError::parse_env::<u32>(key)? {
        Some(0) => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_rule() {
        let config = EngineConfig::default();
        assert!((config.scaling.cpu_threshold - 80.0).abs() < f64::EPSILON);
        assert!((config.scaling.latency_threshold_ms - 500.0).abs() < f64::EPSILON);
        assert_eq!(config.scaling.scale_up_step, 2);
        assert_eq!(config.scaling.scale_down_step, 1);
        assert!((config.detector.fallback_threshold - 100.0).abs() < f64::EPSILON);
        assert!((config.detector.fallback_expected - 80.0).abs() < f64::EPSILON);
        assert!(config.advisor.url.is_none());
    }
}
