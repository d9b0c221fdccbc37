//! Failure reports and healing results.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Metadata key naming the pod to act on.
pub const POD_NAME_KEY: &str = "pod_name";
/// Metadata key naming the deployment to act on.
pub const DEPLOYMENT_KEY: &str = "deployment";

/// Classified cause of a failure.
///
/// Unrecognised strings deserialize to [`FailureType::Other`] rather than
/// failing, so a new failure kind on the bus never drops a report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FailureType {
    /// Process crashed.
    Crash,
    /// Service stopped responding in time.
    Timeout,
    /// A rollout went bad.
    DeploymentError,
    /// Bad configuration was applied.
    ConfigError,
    /// Out of memory, CPU or disk.
    ResourceExhaustion,
    /// Pod-level failure (eviction, node loss).
    PodFailure,
    /// Explicitly unknown.
    Unknown,
    /// Any other reported string.
    Other(String),
}

impl FailureType {
    /// Return the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Crash => "crash",
            Self::Timeout => "timeout",
            Self::DeploymentError => "deployment_error",
            Self::ConfigError => "config_error",
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::PodFailure => "pod_failure",
            Self::Unknown => "unknown",
            Self::Other(s) => s,
        }
    }

    /// Short human description used in explanations.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Crash => "crashed".to_string(),
            Self::Timeout => "timed out".to_string(),
            Self::DeploymentError => "failed after a deployment".to_string(),
            Self::ConfigError => "failed due to a configuration error".to_string(),
            Self::ResourceExhaustion => "ran out of resources".to_string(),
            Self::PodFailure => "lost its pod".to_string(),
            Self::Unknown => "failed".to_string(),
            Self::Other(s) => format!("failed ({})", s.replace('_', " ")),
        }
    }
}

impl From<String> for FailureType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "crash" => Self::Crash,
            "timeout" => Self::Timeout,
            "deployment_error" => Self::DeploymentError,
            "config_error" => Self::ConfigError,
            "resource_exhaustion" => Self::ResourceExhaustion,
            "pod_failure" => Self::PodFailure,
            "unknown" | "" => Self::Unknown,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for FailureType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<FailureType> for String {
    fn from(value: FailureType) -> Self {
        match value {
            FailureType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported against a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    /// The failing service.
    pub service_id: String,
    /// What kind of failure.
    pub failure_type: FailureType,
    /// Raw error message, if any.
    #[serde(default)]
    pub error_message: String,
    /// Free-form context (`pod_name`, `deployment`, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl FailureReport {
    /// Create a report with no message or metadata.
    #[must_use]
    pub fn new(service_id: impl Into<String>, failure_type: impl Into<FailureType>) -> Self {
        Self {
            service_id: service_id.into(),
            failure_type: failure_type.into(),
            error_message: String::new(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Set the error message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Add a string metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Look up a non-empty string metadata value.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// The three healing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealingAction {
    /// Delete the pod and let its controller recreate it.
    Restart,
    /// Roll the deployment back to its previous revision.
    Rollback,
    /// Force-delete the pod and check the controller catches up.
    Replace,
}

impl HealingAction {
    /// Parse an advisor-provided action name.
    ///
    /// Accepts both short names and the operation names
    /// (`restart_pod`, `rollback_deployment`, `replace_pod`).
    #[must_use]
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "restart" | "restart_pod" | "restart_service" => Some(Self::Restart),
            "rollback" | "rollback_deployment" => Some(Self::Rollback),
            "replace" | "replace_pod" => Some(Self::Replace),
            _ => None,
        }
    }

    /// Return the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Rollback => "rollback",
            Self::Replace => "replace",
        }
    }

    /// Past-tense verb phrase for explanations.
    #[must_use]
    pub const fn past_tense(self) -> &'static str {
        match self {
            Self::Restart => "restarted",
            Self::Rollback => "rolled back",
            Self::Replace => "replaced",
        }
    }
}

impl fmt::Display for HealingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one healing invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingResult {
    /// The service healed.
    pub service_id: String,
    /// The strategy executed.
    pub action: HealingAction,
    /// Whether the cluster mutation succeeded.
    pub success: bool,
    /// Why this strategy was chosen, and the failure category if it failed.
    pub reasoning: String,
    /// Wall-clock time spent, serialized as `duration_ms`.
    #[serde(rename = "duration_ms", with = "crate::millis")]
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_type_known_names() {
        assert_eq!(FailureType::from("crash"), FailureType::Crash);
        assert_eq!(FailureType::from("pod_failure"), FailureType::PodFailure);
        assert_eq!(FailureType::from(""), FailureType::Unknown);
    }

    #[test]
    fn failure_type_unknown_string_is_kept() {
        let parsed: FailureType = serde_json::from_str("\"crash_loop\"").unwrap();
        assert_eq!(parsed, FailureType::Other("crash_loop".to_string()));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"crash_loop\"");
    }

    #[test]
    fn report_deserializes_with_defaults() {
        let report: FailureReport =
            serde_json::from_str(r#"{"service_id":"web-1","failure_type":"crash"}"#).unwrap();
        assert_eq!(report.service_id, "web-1");
        assert_eq!(report.failure_type, FailureType::Crash);
        assert!(report.error_message.is_empty());
        assert!(report.metadata.is_empty());
    }

    #[test]
    fn metadata_str_ignores_empty_and_non_strings() {
        let mut report = FailureReport::new("web-1", "crash").with_metadata(POD_NAME_KEY, "");
        report
            .metadata
            .insert(DEPLOYMENT_KEY.to_string(), serde_json::json!(3));
        assert_eq!(report.metadata_str(POD_NAME_KEY), None);
        assert_eq!(report.metadata_str(DEPLOYMENT_KEY), None);
    }

    #[test]
    fn healing_action_parse_aliases() {
        assert_eq!(HealingAction::parse("restart_pod"), Some(HealingAction::Restart));
        assert_eq!(
            HealingAction::parse(" Rollback_Deployment "),
            Some(HealingAction::Rollback)
        );
        assert_eq!(HealingAction::parse("replace"), Some(HealingAction::Replace));
        assert_eq!(HealingAction::parse("do_nothing"), None);
        assert_eq!(HealingAction::parse(""), None);
    }

    #[test]
    fn result_duration_is_whole_milliseconds() {
        let result = HealingResult {
            service_id: "web-1".into(),
            action: HealingAction::Restart,
            success: true,
            reasoning: "pod crashed".into(),
            duration: Duration::from_micros(1_250_700),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration_ms"], 1250);
        assert!(json.get("duration").is_none());

        let parsed: HealingResult = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.duration, Duration::from_millis(1250));
    }
}
