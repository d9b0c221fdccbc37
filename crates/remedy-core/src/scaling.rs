//! Scaling requests, results and autoscaler bounds.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Direction of a scaling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingAction {
    /// Add replicas.
    ScaleUp,
    /// Remove replicas.
    ScaleDown,
    /// Leave the replica count alone.
    NoChange,
}

impl ScalingAction {
    /// Derive the action from a replica change.
    #[must_use]
    pub const fn between(current: u32, target: u32) -> Self {
        if target > current {
            Self::ScaleUp
        } else if target < current {
            Self::ScaleDown
        } else {
            Self::NoChange
        }
    }

    /// Parse an advisor-provided action name.
    #[must_use]
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "scale_up" | "scaleup" | "up" => Some(Self::ScaleUp),
            "scale_down" | "scaledown" | "down" => Some(Self::ScaleDown),
            "no_change" | "none" | "hold" => Some(Self::NoChange),
            _ => None,
        }
    }

    /// Return the wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ScaleUp => "scale_up",
            Self::ScaleDown => "scale_down",
            Self::NoChange => "no_change",
        }
    }
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Min/max replica limits from a `HorizontalPodAutoscaler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaBounds {
    /// Lower limit (at least 1 once clamped).
    pub min: u32,
    /// Upper limit.
    pub max: u32,
}

impl ReplicaBounds {
    /// Create bounds, normalising so that `1 <= min <= max`.
    #[must_use]
    pub fn new(min: u32, max: u32) -> Self {
        let min = min.max(1);
        Self {
            min,
            max: max.max(min),
        }
    }

    /// Clamp a target into the bounds.
    #[must_use]
    pub fn clamp(self, target: u32) -> u32 {
        let normalised = Self::new(self.min, self.max);
        target.clamp(normalised.min, normalised.max)
    }
}

/// Clamp a target to `bounds` when known, else to at least one replica.
#[must_use]
pub fn clamp_replicas(target: u32, bounds: Option<ReplicaBounds>) -> u32 {
    match bounds {
        Some(bounds) => bounds.clamp(target),
        None => target.max(1),
    }
}

/// A computed scaling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRequest {
    /// Service (Deployment or StatefulSet name) to scale.
    pub service_id: String,
    /// Replica count when the decision was taken.
    pub current_replicas: u32,
    /// Desired replica count, always at least one.
    pub target_replicas: u32,
    /// Why.
    pub reason: String,
    /// Decision context (source, triggering metric, bounds).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ScalingRequest {
    /// Direction of this request.
    #[must_use]
    pub const fn action(&self) -> ScalingAction {
        ScalingAction::between(self.current_replicas, self.target_replicas)
    }
}

/// Outcome of applying a scaling request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingResult {
    /// The service scaled.
    pub service_id: String,
    /// Direction applied.
    pub action: ScalingAction,
    /// Replica count before.
    pub previous_replicas: u32,
    /// Replica count after (unchanged on failure).
    pub new_replicas: u32,
    /// Whether the mutation succeeded.
    pub success: bool,
    /// Wall-clock time spent, serialized as `duration_ms`.
    #[serde(rename = "duration_ms", with = "crate::millis")]
    pub duration: Duration,
    /// Failure category and detail, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
