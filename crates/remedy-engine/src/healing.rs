//! Self-healing decision engine.
//!
//! Each failure report moves through
//! `Received → Classified → StrategySelected → Executed → Explained`.
//! Classification always succeeds: the advisor is asked first when one is
//! configured, and the rule table in [`fallback_strategy`] answers
//! otherwise. Execution errors never escape; they become a result with
//! `success = false` and a reasoning that names the error category.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use remedy_core::healing::{DEPLOYMENT_KEY, POD_NAME_KEY};
use remedy_core::{
    format_explanation, FailureReport, FailureType, HealingAction, HealingRecord, HealingResult,
};
use remedy_kube::{ClusterMutator, MutationError, RollbackOutcome};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::advisor::{consult, AdviceRequest, Advisor};

/// Where a strategy came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// The external advisor.
    Advisor,
    /// The built-in rule table.
    RuleTable,
}

impl DecisionSource {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Advisor => "advisor",
            Self::RuleTable => "rule_table",
        }
    }
}

/// Progress of one failure report through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealingStage {
    /// Report accepted.
    Received,
    /// Failure type resolved.
    Classified,
    /// Action chosen.
    StrategySelected,
    /// Cluster mutation attempted.
    Executed,
    /// Explanation produced; terminal.
    Explained,
}

impl fmt::Display for HealingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::StrategySelected => "strategy_selected",
            Self::Executed => "executed",
            Self::Explained => "explained",
        };
        f.write_str(s)
    }
}

/// A chosen healing strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDecision {
    /// What to do.
    pub action: HealingAction,
    /// Why.
    pub reasoning: String,
    /// Who decided.
    pub source: DecisionSource,
}

/// Map a failure type to its default action.
///
/// Total over every failure type, including unrecognised ones.
#[must_use]
pub fn fallback_strategy(failure_type: &FailureType) -> HealingAction {
    match failure_type {
        FailureType::Crash | FailureType::Timeout => HealingAction::Restart,
        FailureType::DeploymentError | FailureType::ConfigError => HealingAction::Rollback,
        FailureType::ResourceExhaustion | FailureType::PodFailure => HealingAction::Replace,
        FailureType::Unknown | FailureType::Other(_) => HealingAction::Restart,
    }
}

/// Chooses and executes healing actions.
#[derive(Clone)]
pub struct HealingEngine {
    mutator: Arc<dyn ClusterMutator>,
    advisor: Option<Arc<dyn Advisor>>,
    advisor_timeout: Duration,
}

impl HealingEngine {
    /// Create an engine that only uses the rule table.
    #[must_use]
    pub fn new(mutator: Arc<dyn ClusterMutator>) -> Self {
        Self {
            mutator,
            advisor: None,
            advisor_timeout: Duration::from_secs(3),
        }
    }

    /// Consult `advisor` before the rule table, waiting at most `timeout`.
    #[must_use]
    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>, timeout: Duration) -> Self {
        self.advisor = Some(advisor);
        self.advisor_timeout = timeout;
        self
    }

    /// Choose an action for `report`. Never fails.
    pub async fn determine_strategy(&self, report: &FailureReport) -> StrategyDecision {
        let fallback = fallback_strategy(&report.failure_type);

        if let Some(advisor) = &self.advisor {
            let request = AdviceRequest::Healing {
                failure_info: report.clone(),
                system_state: json!({ "fallback_action": fallback.as_str() }),
            };
            if let Some(advice) = consult(advisor.as_ref(), &request, self.advisor_timeout).await {
                if let Some(action) = HealingAction::parse(&advice.action) {
                    let reasoning = if advice.reasoning.trim().is_empty() {
                        format!("Advisor recommended {action}")
                    } else {
                        advice.reasoning
                    };
                    return StrategyDecision {
                        action,
                        reasoning,
                        source: DecisionSource::Advisor,
                    };
                }
                warn!(
                    service_id = %report.service_id,
                    action = %advice.action,
                    category = "advisor_malformed",
                    "Advisor recommended an unknown action, using fallback rules"
                );
            }
        }

        StrategyDecision {
            action: fallback,
            reasoning: format!(
                "Applied {fallback} strategy for {} failure",
                report.failure_type
            ),
            source: DecisionSource::RuleTable,
        }
    }

    /// Heal the service described by `report`.
    ///
    /// Always returns a record; a failed mutation is reported through
    /// `result.success` and `result.reasoning`.
    pub async fn heal(&self, report: &FailureReport) -> HealingRecord {
        let started = Instant::now();
        let service_id = report.service_id.as_str();
        debug!(service_id, stage = %HealingStage::Received, "Healing failure report");

        debug!(
            service_id,
            stage = %HealingStage::Classified,
            failure_type = %report.failure_type,
            "Failure classified"
        );

        let decision = self.determine_strategy(report).await;
        info!(
            service_id,
            stage = %HealingStage::StrategySelected,
            action = %decision.action,
            source = decision.source.as_str(),
            "Healing strategy selected"
        );

        let target = Target::of(report, decision.action);
        let outcome = self.execute(decision.action, &target).await;

        let (success, reasoning, rollback) = match outcome {
            Ok(rollback) => {
                info!(
                    service_id,
                    stage = %HealingStage::Executed,
                    action = %decision.action,
                    target = %target.name,
                    "Healing action succeeded"
                );
                (true, decision.reasoning, rollback)
            }
            Err(e) => {
                warn!(
                    service_id,
                    stage = %HealingStage::Executed,
                    action = %decision.action,
                    target = %target.name,
                    category = e.category(),
                    error = %e,
                    "Healing action failed"
                );
                let reasoning = format!(
                    "{}; {} failed ({}): {e}",
                    decision.reasoning,
                    decision.action,
                    e.category()
                );
                (false, reasoning, None)
            }
        };

        let result = HealingResult {
            service_id: report.service_id.clone(),
            action: decision.action,
            success,
            reasoning,
            duration: started.elapsed(),
        };
        let explanation = explain(report, &result, &target, rollback.as_ref());
        debug!(service_id, stage = %HealingStage::Explained, "Healing explained");

        HealingRecord {
            result,
            explanation,
        }
    }

    async fn execute(
        &self,
        action: HealingAction,
        target: &Target,
    ) -> Result<Option<RollbackOutcome>, MutationError> {
        match action {
            HealingAction::Restart => self.mutator.restart_pod(&target.name).await.map(|()| None),
            HealingAction::Rollback => self.mutator.rollback_deployment(&target.name).await.map(Some),
            HealingAction::Replace => self.mutator.replace_pod(&target.name).await.map(|()| None),
        }
    }
}

impl fmt::Debug for HealingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealingEngine")
            .field("advisor", &self.advisor.is_some())
            .field("advisor_timeout", &self.advisor_timeout)
            .finish_non_exhaustive()
    }
}

/// The object an action mutates.
struct Target {
    kind: &'static str,
    name: String,
}

impl Target {
    fn of(report: &FailureReport, action: HealingAction) -> Self {
        let (kind, key) = match action {
            HealingAction::Restart | HealingAction::Replace => ("pod", POD_NAME_KEY),
            HealingAction::Rollback => ("deployment", DEPLOYMENT_KEY),
        };
        let name = report
            .metadata_str(key)
            .unwrap_or(report.service_id.as_str())
            .to_string();
        Self { kind, name }
    }
}

fn explain(
    report: &FailureReport,
    result: &HealingResult,
    target: &Target,
    rollback: Option<&RollbackOutcome>,
) -> String {
    let mut problem = if report.service_id.trim().is_empty() {
        String::new()
    } else {
        format!("service {} {}", report.service_id, report.failure_type.describe())
    };
    let message = report.error_message.trim();
    if !problem.is_empty() && !message.is_empty() {
        problem = format!("{problem} ({message})");
    }

    let action = if target.name.trim().is_empty() {
        String::new()
    } else if result.success {
        match rollback {
            Some(r) => format!(
                "rolled back {} {} to revision {} ({})",
                target.kind, target.name, r.revision, r.image
            ),
            None => format!("{} {} {}", result.action.past_tense(), target.kind, target.name),
        }
    } else {
        format!(
            "attempted to {} {} {} but the action failed",
            result.action, target.kind, target.name
        )
    };

    let reason = match (result.success, result.action) {
        (false, _) => "",
        (true, HealingAction::Restart) => "restore service availability",
        (true, HealingAction::Rollback) => "return the service to its last known good version",
        (true, HealingAction::Replace) => "replace the failed instance and keep the desired replica count",
    };

    format_explanation(&problem, &action, reason)
}
