//! External advisor interface.
//!
//! The advisor is an optional recommendation service. Engines never call it
//! directly; they go through [`consult`], which enforces the deadline and
//! validates the answer. Any failure is logged and turned into `None` so the
//! caller falls back to its rule table.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use remedy_core::FailureReport;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AdvisorError;

/// Actions an advisor may return to mean "leave it alone".
const NO_ACTION: [&str; 2] = ["do_nothing", "no_action"];

/// A recommendation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdviceRequest {
    /// Choose a healing strategy for a failure.
    Healing {
        /// The failure being healed.
        failure_info: FailureReport,
        /// Free-form snapshot of the surrounding state.
        system_state: serde_json::Value,
    },
    /// Choose a replica count for a service.
    Scaling {
        /// Recent values per metric name, oldest first.
        historical_metrics: BTreeMap<String, Vec<f64>>,
        /// Free-form snapshot of the surrounding state.
        system_state: serde_json::Value,
    },
}

impl AdviceRequest {
    /// Short name used in log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Healing { .. } => "healing",
            Self::Scaling { .. } => "scaling",
        }
    }
}

/// A recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdviceResponse {
    /// Recommended action, interpreted by the engine that asked.
    pub action: String,
    /// Why the advisor recommends it.
    pub reasoning: String,
    /// Suggested replica count for scaling advice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_replicas: Option<u32>,
}

/// Trait for recommendation providers.
///
/// Implementations may be remote services or in-process stubs; the timeout
/// and validation contract is enforced by [`consult`], not by implementors.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Ask for a recommendation.
    ///
    /// # Errors
    ///
    /// Returns an error if the advisor cannot be reached or its answer
    /// cannot be decoded.
    async fn advise(&self, request: &AdviceRequest) -> Result<AdviceResponse, AdvisorError>;
}

/// HTTP client for an advisor service.
#[derive(Debug, Clone)]
pub struct HttpAdvisor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAdvisor {
    /// Create a new advisor client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the advisor (e.g., "http://advisor:8000")
    /// * `timeout` - Client-side timeout for one request
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AdvisorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a new advisor client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL of the advisor.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Error body returned by the advisor.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[async_trait]
impl Advisor for HttpAdvisor {
    async fn advise(&self, request: &AdviceRequest) -> Result<AdviceResponse, AdvisorError> {
        let url = format!("{}/v1/advise", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("advisor returned status {status}"));
            return Err(AdvisorError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| AdvisorError::Malformed(e.to_string()))
    }
}

/// Ask `advisor` for a recommendation, bounded by `deadline`.
///
/// Returns `None` when the advisor times out, fails, or has nothing
/// actionable to say. The cause is logged, never returned.
pub async fn consult(
    advisor: &dyn Advisor,
    request: &AdviceRequest,
    deadline: Duration,
) -> Option<AdviceResponse> {
    let outcome = match tokio::time::timeout(deadline, advisor.advise(request)).await {
        Ok(result) => result.and_then(validate),
        Err(_) => Err(AdvisorError::Timeout(deadline)),
    };

    match outcome {
        Ok(response) => {
            debug!(
                kind = request.kind(),
                action = %response.action,
                "Advisor recommendation received"
            );
            Some(response)
        }
        Err(e) => {
            warn!(
                kind = request.kind(),
                category = e.category(),
                error = %e,
                "Advisor unavailable, using fallback rules"
            );
            None
        }
    }
}

fn validate(mut response: AdviceResponse) -> Result<AdviceResponse, AdvisorError> {
    let action = response.action.trim().to_ascii_lowercase();
    if action.is_empty() {
        return Err(AdvisorError::NothingActionable("empty action".to_string()));
    }
    if NO_ACTION.contains(&action.as_str()) {
        return Err(AdvisorError::NothingActionable(action));
    }
    response.action = action;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_core::FailureType;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn healing_request() -> AdviceRequest {
        AdviceRequest::Healing {
            failure_info: FailureReport::new("web-1", FailureType::Crash),
            system_state: json!({}),
        }
    }

    async fn advisor_with(template: ResponseTemplate) -> (MockServer, HttpAdvisor) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/advise"))
            .respond_with(template)
            .mount(&server)
            .await;
        let advisor = HttpAdvisor::new(server.uri(), Duration::from_secs(5)).unwrap();
        (server, advisor)
    }

    #[test]
    fn request_is_tagged_by_kind() {
        let value = serde_json::to_value(healing_request()).unwrap();
        assert_eq!(value["kind"], "healing");
        assert_eq!(value["failure_info"]["service_id"], "web-1");
    }

    #[tokio::test]
    async fn returns_recommendation() {
        let (_server, advisor) = advisor_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "Rollback",
            "reasoning": "bad release"
        })))
        .await;

        let response = consult(&advisor, &healing_request(), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response.action, "rollback");
        assert_eq!(response.reasoning, "bad release");
        assert_eq!(response.target_replicas, None);
    }

    #[tokio::test]
    async fn server_error_is_absorbed() {
        let (_server, advisor) = advisor_with(
            ResponseTemplate::new(503).set_body_json(json!({"error": "model not loaded"})),
        )
        .await;

        let err = advisor.advise(&healing_request()).await.unwrap_err();
        assert!(matches!(
            err,
            AdvisorError::Status { status: 503, ref message } if message == "model not loaded"
        ));
        assert!(consult(&advisor, &healing_request(), Duration::from_secs(2))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn missing_field_is_malformed() {
        let (_server, advisor) =
            advisor_with(ResponseTemplate::new(200).set_body_json(json!({"action": "restart"})))
                .await;

        let err = advisor.advise(&healing_request()).await.unwrap_err();
        assert_eq!(err.category(), "advisor_malformed");
    }

    #[tokio::test]
    async fn do_nothing_is_not_actionable() {
        let (_server, advisor) = advisor_with(ResponseTemplate::new(200).set_body_json(json!({
            "action": "do_nothing",
            "reasoning": "looks fine"
        })))
        .await;

        assert!(consult(&advisor, &healing_request(), Duration::from_secs(2))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn slow_advisor_times_out() {
        let (_server, advisor) = advisor_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"action": "restart", "reasoning": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .await;

        assert!(consult(&advisor, &healing_request(), Duration::from_millis(100))
            .await
            .is_none());
    }
}
