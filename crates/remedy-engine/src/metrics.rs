//! Metrics source backed by a Prometheus-compatible HTTP API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remedy_core::metrics::names;
use remedy_core::MetricSample;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::MetricsError;

/// A named instant query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    /// Metric name given to every resulting sample.
    pub name: String,
    /// Query expression sent to the backend.
    pub promql: String,
}

impl MetricQuery {
    /// Create a new query.
    #[must_use]
    pub fn new(name: impl Into<String>, promql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            promql: promql.into(),
        }
    }
}

/// The queries collected on every monitoring pass.
#[must_use]
pub fn default_queries() -> Vec<MetricQuery> {
    vec![
        MetricQuery::new(
            names::CPU_USAGE,
            "sum(rate(container_cpu_usage_seconds_total[5m])) by (pod, namespace) * 100",
        ),
        MetricQuery::new(
            names::MEMORY_USAGE,
            "sum(container_memory_working_set_bytes) by (pod, namespace) / \
             sum(container_spec_memory_limit_bytes) by (pod, namespace) * 100",
        ),
        MetricQuery::new(names::POD_COUNT, "count(kube_pod_info) by (namespace)"),
        MetricQuery::new(
            names::REQUEST_RATE,
            "sum(rate(http_requests_total[5m])) by (service, namespace)",
        ),
    ]
}

/// Trait for batch metric fetches.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Run every query and return the samples that came back.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be reached.
    async fn fetch(&self, queries: &[MetricQuery]) -> Result<Vec<MetricSample>, MetricsError>;
}

/// Prometheus HTTP API client.
#[derive(Debug, Clone)]
pub struct PrometheusSource {
    client: reqwest::Client,
    base_url: String,
}

impl PrometheusSource {
    /// Create a new client with a 30 second request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a new client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL of the backend.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn query(&self, query: &MetricQuery) -> Result<Vec<MetricSample>, MetricsError> {
        let url = format!("{}/api/v1/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query.promql.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Prometheus reports bad queries as 4xx with a JSON error body.
        let parsed: QueryResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(MetricsError::Status {
                    status: status.as_u16(),
                    body,
                })
            }
            Err(e) => {
                return Err(MetricsError::Query {
                    query: query.name.clone(),
                    error: e.to_string(),
                })
            }
        };

        if parsed.status != "success" {
            return Err(MetricsError::Query {
                query: query.name.clone(),
                error: parsed
                    .error
                    .unwrap_or_else(|| format!("status {}", parsed.status)),
            });
        }

        Ok(parsed
            .data
            .map(|data| data.result)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|series| series.into_sample(&query.name))
            .collect())
    }
}

#[async_trait]
impl MetricsSource for PrometheusSource {
    async fn fetch(&self, queries: &[MetricQuery]) -> Result<Vec<MetricSample>, MetricsError> {
        let mut samples = Vec::new();

        for query in queries {
            match self.query(query).await {
                Ok(batch) => {
                    debug!(metric = %query.name, count = batch.len(), "Metric query succeeded");
                    samples.extend(batch);
                }
                Err(e @ MetricsError::Transport(_)) => return Err(e),
                Err(e) => warn!(
                    metric = %query.name,
                    category = e.category(),
                    error = %e,
                    "Metric query failed, skipping"
                ),
            }
        }

        Ok(samples)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSeries>,
}

#[derive(Debug, Deserialize)]
struct VectorSeries {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

impl VectorSeries {
    fn into_sample(self, name: &str) -> Option<MetricSample> {
        let (ts, raw) = self.value;
        let value = raw.parse::<f64>().ok().filter(|v| v.is_finite())?;

        #[allow(clippy::cast_possible_truncation)]
        let timestamp =
            DateTime::<Utc>::from_timestamp_millis((ts * 1000.0) as i64).unwrap_or_else(Utc::now);

        let mut sample = MetricSample::new(name, value).at(timestamp);
        sample.labels = self.metric;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn vector(results: serde_json::Value) -> serde_json::Value {
        json!({"status": "success", "data": {"resultType": "vector", "result": results}})
    }

    #[test]
    fn default_queries_cover_monitored_metrics() {
        let names: Vec<_> = default_queries().into_iter().map(|q| q.name).collect();
        assert_eq!(
            names,
            vec!["cpu_usage", "memory_usage", "pod_count", "request_rate"]
        );
    }

    #[tokio::test]
    async fn converts_vector_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(query_param("query", "up"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vector(json!([
                {"metric": {"pod": "web-1", "service": "web"}, "value": [1_700_000_000.5, "93.25"]},
                {"metric": {"pod": "web-2"}, "value": [1_700_000_000.5, "NaN"]}
            ]))))
            .mount(&server)
            .await;

        let source = PrometheusSource::new(server.uri()).unwrap();
        let samples = source
            .fetch(&[MetricQuery::new("cpu_usage", "up")])
            .await
            .unwrap();

        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(sample.name, "cpu_usage");
        assert!((sample.value - 93.25).abs() < f64::EPSILON);
        assert_eq!(sample.service(), Some("web"));
        assert_eq!(sample.labels.get("pod").map(String::as_str), Some("web-1"));
        assert_eq!(sample.timestamp.timestamp_millis(), 1_700_000_000_500);
    }

    #[tokio::test]
    async fn failing_query_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(query_param("query", "bad("))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "status": "error",
                "errorType": "bad_data",
                "error": "parse error"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query"))
            .and(query_param("query", "good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vector(json!([
                {"metric": {}, "value": [1_700_000_000, "4"]}
            ]))))
            .mount(&server)
            .await;

        let source = PrometheusSource::new(server.uri()).unwrap();
        let samples = source
            .fetch(&[
                MetricQuery::new("broken", "bad("),
                MetricQuery::new("pod_count", "good"),
            ])
            .await
            .unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "pod_count");
    }

    #[tokio::test]
    async fn unreachable_backend_is_transient() {
        // Nothing listens on the discard port.
        let source = PrometheusSource::new("http://127.0.0.1:9").unwrap();
        let err = source.fetch(&default_queries()).await.unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(err.category(), "transient_infra_error");
    }
}
