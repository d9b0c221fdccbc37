//! Remedy agent daemon.
//!
//! Connects to the cluster, starts the monitoring, self-healing and scaling
//! agents on an in-process bus, and serves health endpoints.
//!
//! # HTTP Endpoints
//!
//! ## Health & Readiness
//! - `GET /health` - Liveness check
//! - `GET /ready` - Ready once every agent is running
//! - `GET /v1/agents/health` - Per-agent health
//!
//! ## Events
//! - `POST /v1/events/:topic` - Publish a JSON payload on the bus

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use remedy_agents::{
    AgentRegistry, EventBus, EventRouter, InMemoryBus, MonitoringAgent, ScalingAgent,
    SelfHealingAgent, SystemHealth,
};
use remedy_core::{AgentId, ConfigError, Event};
use remedy_engine::{
    default_queries, Advisor, AnomalyDetector, EngineConfig, HealingEngine, HttpAdvisor,
    PrometheusSource, ScalingEngine,
};
use remedy_kube::{K8sMutator, KubeConfig};
use serde::Serialize;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default metrics collection interval.
const DEFAULT_COLLECT_INTERVAL_SECS: u64 = 30;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<AgentRegistry>,
    bus: Arc<InMemoryBus>,
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "remedy-agentd",
    })
}

async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if SystemHealth::collect(&state.registry).overall_healthy {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

async fn agents_health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(SystemHealth::collect(&state.registry))
}

// ============================================================================
// Event Endpoints
// ============================================================================

/// Error response format.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

/// Publish an event.
///
/// POST /v1/events/:topic
async fn publish_handler(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(e) = Event::decode(&topic, &body) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(e.to_string(), 400)),
        )
            .into_response();
    }

    match state.bus.publish(&topic, body.to_vec()).await {
        Ok(()) => {
            tracing::info!(topic = %topic, "Published event via HTTP API");
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            tracing::error!(topic = %topic, error = %e, "Failed to publish event");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(e.to_string(), 503)),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Router
// ============================================================================

fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & readiness
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/v1/agents/health", get(agents_health_handler))
        // Events
        .route("/v1/events/:topic", post(publish_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,remedy=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting remedy agent daemon");

    // Load configuration from environment
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let kube_config = KubeConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;
    let collect_interval = Duration::from_secs(
        ConfigError::parse_env::<u64>("METRICS_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_COLLECT_INTERVAL_SECS)
            .max(1),
    );

    tracing::info!(
        namespace = %kube_config.namespace,
        advisor = engine_config.advisor.url.as_deref().unwrap_or("disabled"),
        prometheus = engine_config.prometheus_url.as_deref().unwrap_or("disabled"),
        "Loaded configuration"
    );

    // Cluster access
    let mutator = Arc::new(K8sMutator::new(kube_config).await?);
    tracing::info!("Connected to Kubernetes cluster");

    // Engines
    let advisor: Option<Arc<dyn Advisor>> = match &engine_config.advisor.url {
        Some(url) => {
            let client = HttpAdvisor::new(url.clone(), engine_config.advisor.timeout)?;
            Some(Arc::new(client) as Arc<dyn Advisor>)
        }
        None => None,
    };

    let mut healing = HealingEngine::new(mutator.clone());
    let mut scaling = ScalingEngine::new(mutator.clone(), engine_config.scaling.clone());
    if let Some(advisor) = &advisor {
        healing = healing.with_advisor(advisor.clone(), engine_config.advisor.timeout);
        scaling = scaling.with_advisor(advisor.clone(), engine_config.advisor.timeout);
    }

    // Agents
    let bus = Arc::new(InMemoryBus::new());
    let registry = Arc::new(AgentRegistry::new());
    let router = Arc::new(EventRouter::new(registry.clone()));

    let mut monitoring = MonitoringAgent::new(
        AgentId::new("monitoring")?,
        AnomalyDetector::new(engine_config.detector.clone()),
        bus.clone(),
    );
    let collect = engine_config.prometheus_url.is_some();
    if let Some(url) = &engine_config.prometheus_url {
        let source = Arc::new(PrometheusSource::new(url.clone())?);
        monitoring = monitoring.with_source(source, default_queries());
    }
    let monitoring = Arc::new(monitoring);
    let self_healing = Arc::new(SelfHealingAgent::new(
        AgentId::new("self-healing")?,
        healing,
        bus.clone(),
    ));
    let scaler = Arc::new(ScalingAgent::new(
        AgentId::new("scaling")?,
        scaling,
        bus.clone(),
    ));

    registry.register(monitoring.clone())?;
    registry.register(self_healing.clone())?;
    registry.register(scaler.clone())?;
    router.subscribe_agent(monitoring.as_ref());
    router.subscribe_agent(self_healing.as_ref());
    router.subscribe_agent(scaler.as_ref());
    router.attach(bus.as_ref()).await?;

    registry.start_all().await?;
    tracing::info!(agents = registry.len(), topics = ?router.topics(), "Agents started");

    // Periodic metrics collection
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector = collect.then(|| {
        tracing::info!(interval_secs = collect_interval.as_secs(), "Started metrics collector");
        monitoring.clone().spawn_collector(collect_interval, shutdown_rx)
    });

    // Start server
    let state = AppState {
        registry: registry.clone(),
        bus,
    };
    let app = create_router(state);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Tear down
    shutdown_tx.send_replace(true);
    if let Some(collector) = collector {
        if let Err(e) = collector.await {
            tracing::warn!(error = %e, "Metrics collector ended abnormally");
        }
    }
    registry.stop_all().await;
    mutator.shutdown();
    tracing::info!("Remedy agent daemon stopped");

    Ok(())
}
