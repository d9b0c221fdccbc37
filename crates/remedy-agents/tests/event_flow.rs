//! End-to-end event flow through bus, router, registry and agents.
//!
//! Runs entirely in process against `MockCluster`:
//!   cargo test -p remedy-agents --test event_flow

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use remedy_agents::{
    Agent, AgentCore, AgentError, AgentRegistry, BusHandler, EventBus, EventRouter, InMemoryBus,
    MonitoringAgent, RouteError, ScalingAgent, SelfHealingAgent,
};
use remedy_core::events::topics;
use remedy_core::{AgentId, AgentIdentity, Event, HealingAction, MetricSample, ScalingAction};
use remedy_engine::{AnomalyDetector, HealingEngine, ScalingConfig, ScalingEngine};
use remedy_kube::k8s::mock::objects;
use remedy_kube::{MockCluster, MutationCall};

const CRASH: &[u8] = br#"{"service_id":"web-1","failure_type":"crash"}"#;

// =============================================================================
// Helpers
// =============================================================================

#[derive(Clone, Copy)]
enum Behaviour {
    Succeed,
    Fail,
    Panic,
}

struct Scripted {
    core: AgentCore,
    behaviour: Behaviour,
    handled: AtomicUsize,
}

impl Scripted {
    fn new(id: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            core: AgentCore::new(AgentIdentity::new(AgentId::new(id).unwrap(), id, "")),
            behaviour,
            handled: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Agent for Scripted {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn subscriptions(&self) -> &'static [&'static str] {
        &[topics::ERROR_DETECTED]
    }

    async fn on_event(&self, _event: &Event) -> remedy_agents::Result<()> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(AgentError::Handler {
                agent_id: self.core.id().clone(),
                message: "simulated failure".into(),
            }),
            Behaviour::Panic => panic!("simulated panic"),
        }
    }
}

type Captured = Arc<Mutex<Vec<Event>>>;

async fn capture(bus: &InMemoryBus, topic: &'static str) -> Captured {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let handler: BusHandler = Arc::new(move |payload| {
        let sink = sink.clone();
        async move {
            if let Ok(event) = Event::decode(topic, &payload) {
                sink.lock().push(event);
            }
        }
        .boxed()
    });
    bus.subscribe(topic, handler).await.unwrap();
    captured
}

async fn wire(agents: Vec<Arc<dyn Agent>>) -> (Arc<AgentRegistry>, Arc<EventRouter>) {
    let registry = Arc::new(AgentRegistry::new());
    let router = Arc::new(EventRouter::new(registry.clone()));
    for agent in agents {
        router.subscribe_agent(agent.as_ref());
        registry.register(agent).unwrap();
    }
    registry.start_all().await.unwrap();
    (registry, router)
}

// =============================================================================
// Router fault isolation
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_subscriber_does_not_block_others() {
    let first = Scripted::new("first", Behaviour::Succeed);
    let second = Scripted::new("second", Behaviour::Fail);
    let third = Scripted::new("third", Behaviour::Succeed);
    let (_registry, router) = wire(vec![
        first.clone() as Arc<dyn Agent>,
        second.clone(),
        third.clone(),
    ])
    .await;

    let report = router.route(topics::ERROR_DETECTED, CRASH).await.unwrap();

    assert!(report.is_partial());
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].agent_id.as_str(), "second");
    assert_eq!(report.failures[0].category, "handler_error");
    for agent in [&first, &second, &third] {
        assert_eq!(agent.handled.load(Ordering::SeqCst), 1);
    }

    // The failure is recorded but does not stop the agent.
    assert_eq!(
        second.health_check().message,
        "agent second failed: simulated failure"
    );
    assert!(second.health_check().healthy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_subscriber_is_isolated() {
    let steady = Scripted::new("steady", Behaviour::Succeed);
    let crashing = Scripted::new("crashing", Behaviour::Panic);
    let (_registry, router) = wire(vec![steady.clone() as Arc<dyn Agent>, crashing]).await;

    let report = router.route(topics::ERROR_DETECTED, CRASH).await.unwrap();

    assert_eq!(report.delivered, vec![AgentId::new("steady").unwrap()]);
    assert_eq!(report.failures[0].category, "handler_panicked");

    // Later events still reach the survivor.
    router.route(topics::ERROR_DETECTED, CRASH).await.unwrap();
    assert_eq!(steady.handled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn every_subscriber_failing_is_an_error() {
    let (_registry, router) = wire(vec![
        Scripted::new("a", Behaviour::Fail) as Arc<dyn Agent>,
        Scripted::new("b", Behaviour::Fail),
    ])
    .await;

    let err = router.route(topics::ERROR_DETECTED, CRASH).await.unwrap_err();
    assert!(matches!(err, RouteError::AllFailed { ref failures, .. } if failures.len() == 2));
    assert_eq!(err.category(), "delivery_failed");
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn registry_rejects_duplicate_ids() {
    let registry = AgentRegistry::new();
    registry.register(Scripted::new("dup", Behaviour::Succeed)).unwrap();

    let err = registry
        .register(Scripted::new("dup", Behaviour::Succeed))
        .unwrap_err();
    assert!(matches!(err, AgentError::DuplicateId(ref id) if id.as_str() == "dup"));
    assert_eq!(registry.len(), 1);
}

// =============================================================================
// Healing and scaling chains
// =============================================================================

#[tokio::test]
async fn crash_report_is_healed_end_to_end() {
    let cluster = Arc::new(MockCluster::new().with_pod(objects::pod("web-1", Some("web"))));
    let bus = Arc::new(InMemoryBus::new());
    let completed = capture(&bus, topics::HEALING_COMPLETED).await;

    let healer = Arc::new(SelfHealingAgent::new(
        AgentId::new("self-healing").unwrap(),
        HealingEngine::new(cluster.clone()),
        bus.clone(),
    ));
    let (_registry, router) = wire(vec![healer as Arc<dyn Agent>]).await;
    router.attach(bus.as_ref()).await.unwrap();

    bus.publish(topics::HEALING_REQUIRED, CRASH.to_vec())
        .await
        .unwrap();

    assert_eq!(cluster.calls(), vec![MutationCall::RestartPod("web-1".into())]);
    let completed = completed.lock().clone();
    assert_eq!(completed.len(), 1);
    match &completed[0] {
        Event::HealingCompleted(record) => {
            assert!(record.result.success);
            assert_eq!(record.result.action, HealingAction::Restart);
            assert!(record.explanation.contains("web-1"));
            assert!(record.explanation.contains("restarted"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_bus_payload_never_reaches_agents() {
    let cluster = Arc::new(MockCluster::new().with_pod(objects::pod("web-1", Some("web"))));
    let bus = Arc::new(InMemoryBus::new());
    let healer = Arc::new(SelfHealingAgent::new(
        AgentId::new("self-healing").unwrap(),
        HealingEngine::new(cluster.clone()),
        bus.clone(),
    ));
    let (_registry, router) = wire(vec![healer as Arc<dyn Agent>]).await;
    router.attach(bus.as_ref()).await.unwrap();

    bus.publish(topics::HEALING_REQUIRED, b"not json".to_vec())
        .await
        .unwrap();

    assert!(cluster.calls().is_empty());
    assert!(cluster.has_pod("web-1"));
}

#[tokio::test]
async fn cpu_spike_scales_the_service() {
    let cluster = Arc::new(
        MockCluster::new().with_deployment(objects::deployment("api", Some("1"), "api:v1")),
    );
    let bus = Arc::new(InMemoryBus::new());
    let anomalies = capture(&bus, topics::ANOMALY_DETECTED).await;
    let scaled = capture(&bus, topics::SCALING_COMPLETED).await;

    let monitor = Arc::new(MonitoringAgent::new(
        AgentId::new("monitoring").unwrap(),
        AnomalyDetector::default(),
        bus.clone(),
    ));
    let scaler = Arc::new(ScalingAgent::new(
        AgentId::new("scaling").unwrap(),
        ScalingEngine::new(cluster.clone(), ScalingConfig::default()),
        bus.clone(),
    ));
    let (_registry, router) = wire(vec![monitor as Arc<dyn Agent>, scaler]).await;
    router.attach(bus.as_ref()).await.unwrap();

    let start = Utc::now() - Duration::minutes(30);
    let mut samples: Vec<MetricSample> = (0..20)
        .map(|i| {
            MetricSample::new("cpu_usage", 10.0)
                .with_label("service", "api")
                .at(start + Duration::minutes(i))
        })
        .collect();
    samples.push(
        MetricSample::new("cpu_usage", 100.0)
            .with_label("service", "api")
            .at(start + Duration::minutes(25)),
    );

    bus.publish_event(&Event::MetricsCollected(samples))
        .await
        .unwrap();

    assert_eq!(anomalies.lock().len(), 1);
    assert_eq!(cluster.replicas("api"), Some(5));

    let scaled = scaled.lock().clone();
    match scaled.as_slice() {
        [Event::ScalingCompleted(record)] => {
            assert!(record.result.success);
            assert_eq!(record.result.action, ScalingAction::ScaleUp);
            assert_eq!(record.result.previous_replicas, 3);
            assert_eq!(record.result.new_replicas, 5);
            assert!(record.explanation.contains("api"));
        }
        other => panic!("unexpected events: {other:?}"),
    }
}
