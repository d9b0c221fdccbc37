//! Kubernetes mutation adapter.
//!
//! This module provides the [`ClusterMutator`] trait and the [`K8sMutator`]
//! implementation backed by a `kube` client. Every operation is safe to
//! retry: deletes treat 404 as success and patches only set absolute values.

use std::future::Future;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use remedy_core::ReplicaBounds;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::revision::{
    deployment_container, format_label_selector, image_patch, replica_set_image, replicas_patch,
    revision_of, select_previous,
};
use crate::types::{KubeConfig, RecreationOutcome, RollbackOutcome, WorkloadKind};
use crate::watch::await_recreation;
use crate::{MutationError, Result};

/// Label used to resolve a pod's owning workload.
pub const APP_LABEL: &str = "app";

/// The `ClusterMutator` trait defines the cluster operations remediation needs.
#[async_trait]
pub trait ClusterMutator: Send + Sync {
    /// Set the replica count of a Deployment, or of a StatefulSet if no
    /// Deployment has that name.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if neither kind exists.
    async fn set_replicas(&self, name: &str, replicas: u32) -> Result<WorkloadKind>;

    /// Read the desired replica count of a Deployment or StatefulSet.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` if neither kind exists.
    async fn current_replicas(&self, name: &str) -> Result<u32>;

    /// Look up autoscaler bounds for a workload, if an HPA targets it.
    ///
    /// # Errors
    ///
    /// Returns an error if the autoscalers cannot be listed.
    async fn replica_bounds(&self, name: &str) -> Result<Option<ReplicaBounds>>;

    /// Force-delete a pod and observe its recreation in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails (except 404).
    async fn restart_pod(&self, name: &str) -> Result<()>;

    /// Patch a deployment's container image back to its previous revision.
    ///
    /// # Errors
    ///
    /// Returns `NoPreviousRevision` if there is nothing to roll back to.
    async fn rollback_deployment(&self, name: &str) -> Result<RollbackOutcome>;

    /// Force-delete a pod owned by an `app`-labelled deployment.
    ///
    /// # Errors
    ///
    /// Returns `MissingAppLabel` if the pod has no `app` label.
    async fn replace_pod(&self, name: &str) -> Result<()>;
}

/// Kubernetes-backed cluster mutator.
///
/// All calls are scoped to one namespace and bounded by the configured API
/// deadline. No client-side lock is held across calls.
pub struct K8sMutator {
    client: Client,
    config: KubeConfig,
    shutdown: watch::Sender<bool>,
}

impl K8sMutator {
    /// Create a new mutator using in-cluster config or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn new(config: KubeConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| MutationError::Config(format!("Failed to create Kubernetes client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a mutator with a pre-configured client.
    #[must_use]
    pub fn with_client(client: Client, config: KubeConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            client,
            config,
            shutdown,
        }
    }

    /// Get a reference to the config.
    #[must_use]
    pub fn config(&self) -> &KubeConfig {
        &self.config
    }

    /// Cancel every background recreation watch.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    fn deployments(&self) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn stateful_sets(&self) -> Api<StatefulSet> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn replica_sets(&self) -> Api<ReplicaSet> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn autoscalers(&self) -> Api<HorizontalPodAutoscaler> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Run one API call under the configured deadline.
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>> + Send,
        T: Send,
    {
        let timeout = self.config.api_timeout;
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| MutationError::DeadlineExceeded { operation, timeout })?
            .map_err(MutationError::from)
    }

    /// Like [`Self::call`], mapping 404 to `None`.
    async fn call_opt<T, F>(&self, operation: &'static str, fut: F) -> Result<Option<T>>
    where
        F: Future<Output = std::result::Result<T, kube::Error>> + Send,
        T: Send,
    {
        let timeout = self.config.api_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Err(_) => Err(MutationError::DeadlineExceeded { operation, timeout }),
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(kube::Error::Api(e))) if e.code == 404 => Ok(None),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Delete a pod with zero grace period. A missing pod is already deleted.
    async fn force_delete(&self, name: &str) -> Result<()> {
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..DeleteParams::default()
        };
        let pods = self.pods();
        match self.call_opt("delete_pod", pods.delete(name, &params)).await? {
            Some(_) => info!(pod = name, "Force-deleted pod"),
            None => warn!(pod = name, "Pod not found, already deleted"),
        }
        Ok(())
    }

    fn spawn_recreation_watch(&self, old_name: &str, old_uid: Option<String>, app: Option<&str>) {
        let pods = self.pods();
        let params = match app {
            Some(app) => ListParams::default().labels(&format!("{APP_LABEL}={app}")),
            None => ListParams::default().fields(&format!("metadata.name={old_name}")),
        };
        let shutdown = self.shutdown.subscribe();
        let interval = self.config.ready_poll_interval;
        let timeout = self.config.ready_timeout;
        let old_name = old_name.to_string();

        tokio::spawn(async move {
            let outcome = await_recreation(
                || {
                    let pods = pods.clone();
                    let params = params.clone();
                    async move {
                        pods.list(&params)
                            .await
                            .map(|list| list.items)
                            .map_err(MutationError::from)
                    }
                },
                &old_name,
                old_uid.as_deref(),
                interval,
                timeout,
                shutdown,
            )
            .await;

            match outcome {
                RecreationOutcome::Recreated { new_pod } => {
                    info!(old_pod = %old_name, new_pod = %new_pod, "Pod recreated and running");
                }
                RecreationOutcome::TimedOut => {
                    warn!(pod = %old_name, timeout = ?timeout, "Timeout waiting for pod to be recreated");
                }
                RecreationOutcome::Cancelled => {
                    debug!(pod = %old_name, "Recreation watch cancelled");
                }
            }
        });
    }

    fn spawn_availability_check(&self, app: String) {
        let deployments = self.deployments();
        let timeout = self.config.api_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, deployments.get_opt(&app)).await {
                Ok(Ok(Some(deployment))) => {
                    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
                    let available = deployment
                        .status
                        .as_ref()
                        .and_then(|s| s.available_replicas)
                        .unwrap_or(0);
                    if available < desired {
                        warn!(
                            deployment = %app,
                            available,
                            desired,
                            "Deployment below desired replicas after pod replacement"
                        );
                    }
                }
                Ok(Ok(None)) => debug!(deployment = %app, "No deployment matches pod app label"),
                Ok(Err(e)) => debug!(deployment = %app, error = %e, "Availability check failed"),
                Err(_) => debug!(deployment = %app, "Availability check timed out"),
            }
        });
    }
}

#[async_trait]
impl ClusterMutator for K8sMutator {
    async fn set_replicas(&self, name: &str, replicas: u32) -> Result<WorkloadKind> {
        let patch = replicas_patch(replicas);
        let params = PatchParams::default();

        let deployments = self.deployments();
        if self
            .call_opt(
                "patch_deployment",
                deployments.patch(name, &params, &Patch::Merge(&patch)),
            )
            .await?
            .is_some()
        {
            info!(service = name, replicas, kind = "Deployment", "Set replicas");
            return Ok(WorkloadKind::Deployment);
        }
        debug!(service = name, "No Deployment found, trying StatefulSet");

        let stateful_sets = self.stateful_sets();
        if self
            .call_opt(
                "patch_statefulset",
                stateful_sets.patch(name, &params, &Patch::Merge(&patch)),
            )
            .await?
            .is_some()
        {
            info!(service = name, replicas, kind = "StatefulSet", "Set replicas");
            return Ok(WorkloadKind::StatefulSet);
        }

        Err(MutationError::ResourceNotFound {
            kind: "Deployment/StatefulSet",
            name: name.to_string(),
        })
    }

    async fn current_replicas(&self, name: &str) -> Result<u32> {
        let deployments = self.deployments();
        if let Some(deployment) = self.call_opt("get_deployment", deployments.get(name)).await? {
            let replicas = desired_replicas(deployment.spec.and_then(|s| s.replicas));
            debug!(service = name, replicas, "Retrieved current replicas from deployment");
            return Ok(replicas);
        }

        let stateful_sets = self.stateful_sets();
        if let Some(set) = self.call_opt("get_statefulset", stateful_sets.get(name)).await? {
            let replicas = desired_replicas(set.spec.and_then(|s| s.replicas));
            debug!(service = name, replicas, "Retrieved current replicas from statefulset");
            return Ok(replicas);
        }

        Err(MutationError::ResourceNotFound {
            kind: "Deployment/StatefulSet",
            name: name.to_string(),
        })
    }

    async fn replica_bounds(&self, name: &str) -> Result<Option<ReplicaBounds>> {
        let autoscalers = self.autoscalers();
        let list = self
            .call("list_hpas", autoscalers.list(&ListParams::default()))
            .await?;
        Ok(bounds_for(&list.items, name))
    }

    async fn restart_pod(&self, name: &str) -> Result<()> {
        let pods = self.pods();
        let Some(pod) = self.call_opt("get_pod", pods.get(name)).await? else {
            warn!(pod = name, "Pod not found, nothing to restart");
            return Ok(());
        };

        let old_uid = pod.metadata.uid.clone();
        let app = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(APP_LABEL))
            .cloned();

        self.force_delete(name).await?;
        self.spawn_recreation_watch(name, old_uid, app.as_deref());
        Ok(())
    }

    async fn rollback_deployment(&self, name: &str) -> Result<RollbackOutcome> {
        let deployments = self.deployments();
        let deployment = self
            .call_opt("get_deployment", deployments.get(name))
            .await?
            .ok_or_else(|| MutationError::ResourceNotFound {
                kind: "Deployment",
                name: name.to_string(),
            })?;

        let selector = deployment
            .spec
            .as_ref()
            .map(|s| format_label_selector(&s.selector))
            .unwrap_or_default();
        let replica_sets = self.replica_sets();
        let history = self
            .call(
                "list_replicasets",
                replica_sets.list(&ListParams::default().labels(&selector)),
            )
            .await?;

        let previous = select_previous(&deployment, &history.items)?;
        let rs_name = previous.metadata.name.clone().unwrap_or_default();
        let image = replica_set_image(previous).ok_or_else(|| MutationError::MissingContainer {
            kind: "ReplicaSet",
            name: rs_name.clone(),
        })?;
        let (container, current_image) =
            deployment_container(&deployment).ok_or_else(|| MutationError::MissingContainer {
                kind: "Deployment",
                name: name.to_string(),
            })?;

        let outcome = RollbackOutcome {
            replica_set: rs_name,
            revision: revision_of(previous).unwrap_or_default(),
            image: image.to_string(),
            patched: current_image != Some(image),
        };

        if outcome.patched {
            let patch = image_patch(container, image);
            self.call(
                "patch_deployment",
                deployments.patch(name, &PatchParams::default(), &Patch::Strategic(&patch)),
            )
            .await?;
            info!(
                deployment = name,
                revision = outcome.revision,
                image = %outcome.image,
                "Deployment rolled back"
            );
        } else {
            info!(deployment = name, image = %outcome.image, "Deployment already on previous image");
        }

        Ok(outcome)
    }

    async fn replace_pod(&self, name: &str) -> Result<()> {
        let pods = self.pods();
        let Some(pod) = self.call_opt("get_pod", pods.get(name)).await? else {
            warn!(pod = name, "Pod not found, already replaced");
            return Ok(());
        };

        let app = pod
            .metadata
            .labels
            .as_ref()
            .and_then(|l| l.get(APP_LABEL))
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| MutationError::MissingAppLabel {
                pod: name.to_string(),
            })?;

        self.force_delete(name).await?;
        self.spawn_availability_check(app);
        info!(pod = name, "Pod replacement initiated");
        Ok(())
    }
}

/// Desired replicas of a workload spec. The API server defaults an unset
/// count to 1.
fn desired_replicas(replicas: Option<i32>) -> u32 {
    replicas.map_or(1, |r| u32::try_from(r).unwrap_or(0))
}

/// Find the bounds of the autoscaler targeting `name`.
fn bounds_for(autoscalers: &[HorizontalPodAutoscaler], name: &str) -> Option<ReplicaBounds> {
    autoscalers
        .iter()
        .filter_map(|hpa| hpa.spec.as_ref())
        .find(|spec| spec.scale_target_ref.name == name)
        .map(|spec| {
            let min = spec.min_replicas.unwrap_or(1);
            ReplicaBounds::new(
                u32::try_from(min).unwrap_or(1),
                u32::try_from(spec.max_replicas).unwrap_or(1),
            )
        })
}

/// An in-memory cluster for testing without a real Kubernetes API server.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use crate::revision::match_labels;
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::time::Duration;

    /// A mutation the mock has received.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MutationCall {
        /// `set_replicas(name, replicas)`.
        SetReplicas {
            /// Target workload.
            name: String,
            /// Requested count.
            replicas: u32,
        },
        /// `restart_pod(name)`.
        RestartPod(String),
        /// `rollback_deployment(name)`.
        RollbackDeployment(String),
        /// `replace_pod(name)`.
        ReplacePod(String),
    }

    #[derive(Default)]
    struct State {
        deployments: BTreeMap<String, Deployment>,
        stateful_sets: BTreeMap<String, StatefulSet>,
        replica_sets: Vec<ReplicaSet>,
        pods: BTreeMap<String, Pod>,
        autoscalers: Vec<HorizontalPodAutoscaler>,
        calls: Vec<MutationCall>,
        spec_changes: usize,
        recreated: u32,
        unreachable: bool,
    }

    /// A mock cluster that stores workloads in memory.
    ///
    /// Mutations follow the same rules as [`K8sMutator`], including revision
    /// selection, so idempotence can be asserted through [`Self::spec_changes`].
    #[derive(Default)]
    pub struct MockCluster {
        state: Mutex<State>,
    }

    impl MockCluster {
        /// Create an empty mock cluster.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a Deployment.
        #[must_use]
        pub fn with_deployment(self, deployment: Deployment) -> Self {
            let name = deployment.metadata.name.clone().unwrap_or_default();
            self.state.lock().deployments.insert(name, deployment);
            self
        }

        /// Add a StatefulSet.
        #[must_use]
        pub fn with_stateful_set(self, set: StatefulSet) -> Self {
            let name = set.metadata.name.clone().unwrap_or_default();
            self.state.lock().stateful_sets.insert(name, set);
            self
        }

        /// Add a ReplicaSet.
        #[must_use]
        pub fn with_replica_set(self, rs: ReplicaSet) -> Self {
            self.state.lock().replica_sets.push(rs);
            self
        }

        /// Add a Pod.
        #[must_use]
        pub fn with_pod(self, pod: Pod) -> Self {
            let name = pod.metadata.name.clone().unwrap_or_default();
            self.state.lock().pods.insert(name, pod);
            self
        }

        /// Add a HorizontalPodAutoscaler.
        #[must_use]
        pub fn with_autoscaler(self, hpa: HorizontalPodAutoscaler) -> Self {
            self.state.lock().autoscalers.push(hpa);
            self
        }

        /// Make every call fail as if the API server stopped answering.
        pub fn set_unreachable(&self, unreachable: bool) {
            self.state.lock().unreachable = unreachable;
        }

        /// Desired replicas of a Deployment or StatefulSet.
        #[must_use]
        pub fn replicas(&self, name: &str) -> Option<u32> {
            let state = self.state.lock();
            if let Some(deployment) = state.deployments.get(name) {
                return Some(desired_replicas(
                    deployment.spec.as_ref().and_then(|s| s.replicas),
                ));
            }
            let set = state.stateful_sets.get(name)?;
            Some(desired_replicas(set.spec.as_ref().and_then(|s| s.replicas)))
        }

        /// Image of a Deployment's first container.
        #[must_use]
        pub fn deployment_image(&self, name: &str) -> Option<String> {
            let state = self.state.lock();
            let deployment = state.deployments.get(name)?;
            deployment_container(deployment)?.1.map(str::to_string)
        }

        /// Whether a pod with this name exists.
        #[must_use]
        pub fn has_pod(&self, name: &str) -> bool {
            self.state.lock().pods.contains_key(name)
        }

        /// Names of all pods.
        #[must_use]
        pub fn pod_names(&self) -> Vec<String> {
            self.state.lock().pods.keys().cloned().collect()
        }

        /// Every mutation received, in order.
        #[must_use]
        pub fn calls(&self) -> Vec<MutationCall> {
            self.state.lock().calls.clone()
        }

        /// Number of mutations that changed stored state.
        #[must_use]
        pub fn spec_changes(&self) -> usize {
            self.state.lock().spec_changes
        }

        fn check_reachable(state: &State, operation: &'static str) -> Result<()> {
            if state.unreachable {
                return Err(MutationError::DeadlineExceeded {
                    operation,
                    timeout: Duration::from_secs(30),
                });
            }
            Ok(())
        }

        /// Delete a pod and let the "controller" create a running replacement.
        fn recreate(state: &mut State, name: &str) -> bool {
            let Some(old) = state.pods.remove(name) else {
                return false;
            };
            state.recreated += 1;
            let app = old
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(APP_LABEL))
                .cloned();
            let base = app.as_deref().unwrap_or(name);
            let new_name = format!("{base}-r{}", state.recreated);
            state
                .pods
                .insert(new_name.clone(), objects::pod(&new_name, app.as_deref()));
            state.spec_changes += 1;
            true
        }
    }

    #[async_trait]
    impl ClusterMutator for MockCluster {
        async fn set_replicas(&self, name: &str, replicas: u32) -> Result<WorkloadKind> {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            Self::check_reachable(state, "set_replicas")?;
            state.calls.push(MutationCall::SetReplicas {
                name: name.to_string(),
                replicas,
            });
            let desired = i32::try_from(replicas).unwrap_or(i32::MAX);

            let (kind, slot) = if let Some(d) = state.deployments.get_mut(name) {
                (
                    WorkloadKind::Deployment,
                    &mut d.spec.get_or_insert_with(Default::default).replicas,
                )
            } else if let Some(s) = state.stateful_sets.get_mut(name) {
                (
                    WorkloadKind::StatefulSet,
                    &mut s.spec.get_or_insert_with(Default::default).replicas,
                )
            } else {
                return Err(MutationError::ResourceNotFound {
                    kind: "Deployment/StatefulSet",
                    name: name.to_string(),
                });
            };

            if *slot != Some(desired) {
                *slot = Some(desired);
                state.spec_changes += 1;
            }
            Ok(kind)
        }

        async fn current_replicas(&self, name: &str) -> Result<u32> {
            Self::check_reachable(&self.state.lock(), "current_replicas")?;
            self.replicas(name)
                .ok_or_else(|| MutationError::ResourceNotFound {
                    kind: "Deployment/StatefulSet",
                    name: name.to_string(),
                })
        }

        async fn replica_bounds(&self, name: &str) -> Result<Option<ReplicaBounds>> {
            let state = self.state.lock();
            Self::check_reachable(&state, "replica_bounds")?;
            Ok(bounds_for(&state.autoscalers, name))
        }

        async fn restart_pod(&self, name: &str) -> Result<()> {
            let mut state = self.state.lock();
            Self::check_reachable(&state, "restart_pod")?;
            state.calls.push(MutationCall::RestartPod(name.to_string()));
            Self::recreate(&mut state, name);
            Ok(())
        }

        async fn rollback_deployment(&self, name: &str) -> Result<RollbackOutcome> {
            let mut state = self.state.lock();
            Self::check_reachable(&state, "rollback_deployment")?;
            state
                .calls
                .push(MutationCall::RollbackDeployment(name.to_string()));

            let deployment =
                state
                    .deployments
                    .get(name)
                    .ok_or_else(|| MutationError::ResourceNotFound {
                        kind: "Deployment",
                        name: name.to_string(),
                    })?;
            let selector = deployment
                .spec
                .as_ref()
                .map(|s| s.selector.clone())
                .unwrap_or_default();
            let history: Vec<ReplicaSet> = state
                .replica_sets
                .iter()
                .filter(|rs| match_labels(&selector, rs.metadata.labels.as_ref()))
                .cloned()
                .collect();

            let previous = select_previous(deployment, &history)?;
            let image = replica_set_image(previous)
                .ok_or_else(|| MutationError::MissingContainer {
                    kind: "ReplicaSet",
                    name: previous.metadata.name.clone().unwrap_or_default(),
                })?
                .to_string();
            let current_image = deployment_container(deployment)
                .ok_or_else(|| MutationError::MissingContainer {
                    kind: "Deployment",
                    name: name.to_string(),
                })?
                .1
                .map(str::to_string);

            let outcome = RollbackOutcome {
                replica_set: previous.metadata.name.clone().unwrap_or_default(),
                revision: revision_of(previous).unwrap_or_default(),
                patched: current_image.as_deref() != Some(image.as_str()),
                image,
            };

            if outcome.patched {
                if let Some(container) = state
                    .deployments
                    .get_mut(name)
                    .and_then(|d| d.spec.as_mut())
                    .and_then(|s| s.template.spec.as_mut())
                    .and_then(|p| p.containers.first_mut())
                {
                    container.image = Some(outcome.image.clone());
                }
                state.spec_changes += 1;
            }
            Ok(outcome)
        }

        async fn replace_pod(&self, name: &str) -> Result<()> {
            let mut state = self.state.lock();
            Self::check_reachable(&state, "replace_pod")?;
            state.calls.push(MutationCall::ReplacePod(name.to_string()));

            let Some(pod) = state.pods.get(name) else {
                return Ok(());
            };
            let has_app = pod
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(APP_LABEL))
                .is_some_and(|v| !v.is_empty());
            if !has_app {
                return Err(MutationError::MissingAppLabel {
                    pod: name.to_string(),
                });
            }
            Self::recreate(&mut state, name);
            Ok(())
        }
    }

    /// Builders for the Kubernetes objects the mock stores.
    pub mod objects {
        use std::collections::BTreeMap;

        use k8s_openapi::api::apps::v1::{
            Deployment, DeploymentSpec, ReplicaSet, ReplicaSetSpec, StatefulSet, StatefulSetSpec,
        };
        use k8s_openapi::api::autoscaling::v2::{
            CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
        };
        use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus, PodTemplateSpec};
        use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
        use kube::api::ObjectMeta;

        use crate::revision::REVISION_ANNOTATION;

        fn app_labels(app: &str) -> BTreeMap<String, String> {
            BTreeMap::from([(crate::k8s::APP_LABEL.to_string(), app.to_string())])
        }

        fn annotations(revision: Option<&str>) -> Option<BTreeMap<String, String>> {
            revision.map(|r| BTreeMap::from([(REVISION_ANNOTATION.to_string(), r.to_string())]))
        }

        fn template(image: &str) -> PodTemplateSpec {
            PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "app".to_string(),
                        image: Some(image.to_string()),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            }
        }

        /// A 3-replica Deployment selecting `app=<name>`.
        #[must_use]
        pub fn deployment(name: &str, revision: Option<&str>, image: &str) -> Deployment {
            Deployment {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    annotations: annotations(revision),
                    ..Default::default()
                },
                spec: Some(DeploymentSpec {
                    replicas: Some(3),
                    selector: LabelSelector {
                        match_labels: Some(app_labels(name)),
                        match_expressions: None,
                    },
                    template: template(image),
                    ..Default::default()
                }),
                status: None,
            }
        }

        /// A Deployment that leaves `spec.replicas` unset.
        #[must_use]
        pub fn unscaled_deployment(name: &str, image: &str) -> Deployment {
            let mut deployment = deployment(name, None, image);
            if let Some(spec) = deployment.spec.as_mut() {
                spec.replicas = None;
            }
            deployment
        }

        /// A ReplicaSet owned by deployment `owner`.
        #[must_use]
        pub fn replica_set(owner: &str, name: &str, revision: Option<&str>, image: &str) -> ReplicaSet {
            ReplicaSet {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    annotations: annotations(revision),
                    labels: Some(app_labels(owner)),
                    owner_references: Some(vec![OwnerReference {
                        api_version: "apps/v1".to_string(),
                        kind: "Deployment".to_string(),
                        name: owner.to_string(),
                        uid: format!("{owner}-uid"),
                        ..Default::default()
                    }]),
                    ..Default::default()
                },
                spec: Some(ReplicaSetSpec {
                    template: Some(template(image)),
                    ..Default::default()
                }),
                status: None,
            }
        }

        /// A StatefulSet with the given replica count.
        #[must_use]
        pub fn stateful_set(name: &str, replicas: i32) -> StatefulSet {
            StatefulSet {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: Some(StatefulSetSpec {
                    replicas: Some(replicas),
                    selector: LabelSelector {
                        match_labels: Some(app_labels(name)),
                        match_expressions: None,
                    },
                    ..Default::default()
                }),
                status: None,
            }
        }

        /// A running pod, optionally labelled `app=<app>`.
        #[must_use]
        pub fn pod(name: &str, app: Option<&str>) -> Pod {
            Pod {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    uid: Some(format!("{name}-uid")),
                    labels: app.map(app_labels),
                    ..Default::default()
                },
                spec: None,
                status: Some(PodStatus {
                    phase: Some("Running".to_string()),
                    ..Default::default()
                }),
            }
        }

        /// An autoscaler targeting `target`.
        #[must_use]
        pub fn autoscaler(target: &str, min: Option<i32>, max: i32) -> HorizontalPodAutoscaler {
            HorizontalPodAutoscaler {
                metadata: ObjectMeta {
                    name: Some(format!("{target}-hpa")),
                    ..Default::default()
                },
                spec: Some(HorizontalPodAutoscalerSpec {
                    scale_target_ref: CrossVersionObjectReference {
                        api_version: Some("apps/v1".to_string()),
                        kind: "Deployment".to_string(),
                        name: target.to_string(),
                    },
                    min_replicas: min,
                    max_replicas: max,
                    ..Default::default()
                }),
                status: None,
            }
        }
    }
}
