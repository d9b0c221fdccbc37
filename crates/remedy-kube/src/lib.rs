//! Kubernetes mutation adapter for remedy.
//!
//! This crate provides the [`ClusterMutator`] trait and its [`K8sMutator`]
//! implementation, which execute healing and scaling decisions as cluster
//! mutations:
//!
//! - **Replica patches** on Deployments, falling back to StatefulSets
//! - **Pod restarts** with a background, cancellable recreation watch
//! - **Rollbacks** to the immediately preceding ReplicaSet revision
//! - **Pod replacement** for `app`-labelled pods
//!
//! Every operation is safe to retry. Each API round-trip is bounded by
//! [`KubeConfig::api_timeout`]; a call that runs out of time reports
//! [`MutationError::DeadlineExceeded`] so the caller knows the mutation state
//! is unknown.
//!
//! # Example
//!
//! ```no_run
//! use remedy_kube::{ClusterMutator, K8sMutator, KubeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mutator = K8sMutator::new(KubeConfig::default()).await?;
//!
//! let kind = mutator.set_replicas("web", 5).await?;
//! println!("scaled {kind} web to 5");
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature for an in-memory cluster:
//!
//! ```ignore
//! use remedy_kube::{ClusterMutator, MockCluster};
//! use remedy_kube::k8s::mock::objects;
//!
//! # async fn example() {
//! let cluster = MockCluster::new().with_deployment(objects::deployment("web", Some("1"), "web:v1"));
//! cluster.set_replicas("web", 5).await.unwrap();
//! assert_eq!(cluster.replicas("web"), Some(5));
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod k8s;
pub mod revision;
pub mod types;
pub mod watch;

pub use error::{MutationError, Result};
pub use k8s::{ClusterMutator, K8sMutator};
pub use types::{KubeConfig, RecreationOutcome, RollbackOutcome, WorkloadKind};

#[cfg(any(test, feature = "test-utils"))]
pub use k8s::mock::{MockCluster, MutationCall};
