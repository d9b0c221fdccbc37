//! Bounded, cancellable observation of pod recreation.
//!
//! After a pod is deleted its controller creates a replacement. The adapter
//! does not wait for that on the caller's path; it spawns [`await_recreation`]
//! which polls on an interval until a replacement is running, the deadline
//! passes, or the adapter shuts down.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::types::RecreationOutcome;
use crate::Result;

/// Find a running pod that replaces `old_name` (a different name, or the
/// same name with a different UID as StatefulSets do).
#[must_use]
pub fn find_replacement<'a>(
    pods: &'a [Pod],
    old_name: &str,
    old_uid: Option<&str>,
) -> Option<&'a str> {
    pods.iter()
        .filter(|pod| {
            pod.status
                .as_ref()
                .and_then(|s| s.phase.as_deref())
                .is_some_and(|phase| phase == "Running")
        })
        .find(|pod| {
            let name = pod.metadata.name.as_deref().unwrap_or_default();
            let uid = pod.metadata.uid.as_deref();
            name != old_name || (old_uid.is_some() && uid != old_uid)
        })
        .and_then(|pod| pod.metadata.name.as_deref())
}

/// Poll `list` every `interval` until a replacement for `old_name` is running.
///
/// List errors are logged and polling continues. The first poll happens one
/// interval after the call.
pub async fn await_recreation<F, Fut>(
    mut list: F,
    old_name: &str,
    old_uid: Option<&str>,
    interval: Duration,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> RecreationOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<Pod>>>,
{
    if *shutdown.borrow() {
        return RecreationOutcome::Cancelled;
    }

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval() fires immediately; the pod was only just deleted.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = &mut deadline => return RecreationOutcome::TimedOut,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return RecreationOutcome::Cancelled;
                }
            }
            _ = ticker.tick() => match list().await {
                Ok(pods) => {
                    if let Some(new_pod) = find_replacement(&pods, old_name, old_uid) {
                        return RecreationOutcome::Recreated {
                            new_pod: new_pod.to_string(),
                        };
                    }
                    debug!(pod = old_name, "Replacement pod not running yet");
                }
                Err(e) => warn!(pod = old_name, error = %e, "Failed to list pods while awaiting recreation"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::mock::objects::pod;
    use crate::MutationError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn running(name: &str, uid: &str) -> Pod {
        let mut p = pod(name, Some("web"));
        p.metadata.uid = Some(uid.to_string());
        p
    }

    #[test]
    fn replacement_needs_running_phase() {
        let mut pending = running("web-b", "2");
        pending.status.as_mut().unwrap().phase = Some("Pending".to_string());
        assert_eq!(find_replacement(&[pending], "web-a", Some("1")), None);
    }

    #[test]
    fn replacement_by_new_name_or_uid() {
        let pods = vec![running("web-a", "1"), running("web-b", "2")];
        assert_eq!(find_replacement(&pods, "web-a", Some("1")), Some("web-b"));

        // StatefulSet pods come back under the same name.
        let pods = vec![running("db-0", "new")];
        assert_eq!(find_replacement(&pods, "db-0", Some("old")), Some("db-0"));
        assert_eq!(find_replacement(&pods, "db-0", Some("new")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn recreated_after_a_few_polls() {
        let polls = Arc::new(AtomicUsize::new(0));
        let (_tx, rx) = watch::channel(false);

        let counter = polls.clone();
        let outcome = await_recreation(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Ok(vec![])
                    } else {
                        Ok(vec![running("web-b", "2")])
                    }
                }
            },
            "web-a",
            Some("1"),
            Duration::from_secs(5),
            Duration::from_secs(300),
            rx,
        )
        .await;

        assert_eq!(
            outcome,
            RecreationOutcome::Recreated {
                new_pod: "web-b".to_string()
            }
        );
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_and_tolerates_list_errors() {
        let (_tx, rx) = watch::channel(false);
        let outcome = await_recreation(
            || async {
                Err(MutationError::ResourceNotFound {
                    kind: "Pod",
                    name: "web-a".into(),
                })
            },
            "web-a",
            None,
            Duration::from_secs(5),
            Duration::from_secs(30),
            rx,
        )
        .await;
        assert_eq!(outcome, RecreationOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_on_shutdown() {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            await_recreation(
                || async { Ok(vec![]) },
                "web-a",
                None,
                Duration::from_secs(5),
                Duration::from_secs(300),
                rx,
            )
            .await
        });

        tokio::time::sleep(Duration::from_secs(12)).await;
        tx.send_replace(true);

        assert_eq!(handle.await.unwrap(), RecreationOutcome::Cancelled);
    }

    #[tokio::test]
    async fn already_shut_down_returns_immediately() {
        let (_tx, rx) = watch::channel(true);
        let outcome = await_recreation(
            || async { Ok(vec![]) },
            "web-a",
            None,
            Duration::from_secs(5),
            Duration::from_secs(300),
            rx,
        )
        .await;
        assert_eq!(outcome, RecreationOutcome::Cancelled);
    }
}
