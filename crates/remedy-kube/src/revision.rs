//! ReplicaSet revision lookup and patch builders.
//!
//! Everything here is pure: it operates on `k8s-openapi` objects already
//! fetched from the API server, so the real adapter and the in-memory mock
//! share the same selection rules.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde_json::{json, Value};

use crate::{MutationError, Result};

/// Annotation the deployment controller stamps on Deployments and ReplicaSets.
pub const REVISION_ANNOTATION: &str = "deployment.kubernetes.io/revision";

/// Parse the revision annotation of an object's annotations.
///
/// Missing, empty and non-numeric annotations have no revision.
#[must_use]
pub fn revision_from(annotations: Option<&BTreeMap<String, String>>) -> Option<u64> {
    annotations?
        .get(REVISION_ANNOTATION)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())?
        .parse()
        .ok()
}

/// Revision of a ReplicaSet.
#[must_use]
pub fn revision_of(rs: &ReplicaSet) -> Option<u64> {
    revision_from(rs.metadata.annotations.as_ref())
}

/// Image of a ReplicaSet's first container.
#[must_use]
pub fn replica_set_image(rs: &ReplicaSet) -> Option<&str> {
    rs.spec
        .as_ref()?
        .template
        .as_ref()?
        .spec
        .as_ref()?
        .containers
        .first()?
        .image
        .as_deref()
}

/// Name and image of a Deployment's first container.
#[must_use]
pub fn deployment_container(deployment: &Deployment) -> Option<(&str, Option<&str>)> {
    let container = deployment
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()?;
    Some((container.name.as_str(), container.image.as_deref()))
}

/// True if the ReplicaSet is owned by the deployment, or has no owner recorded.
fn owned_by(rs: &ReplicaSet, deployment: &Deployment) -> bool {
    let Some(owners) = rs.metadata.owner_references.as_ref() else {
        return true;
    };
    if owners.is_empty() {
        return true;
    }
    let name = deployment.metadata.name.as_deref().unwrap_or_default();
    owners
        .iter()
        .any(|o| o.kind == "Deployment" && o.name == name)
}

/// Select the ReplicaSet to roll a deployment back to.
///
/// The current ReplicaSet is the one whose revision matches the deployment's
/// own revision annotation, or the highest revision when the deployment
/// carries none. The rollback target is the highest revision below it.
/// ReplicaSets without a revision, or owned by another deployment, never qualify.
///
/// # Errors
///
/// Returns `MutationError::NoPreviousRevision` if fewer than two ReplicaSets
/// exist or none qualifies.
pub fn select_previous<'a>(
    deployment: &Deployment,
    replica_sets: &'a [ReplicaSet],
) -> Result<&'a ReplicaSet> {
    let no_previous = || MutationError::NoPreviousRevision {
        deployment: deployment.metadata.name.clone().unwrap_or_default(),
    };

    if replica_sets.len() < 2 {
        return Err(no_previous());
    }

    let mut candidates: Vec<(u64, &ReplicaSet)> = replica_sets
        .iter()
        .filter(|rs| owned_by(rs, deployment))
        .filter_map(|rs| revision_of(rs).map(|rev| (rev, rs)))
        .collect();
    candidates.sort_by_key(|(rev, _)| std::cmp::Reverse(*rev));

    let current = revision_from(deployment.metadata.annotations.as_ref())
        .filter(|rev| candidates.iter().any(|(r, _)| r == rev))
        .or_else(|| candidates.first().map(|(rev, _)| *rev))
        .ok_or_else(no_previous)?;

    candidates
        .into_iter()
        .find(|(rev, _)| *rev < current)
        .map(|(_, rs)| rs)
        .ok_or_else(no_previous)
}

/// Render a label selector in the `key=value,key in (a,b)` list format.
#[must_use]
pub fn format_label_selector(selector: &LabelSelector) -> String {
    let mut parts: Vec<String> = selector
        .match_labels
        .iter()
        .flatten()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();

    for req in selector.match_expressions.iter().flatten() {
        let values = req.values.as_deref().unwrap_or_default().join(",");
        let part = match req.operator.as_str() {
            "In" => format!("{} in ({values})", req.key),
            "NotIn" => format!("{} notin ({values})", req.key),
            "Exists" => req.key.clone(),
            "DoesNotExist" => format!("!{}", req.key),
            _ => continue,
        };
        parts.push(part);
    }

    parts.join(",")
}

/// True if `labels` satisfy the selector's `matchLabels`.
///
/// `matchExpressions` are left to the API server.
#[must_use]
pub fn match_labels(selector: &LabelSelector, labels: Option<&BTreeMap<String, String>>) -> bool {
    selector.match_labels.iter().flatten().all(|(k, v)| {
        labels
            .and_then(|l| l.get(k))
            .is_some_and(|actual| actual == v)
    })
}

/// Merge patch touching only `spec.replicas`.
#[must_use]
pub fn replicas_patch(replicas: u32) -> Value {
    json!({ "spec": { "replicas": replicas } })
}

/// Strategic merge patch setting one container's image.
#[must_use]
pub fn image_patch(container: &str, image: &str) -> Value {
    json!({
        "spec": {
            "template": {
                "spec": {
                    "containers": [{ "name": container, "image": image }]
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::mock::objects::{deployment, replica_set};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    #[test]
    fn revision_parsing() {
        assert_eq!(revision_of(&replica_set("web", "a", Some("7"), "img")), Some(7));
        assert_eq!(revision_of(&replica_set("web", "a", Some(""), "img")), None);
        assert_eq!(revision_of(&replica_set("web", "a", Some("x"), "img")), None);
        assert_eq!(revision_of(&replica_set("web", "a", None, "img")), None);
    }

    #[test]
    fn selects_immediately_preceding_revision() {
        let dep = deployment("web", Some("3"), "web:v3");
        // Listing order from the API server is arbitrary.
        let sets = vec![
            replica_set("web", "web-2", Some("2"), "web:v2"),
            replica_set("web", "web-3", Some("3"), "web:v3"),
            replica_set("web", "web-1", Some("1"), "web:v1"),
        ];
        let prev = select_previous(&dep, &sets).unwrap();
        assert_eq!(prev.metadata.name.as_deref(), Some("web-2"));
        assert_eq!(replica_set_image(prev), Some("web:v2"));
    }

    #[test]
    fn current_falls_back_to_highest_revision() {
        let dep = deployment("web", None, "web:v5");
        let sets = vec![
            replica_set("web", "web-4", Some("4"), "web:v4"),
            replica_set("web", "web-5", Some("5"), "web:v5"),
        ];
        let prev = select_previous(&dep, &sets).unwrap();
        assert_eq!(prev.metadata.name.as_deref(), Some("web-4"));
    }

    #[test]
    fn fewer_than_two_replica_sets_fails() {
        let dep = deployment("web", Some("1"), "web:v1");
        let sets = vec![replica_set("web", "web-1", Some("1"), "web:v1")];
        assert!(matches!(
            select_previous(&dep, &sets),
            Err(MutationError::NoPreviousRevision { deployment }) if deployment == "web"
        ));
    }

    #[test]
    fn unrevisioned_and_foreign_sets_do_not_qualify() {
        let dep = deployment("web", Some("2"), "web:v2");
        let sets = vec![
            replica_set("web", "web-2", Some("2"), "web:v2"),
            replica_set("web", "web-x", Some(""), "web:vx"),
            replica_set("api", "api-1", Some("1"), "api:v1"),
        ];
        assert!(matches!(
            select_previous(&dep, &sets),
            Err(MutationError::NoPreviousRevision { .. })
        ));
    }

    #[test]
    fn label_selector_format() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([
                ("app".to_string(), "web".to_string()),
                ("tier".to_string(), "frontend".to_string()),
            ])),
            match_expressions: Some(vec![
                LabelSelectorRequirement {
                    key: "env".to_string(),
                    operator: "In".to_string(),
                    values: Some(vec!["prod".to_string(), "staging".to_string()]),
                },
                LabelSelectorRequirement {
                    key: "canary".to_string(),
                    operator: "DoesNotExist".to_string(),
                    values: None,
                },
            ]),
        };
        assert_eq!(
            format_label_selector(&selector),
            "app=web,tier=frontend,env in (prod,staging),!canary"
        );
    }

    #[test]
    fn match_labels_requires_every_pair() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
            match_expressions: None,
        };
        let web = BTreeMap::from([("app".to_string(), "web".to_string())]);
        let api = BTreeMap::from([("app".to_string(), "api".to_string())]);
        assert!(match_labels(&selector, Some(&web)));
        assert!(!match_labels(&selector, Some(&api)));
        assert!(!match_labels(&selector, None));
    }

    #[test]
    fn replicas_patch_touches_only_replicas() {
        assert_eq!(replicas_patch(5), json!({"spec": {"replicas": 5}}));
    }

    #[test]
    fn image_patch_names_container() {
        let patch = image_patch("app", "web:v2");
        assert_eq!(
            patch["spec"]["template"]["spec"]["containers"][0],
            json!({"name": "app", "image": "web:v2"})
        );
    }
}
