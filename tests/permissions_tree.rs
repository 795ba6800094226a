//! Permission tree tests
//!
//! Build request trees from resource factories and evaluate them against a
//! rule-based reviewer.

mod common;

use common::RuleReviewer;
use kontext::{
    ContextPermissionResult, ContextPermissionsChecker, ContextPermissionsRequest, FactoryError,
    ResourceAttributes, ResourceFactory, ResourceFactoryHandler, default_resource_factories,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;

fn all_resources() -> BTreeSet<String> {
    default_resource_factories()
        .unwrap()
        .get_resources_names()
        .into_iter()
        .collect()
}

async fn evaluate(
    reviewer: Arc<RuleReviewer>,
    namespace: &str,
) -> (Vec<ContextPermissionResult>, HashMap<String, bool>) {
    let requests = default_resource_factories()
        .unwrap()
        .get_permissions_requests(namespace)
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut permitted = HashMap::new();
    for request in requests {
        let mut checker = ContextPermissionsChecker::new("ctx1", reviewer.clone(), request, tx.clone());
        checker.start().await;
        for (resource, permission) in checker.get_permissions() {
            permitted.insert(resource, permission.permitted);
        }
        checker.dispose();
    }
    drop(tx);

    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    (results, permitted)
}

#[test]
fn test_catalog_shares_broad_probe() {
    let handler = default_resource_factories().unwrap();
    let requests = handler.get_permissions_requests("team-a").unwrap();

    // One namespaced root, one cluster root
    assert_eq!(requests.len(), 2);
    let namespaced = &requests[0];
    assert_eq!(namespaced.attrs.resource, "*");
    assert_eq!(namespaced.attrs.namespace.as_deref(), Some("team-a"));
    assert!(namespaced.resources.contains(&"pods".to_string()));
    assert!(!namespaced.resources.contains(&"nodes".to_string()));
    assert_eq!(namespaced.on_deny_requests.len(), namespaced.resources.len());
    assert!(
        namespaced
            .on_deny_requests
            .iter()
            .all(|child| child.attrs.namespace.as_deref() == Some("team-a"))
    );

    let cluster = &requests[1];
    assert_eq!(cluster.resources, vec!["nodes"]);
    assert_eq!(cluster.attrs.namespace, None);
    assert_eq!(
        cluster.on_deny_requests[0].attrs,
        ResourceAttributes::new("watch", "", "nodes")
    );
}

#[test]
fn test_identical_first_probe_groups_together() {
    let shared = ResourceAttributes::new("list", "", "pods");
    let mut handler = ResourceFactoryHandler::new();
    handler
        .add(ResourceFactory::new("a", true).with_permissions(vec![
            shared.clone(),
            ResourceAttributes::new("watch", "", "a"),
        ]))
        .unwrap();
    handler
        .add(ResourceFactory::new("b", true).with_permissions(vec![
            shared.clone(),
            ResourceAttributes::new("watch", "", "b"),
        ]))
        .unwrap();
    handler
        .add(
            ResourceFactory::new("c", true)
                .with_permissions(vec![ResourceAttributes::new("watch", "", "c")]),
        )
        .unwrap();

    let requests = handler.get_permissions_requests("ns").unwrap();
    assert_eq!(requests.len(), 2);

    let grouped = &requests[0];
    assert_eq!(grouped.attrs, shared.with_namespace(Some("ns")));
    assert_eq!(grouped.resources, vec!["a", "b"]);
    let children: Vec<Vec<String>> = grouped
        .on_deny_requests
        .iter()
        .map(|child| child.resources.clone())
        .collect();
    assert_eq!(children, vec![vec!["a"], vec!["b"]]);

    assert_eq!(
        requests[1],
        ContextPermissionsRequest {
            attrs: ResourceAttributes::new("watch", "", "c").with_namespace(Some("ns")),
            resources: vec!["c".to_string()],
            on_deny_requests: vec![],
        }
    );
}

#[test]
fn test_duplicate_factory_rejected() {
    let mut handler = ResourceFactoryHandler::new();
    handler.add(ResourceFactory::new("pods", true)).unwrap();
    assert_eq!(
        handler.add(ResourceFactory::new("pods", false)),
        Err(FactoryError::DuplicateResource("pods".to_string()))
    );
}

#[test]
fn test_factory_without_probes_is_skipped() {
    let mut handler = ResourceFactoryHandler::new();
    handler.add(ResourceFactory::new("events", true)).unwrap();
    assert!(handler.get_permissions_requests("ns").unwrap().is_empty());
}

#[tokio::test]
async fn test_cluster_admin_settles_in_two_reviews() {
    let reviewer = Arc::new(RuleReviewer::allow_all());
    let (results, permitted) = evaluate(reviewer.clone(), "default").await;

    assert_eq!(reviewer.review_count(), 2);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.permitted && r.context == "ctx1"));
    assert_eq!(permitted.keys().cloned().collect::<BTreeSet<_>>(), all_resources());
}

#[tokio::test]
async fn test_restricted_user_falls_back_per_kind() {
    let reviewer = Arc::new(
        RuleReviewer::allow_all()
            .deny("*", "*")
            .deny("", "secrets")
            .deny("route.openshift.io", "routes"),
    );
    let (results, permitted) = evaluate(reviewer, "default").await;

    // The denied roots never report for themselves
    assert!(results.iter().all(|r| r.attrs.resource != "*"));

    // Every resource appears in exactly one result
    let mut seen = BTreeSet::new();
    for result in &results {
        for resource in &result.resources {
            assert!(seen.insert(resource.clone()), "{} reported twice", resource);
        }
    }
    assert_eq!(seen, all_resources());

    assert_eq!(permitted["pods"], true);
    assert_eq!(permitted["nodes"], true);
    assert_eq!(permitted["secrets"], false);
    assert_eq!(permitted["routes"], false);

    let secrets = results
        .iter()
        .find(|r| r.resources == vec!["secrets"])
        .unwrap();
    assert_eq!(secrets.reason.as_deref(), Some("cannot watch secrets"));
}

#[tokio::test]
async fn test_member_without_fallback_reported_once_when_group_denied() {
    let broad = ResourceAttributes::new("watch", "*", "*");
    let mut handler = ResourceFactoryHandler::new();
    handler
        .add(ResourceFactory::new("a", true).with_permissions(vec![broad.clone()]))
        .unwrap();
    handler
        .add(ResourceFactory::new("b", true).with_permissions(vec![
            broad,
            ResourceAttributes::new("watch", "", "b"),
        ]))
        .unwrap();

    let mut requests = handler.get_permissions_requests("ns").unwrap();
    assert_eq!(requests.len(), 1);
    let root = requests.remove(0);
    assert_eq!(root.resources, vec!["a", "b"]);
    assert_eq!(root.on_deny_requests.len(), 1);

    let reviewer = Arc::new(RuleReviewer::allow_all().deny("*", "*"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut checker = ContextPermissionsChecker::new("ctx1", reviewer, root, tx);
    checker.start().await;
    checker.dispose();

    let mut reported = Vec::new();
    while let Some(result) = rx.recv().await {
        reported.extend(result.resources.iter().map(|r| (r.clone(), result.permitted)));
    }
    reported.sort();
    assert_eq!(
        reported,
        vec![("a".to_string(), false), ("b".to_string(), true)]
    );

    let permissions = checker.get_permissions();
    assert!(!permissions["a"].permitted);
    assert_eq!(permissions["a"].reason.as_deref(), Some("cannot watch *"));
    assert!(permissions["b"].permitted);
}
