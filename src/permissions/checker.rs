//! Permission request tree evaluation

use super::reviewer::AccessReviewer;
use crate::models::{ContextPermissionResult, ContextPermissionsRequest, ContextResourcePermission};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Evaluates one request node against one context
///
/// A denied node with `on_deny_requests` spawns one sub-checker per fallback
/// request and their results travel on the same channel. The node itself
/// only reports the resources none of its fallbacks cover. Any other
/// outcome emits exactly one result for the node.
pub struct ContextPermissionsChecker {
    context: String,
    reviewer: Arc<dyn AccessReviewer>,
    request: ContextPermissionsRequest,
    events: Option<mpsc::UnboundedSender<ContextPermissionResult>>,
    result: Option<ContextPermissionResult>,
    review_failed: bool,
    sub_checkers: Vec<ContextPermissionsChecker>,
}

impl ContextPermissionsChecker {
    pub fn new(
        context: impl Into<String>,
        reviewer: Arc<dyn AccessReviewer>,
        request: ContextPermissionsRequest,
        events: mpsc::UnboundedSender<ContextPermissionResult>,
    ) -> Self {
        Self {
            context: context.into(),
            reviewer,
            request,
            events: Some(events),
            result: None,
            review_failed: false,
            sub_checkers: Vec::new(),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Run the review for this node, then its fallbacks one after another
    ///
    /// Resolves once every spawned sub-checker has resolved.
    pub fn start(&mut self) -> BoxFuture<'_, ()> {
        async move {
            let (permitted, reason, failed) = match self.evaluate().await {
                Ok((permitted, reason)) => (permitted, reason, false),
                Err(e) => {
                    tracing::warn!(
                        "Access review failed for context {}: {:#}",
                        self.context,
                        e
                    );
                    (false, Some(e.to_string()), true)
                }
            };

            if permitted || self.request.on_deny_requests.is_empty() {
                let resources = self.request.resources.clone();
                self.settle(resources, permitted, reason, failed);
                return;
            }

            for request in self.request.on_deny_requests.clone() {
                let Some(events) = self.events.clone() else {
                    return;
                };
                let mut sub_checker = ContextPermissionsChecker::new(
                    self.context.clone(),
                    self.reviewer.clone(),
                    request,
                    events,
                );
                sub_checker.start().await;
                self.sub_checkers.push(sub_checker);
            }

            // Members whose probes ran out at this node get no fallback
            let covered: HashSet<&String> = self
                .request
                .on_deny_requests
                .iter()
                .flat_map(|child| child.resources.iter())
                .collect();
            let uncovered: Vec<String> = self
                .request
                .resources
                .iter()
                .filter(|resource| !covered.contains(resource))
                .cloned()
                .collect();
            if !uncovered.is_empty() {
                self.settle(uncovered, permitted, reason, failed);
            }
        }
        .boxed()
    }

    // Fails closed: a missing status or a refused request is "not permitted"
    async fn evaluate(&self) -> anyhow::Result<(bool, Option<String>)> {
        Ok(match self.reviewer.review(&self.request.attrs).await? {
            Some(status) => (
                status.allowed && !status.denied.unwrap_or(false),
                status.reason.or(status.evaluation_error),
            ),
            None => (false, None),
        })
    }

    fn settle(&mut self, resources: Vec<String>, permitted: bool, reason: Option<String>, failed: bool) {
        let result = ContextPermissionResult {
            context: self.context.clone(),
            resources,
            attrs: self.request.attrs.clone(),
            permitted,
            reason,
        };
        tracing::debug!(
            "Context {}: {:?} permitted={} for {:?}",
            self.context,
            result.attrs,
            permitted,
            result.resources
        );
        if let Some(tx) = &self.events {
            let _ = tx.send(result.clone());
        }
        self.review_failed = failed;
        self.result = Some(result);
    }

    /// Whether a result of this tree came from a failed review call
    ///
    /// Such results say nothing about RBAC and are worth asking again.
    pub fn has_review_errors(&self) -> bool {
        self.review_failed || self.sub_checkers.iter().any(Self::has_review_errors)
    }

    /// Results gathered by this node and every sub-checker, per resource name
    pub fn get_permissions(&self) -> HashMap<String, ContextResourcePermission> {
        let mut permissions = HashMap::new();
        if let Some(result) = &self.result {
            for resource in &result.resources {
                permissions.insert(resource.clone(), result.permission());
            }
        }
        for sub_checker in &self.sub_checkers {
            permissions.extend(sub_checker.get_permissions());
        }
        permissions
    }

    /// Release the result sender here and in every sub-checker. Idempotent.
    pub fn dispose(&mut self) {
        self.events.take();
        for sub_checker in &mut self.sub_checkers {
            sub_checker.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceAttributes;
    use crate::permissions::reviewer::MockAccessReviewer;
    use k8s_openapi::api::authorization::v1::SubjectAccessReviewStatus;

    fn status(allowed: bool, denied: Option<bool>) -> SubjectAccessReviewStatus {
        SubjectAccessReviewStatus {
            allowed,
            denied,
            ..Default::default()
        }
    }

    fn request_tree() -> ContextPermissionsRequest {
        ContextPermissionsRequest {
            attrs: ResourceAttributes::new("watch", "*", "*").with_namespace(Some("ns")),
            resources: vec!["pods".to_string(), "deployments".to_string()],
            on_deny_requests: vec![
                ContextPermissionsRequest {
                    attrs: ResourceAttributes::new("watch", "", "pods").with_namespace(Some("ns")),
                    resources: vec!["pods".to_string()],
                    on_deny_requests: vec![],
                },
                ContextPermissionsRequest {
                    attrs: ResourceAttributes::new("watch", "apps", "deployments")
                        .with_namespace(Some("ns")),
                    resources: vec!["deployments".to_string()],
                    on_deny_requests: vec![],
                },
            ],
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ContextPermissionResult>) -> Vec<ContextPermissionResult> {
        let mut results = Vec::new();
        while let Ok(result) = rx.try_recv() {
            results.push(result);
        }
        results
    }

    #[tokio::test]
    async fn test_missing_status_fails_closed() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer.expect_review().times(1).returning(|_| Ok(None));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut request = request_tree();
        request.on_deny_requests.clear();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request, tx);
        checker.start().await;

        let results = drain(&mut rx);
        assert_eq!(results.len(), 1);
        assert!(!results[0].permitted);
        assert!(!checker.get_permissions()["pods"].permitted);
        assert!(!checker.get_permissions()["deployments"].permitted);
    }

    #[tokio::test]
    async fn test_allowed_root_emits_single_result() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .times(1)
            .returning(|_| Ok(Some(status(true, None))));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request_tree(), tx);
        checker.start().await;

        let results = drain(&mut rx);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].resources, vec!["pods", "deployments"]);
        assert!(results[0].permitted);
        assert_eq!(results[0].context, "ctx1");
    }

    #[tokio::test]
    async fn test_denied_root_defers_to_children() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer.expect_review().times(3).returning(|attrs| {
            Ok(Some(match attrs.resource.as_str() {
                "*" => status(false, None),
                "pods" => status(true, None),
                _ => SubjectAccessReviewStatus {
                    allowed: false,
                    reason: Some("no RBAC policy matched".to_string()),
                    ..Default::default()
                },
            }))
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request_tree(), tx);
        checker.start().await;

        let results = drain(&mut rx);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.attrs.resource != "*"));

        let permissions = checker.get_permissions();
        assert_eq!(permissions.len(), 2);
        assert!(permissions["pods"].permitted);
        assert!(!permissions["deployments"].permitted);
        assert_eq!(
            permissions["deployments"].reason.as_deref(),
            Some("no RBAC policy matched")
        );
    }

    #[tokio::test]
    async fn test_denied_root_reports_members_without_fallback() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .times(2)
            .returning(|attrs| Ok(Some(status(attrs.resource != "*", None))));

        // "deployments" has no probe left after the shared one
        let mut request = request_tree();
        request.on_deny_requests.truncate(1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request, tx);
        checker.start().await;

        let results = drain(&mut rx);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].resources, vec!["pods"]);
        assert!(results[0].permitted);
        assert_eq!(results[1].resources, vec!["deployments"]);
        assert_eq!(results[1].attrs.resource, "*");
        assert!(!results[1].permitted);

        let permissions = checker.get_permissions();
        assert_eq!(permissions.len(), 2);
        assert!(permissions["pods"].permitted);
        assert!(!permissions["deployments"].permitted);
        assert!(!checker.has_review_errors());
    }

    #[tokio::test]
    async fn test_explicit_deny_overrides_allowed() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .returning(|_| Ok(Some(status(true, Some(true)))));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut request = request_tree();
        request.on_deny_requests.clear();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request, tx);
        checker.start().await;

        assert!(!drain(&mut rx)[0].permitted);
    }

    #[tokio::test]
    async fn test_review_error_is_not_permitted() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut request = request_tree();
        request.on_deny_requests.clear();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request, tx);
        checker.start().await;

        let results = drain(&mut rx);
        assert!(!results[0].permitted);
        assert!(results[0].reason.as_deref().unwrap().contains("connection refused"));
        assert!(checker.has_review_errors());
    }

    #[tokio::test]
    async fn test_failed_root_recovered_by_children_is_not_an_error() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer.expect_review().times(3).returning(|attrs| {
            if attrs.resource == "*" {
                Err(anyhow::anyhow!("timeout"))
            } else {
                Ok(Some(status(true, None)))
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request_tree(), tx);
        checker.start().await;

        assert!(drain(&mut rx).iter().all(|r| r.permitted));
        assert!(!checker.has_review_errors());
    }

    #[tokio::test]
    async fn test_dispose_twice_closes_channel() {
        let mut reviewer = MockAccessReviewer::new();
        reviewer
            .expect_review()
            .returning(|attrs| Ok(Some(status(attrs.resource != "*", None))));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut checker = ContextPermissionsChecker::new("ctx1", Arc::new(reviewer), request_tree(), tx);
        checker.start().await;
        assert_eq!(drain(&mut rx).len(), 2);

        checker.dispose();
        checker.dispose();
        assert!(rx.recv().await.is_none());
        // Results survive disposal
        assert_eq!(checker.get_permissions().len(), 2);
    }
}
