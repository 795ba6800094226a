//! Per-context client seams used by the manager

use crate::informer::WatchSource;
use crate::models::KubeContext;
use crate::permissions::AccessReviewer;
use anyhow::Result;
use async_trait::async_trait;
use kube::api::ApiResource;
use std::sync::Arc;

/// Everything the manager needs from one context's API server
#[async_trait]
pub trait ContextClient: Send + Sync {
    /// Watch source for a kind, namespaced when `namespace` is set
    fn watch_source(&self, api_resource: &ApiResource, namespace: Option<&str>) -> Arc<dyn WatchSource>;

    fn access_reviewer(&self) -> Arc<dyn AccessReviewer>;

    /// Cheap request telling whether the API server answers
    async fn probe(&self) -> Result<()>;
}

/// Builds a client for a kubeconfig context
#[async_trait]
pub trait ContextConnector: Send + Sync {
    async fn connect(&self, context: &KubeContext) -> Result<Arc<dyn ContextClient>>;
}
