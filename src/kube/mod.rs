//! Kubernetes client module
//!
//! Loads kubeconfig files, turns their contexts into `KubeContext`
//! descriptors, and builds one client per context.
//!
//! Kubeconfig loading strategy when no explicit path is given:
//! 1. KUBECONFIG environment variable (merged if it lists several files)
//! 2. ~/.kube/config
//!
//! Proxy settings (`proxy-url`) and TLS options set on the cluster entry are
//! honoured by `Config::from_custom_kubeconfig`.

use crate::informer::{ApiWatchSource, WatchSource};
use crate::manager::{ContextClient, ContextConnector};
use crate::models::KubeContext;
use crate::permissions::{AccessReviewer, KubeAccessReviewer};
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::api::ApiResource;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Read a kubeconfig from `path`, or from the default locations
pub fn load_kubeconfig(path: Option<&Path>) -> Result<Kubeconfig> {
    match path {
        Some(path) => Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display())),
        None => Kubeconfig::read().context("Failed to read kubeconfig"),
    }
}

/// Context descriptors of a kubeconfig, sorted by name
///
/// Entries without a context body are skipped. Duplicate names keep the
/// first occurrence, as kubectl does.
pub fn contexts_from_kubeconfig(kubeconfig: &Kubeconfig) -> Vec<KubeContext> {
    let servers: HashMap<&str, &str> = kubeconfig
        .clusters
        .iter()
        .filter_map(|named| {
            let server = named.cluster.as_ref()?.server.as_deref()?;
            Some((named.name.as_str(), server))
        })
        .collect();
    let current = kubeconfig.current_context.as_deref();

    let mut contexts: Vec<KubeContext> = Vec::new();
    for named in &kubeconfig.contexts {
        let Some(ctx) = &named.context else {
            tracing::debug!("Skipping context {} without body", named.name);
            continue;
        };
        if contexts.iter().any(|c| c.name == named.name) {
            tracing::warn!("Ignoring duplicate context {}", named.name);
            continue;
        }
        contexts.push(KubeContext {
            name: named.name.clone(),
            cluster: ctx.cluster.clone(),
            user: ctx.user.clone().unwrap_or_default(),
            namespace: ctx.namespace.clone(),
            server: servers.get(ctx.cluster.as_str()).map(|s| s.to_string()),
            current: current == Some(named.name.as_str()),
        });
    }
    contexts.sort_by(|a, b| a.name.cmp(&b.name));
    contexts
}

/// Build a client for one named context of `kubeconfig`
pub async fn create_client_for_context(kubeconfig: &Kubeconfig, context: &str) -> Result<Client> {
    let options = KubeConfigOptions {
        context: Some(context.to_string()),
        ..Default::default()
    };
    let config = Config::from_custom_kubeconfig(kubeconfig.clone(), &options)
        .await
        .with_context(|| format!("Invalid configuration for context {}", context))?;
    tracing::debug!("Context {} targets {}", context, config.cluster_url);
    Client::try_from(config).with_context(|| format!("Failed to create client for context {}", context))
}

/// `ContextClient` backed by a live kube client
#[derive(Clone)]
pub struct KubeContextClient {
    client: Client,
}

impl KubeContextClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContextClient for KubeContextClient {
    fn watch_source(&self, api_resource: &ApiResource, namespace: Option<&str>) -> Arc<dyn WatchSource> {
        Arc::new(ApiWatchSource::new(
            self.client.clone(),
            api_resource.clone(),
            namespace,
        ))
    }

    fn access_reviewer(&self) -> Arc<dyn AccessReviewer> {
        Arc::new(KubeAccessReviewer::new(self.client.clone()))
    }

    async fn probe(&self) -> Result<()> {
        let version = self
            .client
            .apiserver_version()
            .await
            .context("API server did not answer")?;
        tracing::debug!("API server version {}", version.git_version);
        Ok(())
    }
}

/// Connects contexts of the most recently loaded kubeconfig
pub struct KubeconfigConnector {
    kubeconfig: RwLock<Kubeconfig>,
}

impl KubeconfigConnector {
    pub fn new(kubeconfig: Kubeconfig) -> Self {
        Self {
            kubeconfig: RwLock::new(kubeconfig),
        }
    }

    /// Use `kubeconfig` for every later connection
    pub fn replace(&self, kubeconfig: Kubeconfig) {
        *self.kubeconfig.write().unwrap_or_else(PoisonError::into_inner) = kubeconfig;
    }

    fn snapshot(&self) -> Kubeconfig {
        self.kubeconfig
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ContextConnector for KubeconfigConnector {
    async fn connect(&self, context: &KubeContext) -> Result<Arc<dyn ContextClient>> {
        let kubeconfig = self.snapshot();
        let client = create_client_for_context(&kubeconfig, &context.name).await?;
        Ok(Arc::new(KubeContextClient::new(client)))
    }
}
