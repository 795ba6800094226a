//! Contexts manager
//!
//! Owns, for every configured context, one informer per permitted resource
//! kind and one permission checker run. Informer and checker output is
//! folded into the `ContextsStatesRegistry`, then announced on a broadcast
//! channel the dispatcher listens to.
//!
//! Reconnection policy lives here: `check_contexts()` probes every context
//! that is unreachable or has offline informers, and reconnects them once
//! the API server answers again. `run()` calls it on a fixed interval.

pub mod client;

pub use client::{ContextClient, ContextConnector};

use crate::informer::{InformerEvent, ObjectCache, ResourceInformer};
use crate::models::{CheckingState, ContextPermissionResult, ContextPermissionsRequest, KubeContext};
use crate::permissions::{AccessReviewer, ContextPermissionsChecker, ResourceFactoryHandler};
use crate::state::ContextsStatesRegistry;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Change notifications emitted after the registry has been updated
#[derive(Debug, Clone, PartialEq)]
pub enum ContextsManagerEvent {
    /// Reachability, checking status, error or resource counts changed
    HealthStateChanged { context: String },
    /// A permission check settled some resources
    PermissionResult(ContextPermissionResult),
    /// The context left the kubeconfig
    ContextDeleted { context: String },
}

/// Everything held for one tracked context
struct ContextHandle {
    context: KubeContext,
    namespace: String,
    client: Option<Arc<dyn ContextClient>>,
    informers: HashMap<String, ResourceInformer>,
    permissions_task: Option<JoinHandle<Vec<ContextPermissionsChecker>>>,
    checkers: Option<Vec<ContextPermissionsChecker>>,
}

impl ContextHandle {
    fn has_offline_informers(&self) -> bool {
        self.informers.values().any(ResourceInformer::is_offline)
    }

    /// Collect a finished permission run
    ///
    /// Returns true when the run hit a failed review call. The run is then
    /// discarded so the next check of this context starts it again.
    async fn collect_permissions(&mut self) -> bool {
        if !self
            .permissions_task
            .as_ref()
            .is_some_and(JoinHandle::is_finished)
        {
            return false;
        }
        let Some(task) = self.permissions_task.take() else {
            return false;
        };
        match task.await {
            Ok(checkers) if !checkers.iter().any(ContextPermissionsChecker::has_review_errors) => {
                self.checkers = Some(checkers);
                false
            }
            Ok(mut checkers) => {
                tracing::info!(
                    "Permission checks of context {} hit review errors, retrying",
                    self.context.name
                );
                checkers.iter_mut().for_each(ContextPermissionsChecker::dispose);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "Permission checks of context {} did not complete: {}",
                    self.context.name,
                    e
                );
                true
            }
        }
    }

    fn dispose(&mut self) {
        for informer in self.informers.values_mut() {
            informer.dispose();
        }
        self.informers.clear();
        if let Some(task) = self.permissions_task.take() {
            task.abort();
        }
        if let Some(mut checkers) = self.checkers.take() {
            checkers.iter_mut().for_each(ContextPermissionsChecker::dispose);
        }
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Coordinates informers and permission checks across all contexts
pub struct ContextsManager {
    factories: Arc<ResourceFactoryHandler>,
    registry: ContextsStatesRegistry,
    connector: Arc<dyn ContextConnector>,
    namespace: Option<String>,
    contexts: HashMap<String, ContextHandle>,
    informer_tx: mpsc::UnboundedSender<InformerEvent>,
    informer_rx: mpsc::UnboundedReceiver<InformerEvent>,
    permission_tx: mpsc::UnboundedSender<ContextPermissionResult>,
    permission_rx: mpsc::UnboundedReceiver<ContextPermissionResult>,
    events: broadcast::Sender<ContextsManagerEvent>,
}

impl ContextsManager {
    pub fn new(
        factories: Arc<ResourceFactoryHandler>,
        registry: ContextsStatesRegistry,
        connector: Arc<dyn ContextConnector>,
        event_buffer: usize,
    ) -> Self {
        let (informer_tx, informer_rx) = mpsc::unbounded_channel();
        let (permission_tx, permission_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            factories,
            registry,
            connector,
            namespace: None,
            contexts: HashMap::new(),
            informer_tx,
            informer_rx,
            permission_tx,
            permission_rx,
            events,
        }
    }

    /// Use `namespace` for every context instead of each context's own
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn registry(&self) -> &ContextsStatesRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextsManagerEvent> {
        self.events.subscribe()
    }

    /// Sender half of the event channel, for components that subscribe later
    pub fn event_sender(&self) -> broadcast::Sender<ContextsManagerEvent> {
        self.events.clone()
    }

    pub fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.keys().cloned().collect();
        names.sort();
        names
    }

    /// Cache of a running informer, if that kind is watched in that context
    pub fn get_informer_cache(&self, context: &str, resource: &str) -> Option<ObjectCache> {
        self.contexts
            .get(context)?
            .informers
            .get(resource)
            .map(ResourceInformer::cache)
    }

    pub fn is_informer_offline(&self, context: &str, resource: &str) -> Option<bool> {
        self.contexts
            .get(context)?
            .informers
            .get(resource)
            .map(ResourceInformer::is_offline)
    }

    fn emit(&self, event: ContextsManagerEvent) {
        // No subscriber yet is not an error
        let _ = self.events.send(event);
    }

    /// Reconcile tracked contexts with a freshly loaded kubeconfig
    ///
    /// Contexts whose descriptor changed are dropped and tracked again.
    pub async fn update(&mut self, contexts: Vec<KubeContext>) -> Result<()> {
        let incoming: HashMap<String, KubeContext> = contexts
            .into_iter()
            .map(|context| (context.name.clone(), context))
            .collect();

        let stale: Vec<String> = self
            .contexts
            .iter()
            .filter(|(name, handle)| incoming.get(*name) != Some(&handle.context))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            self.remove_context(&name);
        }

        let mut added: Vec<KubeContext> = incoming
            .into_values()
            .filter(|context| !self.contexts.contains_key(&context.name))
            .collect();
        added.sort_by(|a, b| a.name.cmp(&b.name));
        for context in added {
            self.add_context(context).await?;
        }
        Ok(())
    }

    async fn add_context(&mut self, context: KubeContext) -> Result<()> {
        let name = context.name.clone();
        let namespace = context.effective_namespace(self.namespace.as_deref());
        tracing::info!("Tracking context {} (namespace {})", name, namespace);

        self.contexts.insert(
            name.clone(),
            ContextHandle {
                context,
                namespace,
                client: None,
                informers: HashMap::new(),
                permissions_task: None,
                checkers: None,
            },
        );
        self.check_context(&name).await
    }

    /// Stop tracking a context and forget its state
    pub fn remove_context(&mut self, name: &str) {
        if let Some(mut handle) = self.contexts.remove(name) {
            tracing::info!("Removing context {}", name);
            handle.dispose();
        }
        self.registry.delete_context(name);
        self.emit(ContextsManagerEvent::ContextDeleted {
            context: name.to_string(),
        });
    }

    fn set_unreachable(&self, name: &str, error: String) {
        tracing::warn!("Context {} is unreachable: {}", name, error);
        self.registry.safe_set_state(name, |state| {
            state.reachable = false;
            state.error = Some(error);
            state.checking = None;
        });
        self.emit(ContextsManagerEvent::HealthStateChanged {
            context: name.to_string(),
        });
    }

    /// Connect (if needed) and probe one context
    ///
    /// When reachable: reconnects offline informers and starts the
    /// permission checks that have not run yet.
    async fn check_context(&mut self, name: &str) -> Result<()> {
        let Some(handle) = self.contexts.get(name) else {
            return Ok(());
        };
        let context = handle.context.clone();
        let existing_client = handle.client.clone();

        self.registry
            .safe_set_state(name, |state| state.checking = Some(CheckingState::checking()));
        self.emit(ContextsManagerEvent::HealthStateChanged {
            context: name.to_string(),
        });

        let client = match existing_client {
            Some(client) => client,
            None => match self.connector.connect(&context).await {
                Ok(client) => client,
                Err(e) => {
                    self.set_unreachable(name, format!("{:#}", e));
                    return Ok(());
                }
            },
        };

        let probe = client.probe().await;

        let Some(handle) = self.contexts.get_mut(name) else {
            return Ok(());
        };
        handle.client = Some(client.clone());

        if let Err(e) = probe {
            self.set_unreachable(name, format!("{:#}", e));
            return Ok(());
        }

        for informer in handle.informers.values_mut() {
            informer.reconnect();
        }
        if handle.permissions_task.is_none() && handle.checkers.is_none() {
            let requests = self.factories.get_permissions_requests(&handle.namespace)?;
            handle.permissions_task = Some(spawn_permission_checks(
                name.to_string(),
                client.access_reviewer(),
                requests,
                self.permission_tx.clone(),
            ));
        }

        self.registry.safe_set_state(name, |state| {
            state.reachable = true;
            state.error = None;
            state.checking = None;
        });
        self.emit(ContextsManagerEvent::HealthStateChanged {
            context: name.to_string(),
        });
        Ok(())
    }

    /// Probe every context that is unreachable, has offline informers or
    /// needs its permission checks run again
    pub async fn check_contexts(&mut self) {
        let mut retry_permissions = Vec::new();
        for (name, handle) in self.contexts.iter_mut() {
            if handle.collect_permissions().await {
                retry_permissions.push(name.clone());
            }
        }

        let pending: Vec<String> = self
            .contexts
            .iter()
            .filter(|(name, handle)| {
                handle.client.is_none()
                    || handle.has_offline_informers()
                    || !self.registry.is_reachable(name)
                    || retry_permissions.contains(*name)
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in &pending {
            self.registry
                .safe_set_state(name, |state| state.checking = Some(CheckingState::waiting()));
        }
        for name in pending {
            if let Err(e) = self.check_context(&name).await {
                tracing::error!("Failed to check context {}: {:#}", name, e);
            }
        }
    }

    /// Fold one informer event into the registry
    ///
    /// Offline transitions are only applied when they match the current
    /// informer's flag. Events queued by an informer that has since been
    /// disposed or reconnected are dropped.
    pub fn handle_informer_event(&mut self, event: InformerEvent) {
        let Some(handle) = self.contexts.get(event.context()) else {
            tracing::debug!("Dropping informer event for untracked context {}", event.context());
            return;
        };
        if let InformerEvent::Offline { offline, .. } = &event {
            let current = handle
                .informers
                .get(event.resource())
                .map(ResourceInformer::is_offline);
            if current != Some(*offline) {
                tracing::debug!(
                    "Dropping stale offline={} event for {}/{}",
                    offline,
                    event.context(),
                    event.resource()
                );
                return;
            }
        }

        match &event {
            InformerEvent::CacheUpdated { context, resource } => {
                let Some(informer) = handle.informers.get(resource) else {
                    return;
                };
                let objects = informer.cache().list();
                let online = !handle.has_offline_informers();
                self.registry.safe_set_state(context, |state| {
                    state.resources.insert(resource.clone(), objects);
                    if online {
                        state.reachable = true;
                        state.error = None;
                    }
                });
            }
            InformerEvent::Offline {
                context,
                offline: true,
                reason,
                ..
            } => {
                self.registry.safe_set_state(context, |state| {
                    state.reachable = false;
                    state.error = reason.clone();
                });
            }
            InformerEvent::Offline {
                context,
                offline: false,
                ..
            } => {
                if !handle.has_offline_informers() {
                    self.registry.safe_set_state(context, |state| {
                        state.reachable = true;
                        state.error = None;
                    });
                }
            }
        }

        self.emit(ContextsManagerEvent::HealthStateChanged {
            context: event.context().to_string(),
        });
    }

    /// Record a permission result and start informers for permitted kinds
    pub fn handle_permission_result(&mut self, result: ContextPermissionResult) {
        let Some(handle) = self.contexts.get_mut(&result.context) else {
            tracing::debug!("Dropping permission result for untracked context {}", result.context);
            return;
        };

        let permission = result.permission();
        for resource in &result.resources {
            self.registry
                .set_permission(&result.context, resource, permission.clone());
        }

        if let (true, Some(client)) = (result.permitted, handle.client.clone()) {
            for resource in &result.resources {
                if handle.informers.contains_key(resource) {
                    continue;
                }
                let Some(factory) = self.factories.get_resource_factory_by_resource_name(resource)
                else {
                    continue;
                };
                let Some(api_resource) = &factory.api_resource else {
                    continue;
                };

                let namespace = factory.is_namespaced.then_some(handle.namespace.as_str());
                let source = client.watch_source(api_resource, namespace);
                let mut informer = ResourceInformer::new(
                    result.context.clone(),
                    resource.clone(),
                    source,
                    self.informer_tx.clone(),
                );
                informer.start();
                handle.informers.insert(resource.clone(), informer);
            }
        }

        self.emit(ContextsManagerEvent::PermissionResult(result));
    }

    /// Wait for the next informer or permission event and apply it
    pub async fn process_next(&mut self) {
        tokio::select! {
            Some(event) = self.informer_rx.recv() => self.handle_informer_event(event),
            Some(result) = self.permission_rx.recv() => self.handle_permission_result(result),
        }
    }

    /// Apply every pending event without blocking
    ///
    /// Returns the number of events processed.
    pub fn drain_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok(result) = self.permission_rx.try_recv() {
            self.handle_permission_result(result);
            count += 1;
        }
        while let Ok(event) = self.informer_rx.try_recv() {
            self.handle_informer_event(event);
            count += 1;
        }
        count
    }

    /// Main loop: apply events, follow kubeconfig updates, re-check on a timer
    ///
    /// Returns when the kubeconfig update channel closes.
    pub async fn run(
        mut self,
        mut kubeconfig_updates: mpsc::Receiver<Vec<KubeContext>>,
        reconnect_interval: Duration,
    ) -> Result<()> {
        let mut ticker = tokio::time::interval(reconnect_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                Some(event) = self.informer_rx.recv() => self.handle_informer_event(event),
                Some(result) = self.permission_rx.recv() => self.handle_permission_result(result),
                update = kubeconfig_updates.recv() => match update {
                    Some(contexts) => self.update(contexts).await?,
                    None => break,
                },
                _ = ticker.tick() => self.check_contexts().await,
            }
        }

        self.dispose();
        Ok(())
    }

    /// Stop every informer and permission check
    pub fn dispose(&mut self) {
        for handle in self.contexts.values_mut() {
            handle.dispose();
        }
        self.contexts.clear();
    }
}

fn spawn_permission_checks(
    context: String,
    reviewer: Arc<dyn AccessReviewer>,
    requests: Vec<ContextPermissionsRequest>,
    results: mpsc::UnboundedSender<ContextPermissionResult>,
) -> JoinHandle<Vec<ContextPermissionsChecker>> {
    tokio::spawn(async move {
        let mut checkers = Vec::with_capacity(requests.len());
        for request in requests {
            let mut checker =
                ContextPermissionsChecker::new(context.clone(), reviewer.clone(), request, results.clone());
            checker.start().await;
            checkers.push(checker);
        }
        checkers
    })
}
