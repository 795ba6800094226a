//! Routes manager events to state snapshots pushed to consumers

use super::registry::ContextsStatesRegistry;
use crate::manager::ContextsManagerEvent;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Channel carrying `contextName -> ContextGeneralState`
pub const GENERAL_STATE_CHANNEL: &str = "kubernetes-contexts-general-state-update";

/// Channel carrying `contextName -> resourceName -> ContextResourcePermission`
pub const PERMISSIONS_CHANNEL: &str = "kubernetes-contexts-permissions";

/// Transport towards consumers (IPC, websocket, in-process bus, ...)
#[cfg_attr(test, mockall::automock)]
pub trait StateSender: Send + Sync {
    fn send(&self, channel: &str, payload: serde_json::Value);
}

/// Pushes registry snapshots whenever the manager reports a change
pub struct ContextsStatesDispatcher {
    registry: ContextsStatesRegistry,
    events: broadcast::Sender<ContextsManagerEvent>,
    sender: Arc<dyn StateSender>,
    handle: Option<JoinHandle<()>>,
}

impl ContextsStatesDispatcher {
    pub fn new(
        registry: ContextsStatesRegistry,
        events: broadcast::Sender<ContextsManagerEvent>,
        sender: Arc<dyn StateSender>,
    ) -> Self {
        Self {
            registry,
            events,
            sender,
            handle: None,
        }
    }

    /// Subscribe to manager events
    ///
    /// Calling it again replaces the previous subscription rather than
    /// adding a second one.
    pub fn init(&mut self) {
        if let Some(previous) = self.handle.take() {
            previous.abort();
        }

        let mut rx = self.events.subscribe();
        let registry = self.registry.clone();
        let sender = self.sender.clone();

        self.handle = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => dispatch(&registry, sender.as_ref(), &event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Dispatcher lagged, {} event(s) skipped", skipped);
                        update_health_states(&registry, sender.as_ref());
                        update_permissions(&registry, sender.as_ref());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Route one event synchronously
    pub fn handle(&self, event: &ContextsManagerEvent) {
        dispatch(&self.registry, self.sender.as_ref(), event);
    }

    pub fn update_health_states(&self) {
        update_health_states(&self.registry, self.sender.as_ref());
    }

    pub fn update_permissions(&self) {
        update_permissions(&self.registry, self.sender.as_ref());
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ContextsStatesDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch(registry: &ContextsStatesRegistry, sender: &dyn StateSender, event: &ContextsManagerEvent) {
    match event {
        ContextsManagerEvent::HealthStateChanged { .. } => update_health_states(registry, sender),
        ContextsManagerEvent::PermissionResult(_) => update_permissions(registry, sender),
        ContextsManagerEvent::ContextDeleted { .. } => {
            update_health_states(registry, sender);
            update_permissions(registry, sender);
        }
    }
}

fn update_health_states(registry: &ContextsStatesRegistry, sender: &dyn StateSender) {
    send(sender, GENERAL_STATE_CHANNEL, &registry.get_contexts_general_state());
}

fn update_permissions(registry: &ContextsStatesRegistry, sender: &dyn StateSender) {
    send(sender, PERMISSIONS_CHANNEL, &registry.get_contexts_permissions());
}

fn send<T: Serialize>(sender: &dyn StateSender, channel: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => {
            tracing::debug!("Sending {}", channel);
            sender.send(channel, value);
        }
        Err(e) => tracing::error!("Failed to serialize {} payload: {}", channel, e),
    }
}
