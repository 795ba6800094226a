//! Informer module
//!
//! Keeps a live cache of one resource kind within one context.
//!
//! Each `ResourceInformer` runs a list-then-watch stream in a background task
//! and reports through an unbounded channel:
//! - `CacheUpdated` whenever the cached set changes (add, update and delete
//!   all collapse into this one notification)
//! - `Offline` when the stream fails, and again (with `offline: false`) when
//!   the owner reconnects it
//!
//! Reconnection is driven by the owner; the informer never retries by itself.

mod cache;
mod source;

pub use cache::ObjectCache;
pub use source::{ApiWatchSource, InformerError, WatchSource, WatchStream};

use futures::StreamExt;
use kube::api::DynamicObject;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

/// Event emitted by resource informers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InformerEvent {
    /// The cached objects of (context, resource) changed
    CacheUpdated { context: String, resource: String },
    /// The watch went offline (`offline: true`) or was reconnected (`offline: false`)
    Offline {
        context: String,
        resource: String,
        offline: bool,
        reason: Option<String>,
    },
}

impl InformerEvent {
    pub fn context(&self) -> &str {
        match self {
            InformerEvent::CacheUpdated { context, .. } | InformerEvent::Offline { context, .. } => {
                context
            }
        }
    }

    pub fn resource(&self) -> &str {
        match self {
            InformerEvent::CacheUpdated { resource, .. }
            | InformerEvent::Offline { resource, .. } => resource,
        }
    }
}

/// Live watch of one resource kind in one context
pub struct ResourceInformer {
    context: String,
    resource: String,
    source: Arc<dyn WatchSource>,
    writer: Arc<Mutex<Writer<DynamicObject>>>,
    cache: ObjectCache,
    offline: Arc<AtomicBool>,
    events: Option<mpsc::UnboundedSender<InformerEvent>>,
    handle: Option<JoinHandle<()>>,
    started: bool,
}

impl ResourceInformer {
    pub fn new(
        context: impl Into<String>,
        resource: impl Into<String>,
        source: Arc<dyn WatchSource>,
        events: mpsc::UnboundedSender<InformerEvent>,
    ) -> Self {
        let writer = Writer::new(source.api_resource().clone());
        let cache = ObjectCache::new(writer.as_reader());
        Self {
            context: context.into(),
            resource: resource.into(),
            source,
            writer: Arc::new(Mutex::new(writer)),
            cache,
            offline: Arc::new(AtomicBool::new(false)),
            events: Some(events),
            handle: None,
            started: false,
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Start the watch and return the cache it fills
    ///
    /// Never fails: a stream that cannot start shows up as an `Offline`
    /// event and the informer can be reconnected later.
    pub fn start(&mut self) -> ObjectCache {
        if self.events.is_none() {
            tracing::warn!(
                "Ignoring start of disposed informer {}/{}",
                self.context,
                self.resource
            );
            return self.cache.clone();
        }
        self.started = true;
        self.offline.store(false, Ordering::SeqCst);
        self.spawn_watch();
        self.cache.clone()
    }

    /// Handle on the cache, valid whether or not the informer is online
    pub fn cache(&self) -> ObjectCache {
        self.cache.clone()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Restart an offline watch
    ///
    /// Emits `Offline { offline: false }` first. Does nothing when the
    /// informer is online, was never started, or has been disposed.
    pub fn reconnect(&mut self) {
        if !self.started || self.events.is_none() {
            return;
        }
        if self
            .offline
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        tracing::debug!("Reconnecting informer {}/{}", self.context, self.resource);
        self.emit(InformerEvent::Offline {
            context: self.context.clone(),
            resource: self.resource.clone(),
            offline: false,
            reason: None,
        });
        self.spawn_watch();
    }

    /// Stop the watch and release the event sender. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                tracing::debug!(
                    "Informer {}/{} had already stopped",
                    self.context,
                    self.resource
                );
            }
            handle.abort();
        }
        if self.events.take().is_some() {
            tracing::debug!("Disposed informer {}/{}", self.context, self.resource);
        }
    }

    fn emit(&self, event: InformerEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn spawn_watch(&mut self) {
        let Some(event_tx) = self.events.clone() else {
            return;
        };
        if let Some(previous) = self.handle.take() {
            previous.abort();
        }

        let context = self.context.clone();
        let resource = self.resource.clone();
        let source = self.source.clone();
        let writer = self.writer.clone();
        let offline = self.offline.clone();

        tracing::debug!("Starting informer {}/{}", context, resource);

        let handle = tokio::spawn(async move {
            let mut stream = source.watch();

            while let Some(event) = stream.next().await {
                match event {
                    Ok(event) => {
                        // The store only swaps in a relist at InitDone
                        let changed = matches!(
                            event,
                            watcher::Event::Apply(_)
                                | watcher::Event::Delete(_)
                                | watcher::Event::InitDone
                        );
                        writer.lock().await.apply_watcher_event(&event);
                        if changed {
                            let _ = event_tx.send(InformerEvent::CacheUpdated {
                                context: context.clone(),
                                resource: resource.clone(),
                            });
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Informer {}/{} went offline: {}", context, resource, e);
                        offline.store(true, Ordering::SeqCst);
                        let _ = event_tx.send(InformerEvent::Offline {
                            context: context.clone(),
                            resource: resource.clone(),
                            offline: true,
                            reason: Some(e.to_string()),
                        });
                        break;
                    }
                }
            }
        });

        self.handle = Some(handle);
    }
}

impl Drop for ResourceInformer {
    fn drop(&mut self) {
        self.dispose();
    }
}
