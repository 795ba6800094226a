//! Watch sources
//!
//! A `WatchSource` produces a fresh list-then-watch stream each time it is
//! asked to. The informer never retries on its own: a stream error ends the
//! watch and a later `reconnect()` asks the source for a new stream.

use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::watcher;
use kube::{Api, Client};

/// Errors surfaced by a watch stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InformerError {
    #[error("watch failed: {0}")]
    Watch(String),
}

/// Item type yielded by a watch stream
pub type WatchStream =
    BoxStream<'static, Result<watcher::Event<DynamicObject>, InformerError>>;

/// Something that can open a list-and-watch stream for one resource kind
pub trait WatchSource: Send + Sync {
    /// Open a new stream, starting with an initial list
    fn watch(&self) -> WatchStream;

    /// Type information for the watched objects
    fn api_resource(&self) -> &ApiResource;
}

/// Watch source backed by the Kubernetes API
///
/// Uses Api::namespaced_with if a namespace is given, Api::all_with otherwise.
pub struct ApiWatchSource {
    api: Api<DynamicObject>,
    resource: ApiResource,
    config: watcher::Config,
}

impl ApiWatchSource {
    pub fn new(client: Client, resource: ApiResource, namespace: Option<&str>) -> Self {
        let api = match namespace {
            Some(ns) => Api::namespaced_with(client, ns, &resource),
            None => Api::all_with(client, &resource),
        };
        Self {
            api,
            resource,
            config: watcher::Config::default(),
        }
    }
}

impl WatchSource for ApiWatchSource {
    fn watch(&self) -> WatchStream {
        watcher(self.api.clone(), self.config.clone())
            .map_err(|e| InformerError::Watch(e.to_string()))
            .boxed()
    }

    fn api_resource(&self) -> &ApiResource {
        &self.resource
    }
}
