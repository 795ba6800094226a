//! Test doubles shared by the integration tests
//!
//! Nothing here talks to a cluster: watch streams replay canned events and
//! access reviews answer from a fixed rule.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use k8s_openapi::api::authorization::v1::SubjectAccessReviewStatus;
use k8s_openapi::api::core::v1::Pod;
use kontext::informer::{InformerError, WatchSource, WatchStream};
use kontext::{AccessReviewer, ContextClient, ContextConnector, KubeContext, ResourceAttributes};
use kube::api::{ApiResource, DynamicObject};
use kube::runtime::watcher::Event;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub type Script = Vec<Result<Event<DynamicObject>, InformerError>>;

pub fn pods() -> ApiResource {
    ApiResource::erase::<Pod>(&())
}

pub fn pod(name: &str) -> DynamicObject {
    DynamicObject::new(name, &pods()).within("default")
}

/// Events of a successful initial list of `names`
pub fn initial_list(names: &[&str]) -> Script {
    let mut script = vec![Ok(Event::Init)];
    script.extend(names.iter().map(|name| Ok(Event::InitApply(pod(name)))));
    script.push(Ok(Event::InitDone));
    script
}

pub fn stream_error(message: &str) -> Result<Event<DynamicObject>, InformerError> {
    Err(InformerError::Watch(message.to_string()))
}

/// Watch source replaying one script per `watch()` call
///
/// After its script the stream stays open without yielding, like an idle
/// watch. Calls beyond the queued scripts get an idle stream right away.
pub struct ScriptedSource {
    resource: ApiResource,
    scripts: Mutex<VecDeque<Script>>,
    watches: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(resource: ApiResource, scripts: Vec<Script>) -> Self {
        Self {
            resource,
            scripts: Mutex::new(scripts.into()),
            watches: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Number of streams opened so far
    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }
}

impl WatchSource for ScriptedSource {
    fn watch(&self) -> WatchStream {
        self.watches.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        stream::iter(script).chain(stream::pending()).boxed()
    }

    fn api_resource(&self) -> &ApiResource {
        &self.resource
    }
}

/// Reviewer allowing everything except the listed (group, resource) pairs
#[derive(Default)]
pub struct RuleReviewer {
    denied: HashSet<(String, String)>,
    failing: Mutex<HashMap<(String, String), usize>>,
    reviews: AtomicUsize,
}

impl RuleReviewer {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn deny(mut self, group: &str, resource: &str) -> Self {
        self.denied.insert((group.to_string(), resource.to_string()));
        self
    }

    /// Fail the first `times` reviews of (group, resource) with a call error
    pub fn failing(self, group: &str, resource: &str, times: usize) -> Self {
        self.failing
            .lock()
            .unwrap()
            .insert((group.to_string(), resource.to_string()), times);
        self
    }

    pub fn review_count(&self) -> usize {
        self.reviews.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessReviewer for RuleReviewer {
    async fn review(&self, attrs: &ResourceAttributes) -> Result<Option<SubjectAccessReviewStatus>> {
        self.reviews.fetch_add(1, Ordering::SeqCst);
        let key = (attrs.group.clone(), attrs.resource.clone());
        if let Some(remaining) = self.failing.lock().unwrap().get_mut(&key) {
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("review of {} timed out", attrs.resource);
            }
        }
        let denied = self.denied.contains(&key);
        Ok(Some(SubjectAccessReviewStatus {
            allowed: !denied,
            reason: denied.then(|| format!("cannot {} {}", attrs.verb, attrs.resource)),
            ..Default::default()
        }))
    }
}

/// Client whose watches are scripted per resource plural
pub struct FakeClient {
    reviewer: Arc<RuleReviewer>,
    sources: Mutex<HashMap<String, Arc<ScriptedSource>>>,
    scripts: Mutex<HashMap<String, Vec<Script>>>,
    reachable: AtomicBool,
}

impl FakeClient {
    pub fn new(reviewer: RuleReviewer) -> Self {
        Self {
            reviewer: Arc::new(reviewer),
            sources: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Queue the scripts the watch of `plural` will replay
    pub fn with_scripts(self, plural: &str, scripts: Vec<Script>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(plural.to_string(), scripts);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn source(&self, plural: &str) -> Option<Arc<ScriptedSource>> {
        self.sources.lock().unwrap().get(plural).cloned()
    }

    pub fn watched(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ContextClient for FakeClient {
    fn watch_source(&self, api_resource: &ApiResource, _namespace: Option<&str>) -> Arc<dyn WatchSource> {
        let scripts = self
            .scripts
            .lock()
            .unwrap()
            .remove(&api_resource.plural)
            .unwrap_or_else(|| vec![initial_list(&[])]);
        let source = Arc::new(ScriptedSource::new(api_resource.clone(), scripts));
        self.sources
            .lock()
            .unwrap()
            .insert(api_resource.plural.clone(), source.clone());
        source
    }

    fn access_reviewer(&self) -> Arc<dyn AccessReviewer> {
        self.reviewer.clone()
    }

    async fn probe(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            anyhow::bail!("connection refused")
        }
    }
}

/// Connector handing out pre-built clients by context name
#[derive(Default)]
pub struct FakeConnector {
    clients: Mutex<HashMap<String, Arc<FakeClient>>>,
}

impl FakeConnector {
    pub fn with_client(self, context: &str, client: Arc<FakeClient>) -> Self {
        self.clients
            .lock()
            .unwrap()
            .insert(context.to_string(), client);
        self
    }
}

#[async_trait]
impl ContextConnector for FakeConnector {
    async fn connect(&self, context: &KubeContext) -> Result<Arc<dyn ContextClient>> {
        let client = self.clients.lock().unwrap().get(&context.name).cloned();
        match client {
            Some(client) => Ok(client),
            None => anyhow::bail!("no credentials for {}", context.name),
        }
    }
}

/// Next value from `rx`, failing the test after a second
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

/// Assert that nothing arrives on `rx` for a short while
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(value)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected event: {:?}", value);
    }
}
