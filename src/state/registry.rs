//! Per-context state registry
//!
//! Single source of truth for what consumers see about each context.
//! All writes go through `safe_set_state`, which holds the write lock for
//! the whole mutation so no reader ever sees a half-applied update.

use crate::models::{CheckingState, ContextGeneralState, ContextResourcePermission};
use kube::api::DynamicObject;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mutable state recorded for one context
#[derive(Debug, Clone, Default)]
pub struct ContextState {
    pub error: Option<String>,
    pub reachable: bool,
    pub checking: Option<CheckingState>,
    /// Last known objects per resource kind
    pub resources: HashMap<String, Vec<Arc<DynamicObject>>>,
    /// Last known permission per resource kind
    pub permissions: HashMap<String, ContextResourcePermission>,
}

/// Thread-safe registry of context states
#[derive(Clone)]
pub struct ContextsStatesRegistry {
    resource_names: Arc<Vec<String>>,
    inner: Arc<RwLock<HashMap<String, ContextState>>>,
}

impl ContextsStatesRegistry {
    /// Create a registry reporting counts for `resource_names`
    pub fn new(resource_names: Vec<String>) -> Self {
        Self {
            resource_names: Arc::new(resource_names),
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ContextState>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ContextState>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `update` to the state of `context_name`, creating it if absent
    ///
    /// The mutator runs under the write lock; it must not block.
    pub fn safe_set_state<R>(&self, context_name: &str, update: impl FnOnce(&mut ContextState) -> R) -> R {
        let mut states = self.write();
        let state = states.entry(context_name.to_string()).or_default();
        update(state)
    }

    /// Forget everything about a context. Returns whether it was known.
    pub fn delete_context(&self, context_name: &str) -> bool {
        self.write().remove(context_name).is_some()
    }

    pub fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_reachable(&self, context_name: &str) -> bool {
        self.read()
            .get(context_name)
            .map(|state| state.reachable)
            .unwrap_or(false)
    }

    fn general_state(&self, state: &ContextState) -> ContextGeneralState {
        let mut counts: BTreeMap<String, usize> =
            self.resource_names.iter().map(|name| (name.clone(), 0)).collect();
        for (name, objects) in &state.resources {
            counts.insert(name.clone(), objects.len());
        }
        ContextGeneralState {
            reachable: state.reachable,
            checking: state.checking,
            error: state.error.clone(),
            resources: counts,
        }
    }

    /// General state of every known context
    pub fn get_contexts_general_state(&self) -> BTreeMap<String, ContextGeneralState> {
        self.read()
            .iter()
            .map(|(name, state)| (name.clone(), self.general_state(state)))
            .collect()
    }

    /// Checking status of the contexts currently being checked
    pub fn get_contexts_checking_state(&self) -> BTreeMap<String, CheckingState> {
        self.read()
            .iter()
            .filter_map(|(name, state)| state.checking.map(|checking| (name.clone(), checking)))
            .collect()
    }

    /// General state of one context, with zero counts if nothing was recorded
    pub fn get_current_context_general_state(&self, context_name: &str) -> ContextGeneralState {
        match self.read().get(context_name) {
            Some(state) => self.general_state(state),
            None => ContextGeneralState::unreachable(self.resource_names.iter().cloned()),
        }
    }

    /// Cached objects of one kind in one context; empty when unknown
    pub fn get_context_resources(&self, context_name: &str, resource_name: &str) -> Vec<Arc<DynamicObject>> {
        self.read()
            .get(context_name)
            .and_then(|state| state.resources.get(resource_name))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_context_resources_count(&self, context_name: &str, resource_name: &str) -> usize {
        self.read()
            .get(context_name)
            .and_then(|state| state.resources.get(resource_name))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Record the permission of one resource kind in one context
    pub fn set_permission(&self, context_name: &str, resource_name: &str, permission: ContextResourcePermission) {
        self.safe_set_state(context_name, |state| {
            state.permissions.insert(resource_name.to_string(), permission);
        });
    }

    /// Permissions of every known context, per resource kind
    pub fn get_contexts_permissions(&self) -> BTreeMap<String, BTreeMap<String, ContextResourcePermission>> {
        self.read()
            .iter()
            .map(|(name, state)| {
                let permissions = state
                    .permissions
                    .iter()
                    .map(|(resource, permission)| (resource.clone(), permission.clone()))
                    .collect();
                (name.clone(), permissions)
            })
            .collect()
    }

    pub fn get_context_permissions(&self, context_name: &str) -> BTreeMap<String, ContextResourcePermission> {
        self.read()
            .get(context_name)
            .map(|state| {
                state
                    .permissions
                    .iter()
                    .map(|(resource, permission)| (resource.clone(), permission.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for ContextsStatesRegistry {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
