//! Read handle on an informer's object cache

use kube::api::DynamicObject;
use kube::runtime::reflector::Store;
use kube::ResourceExt;
use std::sync::Arc;

/// Cloneable, read-only view of the objects an informer has seen
///
/// The handle stays readable after its informer goes offline; it then
/// returns the last known objects.
#[derive(Clone)]
pub struct ObjectCache {
    store: Store<DynamicObject>,
}

impl ObjectCache {
    pub(crate) fn new(store: Store<DynamicObject>) -> Self {
        Self { store }
    }

    /// Cached objects, sorted by namespace then name
    pub fn list(&self) -> Vec<Arc<DynamicObject>> {
        let mut objects = self.store.state();
        objects.sort_by(|a, b| {
            a.namespace()
                .cmp(&b.namespace())
                .then_with(|| a.name_any().cmp(&b.name_any()))
        });
        objects
    }

    pub fn len(&self) -> usize {
        self.store.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectCache {{ len: {} }}", self.len())
    }
}
