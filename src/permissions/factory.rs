//! Resource factory catalog
//!
//! Registers the resource kinds tracked per context and turns their
//! permission probes into a minimal tree of access-review requests.

use super::{FactoryError, FactoryResult};
use crate::models::{ContextPermissionsRequest, ResourceAttributes};
use kube::api::ApiResource;

/// Description of one tracked resource kind
#[derive(Debug, Clone)]
pub struct ResourceFactory {
    /// Plural resource name, unique in a catalog (e.g. "pods")
    pub resource: String,
    pub is_namespaced: bool,
    /// Access checks to try, broadest first. Namespaces are filled in per request.
    pub permissions_requests: Vec<ResourceAttributes>,
    /// Type information used to watch this kind; `None` for permission-only kinds
    pub api_resource: Option<ApiResource>,
}

impl ResourceFactory {
    pub fn new(resource: impl Into<String>, is_namespaced: bool) -> Self {
        Self {
            resource: resource.into(),
            is_namespaced,
            permissions_requests: Vec::new(),
            api_resource: None,
        }
    }

    pub fn with_permissions(mut self, requests: Vec<ResourceAttributes>) -> Self {
        self.permissions_requests = requests;
        self
    }

    pub fn with_api_resource(mut self, api_resource: ApiResource) -> Self {
        self.api_resource = Some(api_resource);
        self
    }
}

/// A factory's name paired with its not-yet-grouped permission probes
#[derive(Debug, Clone, Copy)]
pub(crate) struct PendingProbes<'a> {
    resource: &'a str,
    attrs: &'a [ResourceAttributes],
}

/// Catalog of resource factories
#[derive(Debug, Default)]
pub struct ResourceFactoryHandler {
    factories: Vec<ResourceFactory>,
}

impl ResourceFactoryHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. Resource names must be unique.
    pub fn add(&mut self, factory: ResourceFactory) -> FactoryResult<()> {
        if self.get_resource_factory_by_resource_name(&factory.resource).is_some() {
            return Err(FactoryError::DuplicateResource(factory.resource));
        }
        self.factories.push(factory);
        Ok(())
    }

    pub fn get_resource_factory_by_resource_name(&self, name: &str) -> Option<&ResourceFactory> {
        self.factories.iter().find(|f| f.resource == name)
    }

    pub fn get_resource_factories(&self) -> &[ResourceFactory] {
        &self.factories
    }

    /// Names of all registered resource kinds, in registration order
    pub fn get_resources_names(&self) -> Vec<String> {
        self.factories.iter().map(|f| f.resource.clone()).collect()
    }

    /// Permission requests for every registered kind
    ///
    /// Namespaced kinds are checked in `namespace`, the others cluster-wide.
    /// The namespaced forest comes first.
    pub fn get_permissions_requests(
        &self,
        namespace: &str,
    ) -> FactoryResult<Vec<ContextPermissionsRequest>> {
        let mut requests = Self::requests_by_scope(&self.factories, true, Some(namespace))?;
        requests.extend(Self::requests_by_scope(&self.factories, false, None)?);
        Ok(requests)
    }

    fn requests_by_scope(
        factories: &[ResourceFactory],
        is_namespaced: bool,
        namespace: Option<&str>,
    ) -> FactoryResult<Vec<ContextPermissionsRequest>> {
        let pending: Vec<PendingProbes<'_>> = factories
            .iter()
            .filter(|f| f.is_namespaced == is_namespaced)
            .map(|f| PendingProbes {
                resource: &f.resource,
                attrs: &f.permissions_requests,
            })
            .collect();
        group_permissions_requests(&pending, is_namespaced, namespace)
    }
}

/// Group factories sharing the same next probe into one request
///
/// Members of a group continue with the rest of their probes as the
/// group's `on_deny_requests`; groups that differ become siblings.
pub(crate) fn group_permissions_requests(
    pending: &[PendingProbes<'_>],
    is_namespaced: bool,
    namespace: Option<&str>,
) -> FactoryResult<Vec<ContextPermissionsRequest>> {
    match (is_namespaced, namespace) {
        (true, None) => return Err(FactoryError::NamespaceRequired),
        (false, Some(ns)) => return Err(FactoryError::NamespaceForbidden(ns.to_string())),
        _ => {}
    }

    let mut remaining: Vec<PendingProbes<'_>> =
        pending.iter().copied().filter(|p| !p.attrs.is_empty()).collect();
    let mut requests = Vec::new();

    while let Some(first) = remaining.first() {
        let head = first.attrs[0].clone();
        let (same, others): (Vec<_>, Vec<_>) =
            remaining.into_iter().partition(|p| p.attrs[0] == head);

        let tails: Vec<PendingProbes<'_>> = same
            .iter()
            .map(|p| PendingProbes {
                resource: p.resource,
                attrs: &p.attrs[1..],
            })
            .collect();

        requests.push(ContextPermissionsRequest {
            attrs: head.with_namespace(namespace),
            resources: same.iter().map(|p| p.resource.to_string()).collect(),
            on_deny_requests: group_permissions_requests(&tails, is_namespaced, namespace)?,
        });
        remaining = others;
    }

    Ok(requests)
}
