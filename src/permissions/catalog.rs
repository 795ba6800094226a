//! Built-in resource catalog
//!
//! To track a new kind, add a `ResourceFactory` below. Every kind first
//! shares the broad `watch */*` probe so a cluster-admin context is settled
//! with one review per scope; only on denial is the kind-specific probe sent.

use super::factory::{ResourceFactory, ResourceFactoryHandler};
use super::FactoryResult;
use crate::models::ResourceAttributes;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{ConfigMap, Node, PersistentVolumeClaim, Pod, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{ApiResource, GroupVersionKind};

fn watch_probes(group: &str, resource: &str) -> Vec<ResourceAttributes> {
    vec![
        ResourceAttributes::new("watch", "*", "*"),
        ResourceAttributes::new("watch", group, resource),
    ]
}

fn factory(resource: &str, group: &str, is_namespaced: bool, api_resource: ApiResource) -> ResourceFactory {
    ResourceFactory::new(resource, is_namespaced)
        .with_permissions(watch_probes(group, resource))
        .with_api_resource(api_resource)
}

/// Catalog of the kinds tracked for every context
pub fn default_resource_factories() -> FactoryResult<ResourceFactoryHandler> {
    let route = ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk("route.openshift.io", "v1", "Route"),
        "routes",
    );

    let mut handler = ResourceFactoryHandler::new();

    // Cluster-scoped
    handler.add(factory("nodes", "", false, ApiResource::erase::<Node>(&())))?;

    // Workloads
    handler.add(factory("pods", "", true, ApiResource::erase::<Pod>(&())))?;
    handler.add(factory("deployments", "apps", true, ApiResource::erase::<Deployment>(&())))?;
    handler.add(factory("cronjobs", "batch", true, ApiResource::erase::<CronJob>(&())))?;
    handler.add(factory("jobs", "batch", true, ApiResource::erase::<Job>(&())))?;

    // Networking
    handler.add(factory("services", "", true, ApiResource::erase::<Service>(&())))?;
    handler.add(factory("ingresses", "networking.k8s.io", true, ApiResource::erase::<Ingress>(&())))?;
    handler.add(factory("routes", "route.openshift.io", true, route))?;

    // Configuration and storage
    handler.add(factory(
        "persistentvolumeclaims",
        "",
        true,
        ApiResource::erase::<PersistentVolumeClaim>(&()),
    ))?;
    handler.add(factory("configmaps", "", true, ApiResource::erase::<ConfigMap>(&())))?;
    handler.add(factory("secrets", "", true, ApiResource::erase::<Secret>(&())))?;

    Ok(handler)
}
