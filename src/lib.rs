//! kontext library
//!
//! Tracks many Kubernetes contexts at once: one informer per permitted
//! resource kind, RBAC permission trees with deny-triggered fallbacks, and a
//! consolidated per-context state pushed to consumers on every change.
//! It can be used both as a binary and as a library for testing.

pub mod cli;
pub mod config;
pub mod informer;
pub mod kube;
pub mod manager;
pub mod models;
pub mod permissions;
pub mod state;

// Re-export commonly used types for convenience
pub use informer::{InformerEvent, ObjectCache, ResourceInformer, WatchSource};
pub use manager::{ContextClient, ContextConnector, ContextsManager, ContextsManagerEvent};
pub use models::{
    ContextGeneralState, ContextPermissionResult, ContextPermissionsRequest,
    ContextResourcePermission, KubeContext, ResourceAttributes,
};
pub use permissions::{
    AccessReviewer, ContextPermissionsChecker, FactoryError, ResourceFactory,
    ResourceFactoryHandler, default_resource_factories,
};
pub use state::{ContextsStatesDispatcher, ContextsStatesRegistry, StateSender};
