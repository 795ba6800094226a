//! Permissions module
//!
//! Works out which resource kinds the current user may watch in a context:
//! - `factory` - catalog of resource kinds and request-tree construction
//! - `catalog` - the built-in set of tracked kinds
//! - `reviewer` - the self-subject-access-review seam
//! - `checker` - evaluation of a request tree with deny-triggered fallbacks

pub mod catalog;
pub mod checker;
pub mod factory;
pub mod reviewer;

pub use catalog::default_resource_factories;
pub use checker::ContextPermissionsChecker;
pub use factory::{ResourceFactory, ResourceFactoryHandler};
pub use reviewer::{AccessReviewer, KubeAccessReviewer};

/// Errors raised by misconfigured factories or malformed request scopes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FactoryError {
    #[error("a resource factory for '{0}' is already registered")]
    DuplicateResource(String),

    #[error("namespace must be defined for namespaced resources")]
    NamespaceRequired,

    #[error("namespace must not be defined for cluster-scoped resources (got '{0}')")]
    NamespaceForbidden(String),
}

/// Result type for factory operations
pub type FactoryResult<T> = Result<T, FactoryError>;
