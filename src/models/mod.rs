//! Model layer
//!
//! Plain data types shared by the informer, permission and state layers.
//!
//! Structure:
//! - `context.rs` - Kubeconfig context descriptors
//! - `permissions.rs` - Access-review attributes, request trees and results
//! - `state.rs` - Per-context general state published to consumers
//! - `resource_class.rs` - Primary/secondary grouping of resource kinds

pub mod context;
pub mod permissions;
pub mod resource_class;
pub mod state;

pub use context::KubeContext;
pub use permissions::{
    ContextPermissionResult, ContextPermissionsRequest, ContextResourcePermission,
    ResourceAttributes,
};
pub use resource_class::ResourceClass;
pub use state::{CheckingState, CheckingStatus, ContextGeneralState};
