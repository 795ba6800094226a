//! State module
//!
//! - `registry` - thread-safe per-context state store
//! - `dispatcher` - pushes registry snapshots to consumers on change

pub mod dispatcher;
pub mod registry;

pub use dispatcher::{ContextsStatesDispatcher, GENERAL_STATE_CHANNEL, PERMISSIONS_CHANNEL, StateSender};
pub use registry::{ContextState, ContextsStatesRegistry};
