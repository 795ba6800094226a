//! Per-context general state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress of a reachability check on a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckingStatus {
    Waiting,
    Checking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckingState {
    pub state: CheckingStatus,
}

impl CheckingState {
    pub fn waiting() -> Self {
        Self {
            state: CheckingStatus::Waiting,
        }
    }

    pub fn checking() -> Self {
        Self {
            state: CheckingStatus::Checking,
        }
    }
}

/// Summary of a context as seen by consumers
///
/// `checking` and `error` are always serialized (as `null` when unset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextGeneralState {
    pub reachable: bool,
    pub checking: Option<CheckingState>,
    pub error: Option<String>,
    /// Number of cached objects per resource kind
    pub resources: BTreeMap<String, usize>,
}

impl ContextGeneralState {
    /// State of a context nothing has been recorded for yet
    pub fn unreachable<I, S>(resource_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reachable: false,
            checking: None,
            error: None,
            resources: resource_names.into_iter().map(|n| (n.into(), 0)).collect(),
        }
    }
}
