//! Configuration schema definitions
//!
//! Defines the structure of configuration files using serde for serialization.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Kubeconfig file; kube-rs resolution when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace for namespaced watches, overriding each context's own
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Seconds between reachability sweeps
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,

    /// Capacity of the manager event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Default tracing level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs.max(1))
    }
}

// Default value functions
fn default_reconnect_interval_secs() -> u64 {
    10
}

fn default_event_buffer() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            namespace: None,
            reconnect_interval_secs: default_reconnect_interval_secs(),
            event_buffer: default_event_buffer(),
            log_level: default_log_level(),
        }
    }
}
