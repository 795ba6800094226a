//! Kubeconfig context descriptors

use serde::{Deserialize, Serialize};

/// One cluster/user/namespace combination taken from a kubeconfig.
///
/// The name is the key: it is assumed unique within a loaded kubeconfig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeContext {
    pub name: String,
    pub cluster: String,
    pub user: String,
    /// Namespace configured on the context, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// API server URL of the referenced cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Whether this is the kubeconfig's current-context
    #[serde(default)]
    pub current: bool,
}

impl KubeContext {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster: cluster.into(),
            user: user.into(),
            namespace: None,
            server: None,
            current: false,
        }
    }

    /// Namespace used for namespaced watches and permission checks
    ///
    /// An explicit override wins, then the context's own namespace, then `default`.
    pub fn effective_namespace(&self, override_ns: Option<&str>) -> String {
        override_ns
            .map(str::to_string)
            .or_else(|| self.namespace.clone())
            .unwrap_or_else(|| "default".to_string())
    }
}
