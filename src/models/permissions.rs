//! Access-review attributes, permission request trees and their results

use k8s_openapi::api::authorization::v1::ResourceAttributes as KubeResourceAttributes;
use serde::{Deserialize, Serialize};

/// The unit sent to the self-subject-access-review API
///
/// Equality is structural; request grouping relies on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttributes {
    pub verb: String,
    pub group: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceAttributes {
    pub fn new(verb: impl Into<String>, group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            group: group.into(),
            resource: resource.into(),
            namespace: None,
        }
    }

    /// Copy of these attributes scoped to `namespace` (or cluster-wide for `None`)
    pub fn with_namespace(&self, namespace: Option<&str>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            ..self.clone()
        }
    }
}

impl From<&ResourceAttributes> for KubeResourceAttributes {
    fn from(attrs: &ResourceAttributes) -> Self {
        KubeResourceAttributes {
            verb: Some(attrs.verb.clone()),
            group: Some(attrs.group.clone()),
            resource: Some(attrs.resource.clone()),
            namespace: attrs.namespace.clone(),
            ..Default::default()
        }
    }
}

/// A node of a permission request tree
///
/// `on_deny_requests` are only evaluated when `attrs` is denied (or not
/// allowed). Each child covers a subset of `resources`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPermissionsRequest {
    pub attrs: ResourceAttributes,
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_deny_requests: Vec<ContextPermissionsRequest>,
}

/// Permission known for one resource kind in one context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResourcePermission {
    pub attrs: ResourceAttributes,
    pub permitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Emitted once per evaluated request node that settles a set of resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextPermissionResult {
    /// Name of the kubeconfig context the review was issued against
    pub context: String,
    pub resources: Vec<String>,
    pub attrs: ResourceAttributes,
    pub permitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ContextPermissionResult {
    /// Per-resource view of this result
    pub fn permission(&self) -> ContextResourcePermission {
        ContextResourcePermission {
            attrs: self.attrs.clone(),
            permitted: self.permitted,
            reason: self.reason.clone(),
        }
    }
}
