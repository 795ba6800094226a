//! Resource class definitions
//!
//! Groups resource kinds into primary and secondary sets for display.
//! This is a naming classification only: caches and permissions treat
//! both classes the same way.

use std::fmt;
use std::str::FromStr;

/// Display grouping of a resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Workload kinds shown first (pods, deployments)
    Primary,
    /// Everything else (services, ingresses, routes, ...)
    Secondary,
}

/// Resource names that belong to the primary class
const PRIMARY_RESOURCES: &[&str] = &["pods", "deployments"];

impl ResourceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceClass::Primary => "primary",
            ResourceClass::Secondary => "secondary",
        }
    }

    /// Classify a resource name (plural, lowercase, e.g. "pods")
    pub fn of(resource_name: &str) -> Self {
        if PRIMARY_RESOURCES.contains(&resource_name) {
            ResourceClass::Primary
        } else {
            ResourceClass::Secondary
        }
    }

    pub fn all() -> &'static [Self] {
        &[ResourceClass::Primary, ResourceClass::Secondary]
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" => Ok(ResourceClass::Primary),
            "secondary" => Ok(ResourceClass::Secondary),
            _ => Err(format!("Unknown resource class: {}", s)),
        }
    }
}
