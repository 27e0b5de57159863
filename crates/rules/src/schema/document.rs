//! Service rule document container and accessors.

use serde::{Deserialize, Serialize};

use super::{Check, DiscoveryStep, ServiceMetadata};

/// Supported `apiVersion`.
pub const API_VERSION: &str = "v1";
/// Supported `kind`.
pub const SERVICE_RULES_KIND: &str = "ServiceRules";

/// A fully deserialized rule document for one cloud service.
///
/// Immutable after load; shared behind `Arc` across scan runs and accounts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceDocument {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: ServiceMetadata,
    #[serde(default)]
    pub discovery: Vec<DiscoveryStep>,
    #[serde(default)]
    pub checks: Vec<Check>,
}

impl ServiceDocument {
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn provider(&self) -> &str {
        &self.metadata.provider
    }

    pub fn service(&self) -> &str {
        &self.metadata.service
    }

    /// Look up a discovery step by id.
    pub fn step(&self, id: &str) -> Option<&DiscoveryStep> {
        self.discovery.iter().find(|s| s.id == id)
    }

    /// Position of a discovery step in document order.
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.discovery.iter().position(|s| s.id == id)
    }

    /// Checks bound to the given discovery step, in document order.
    pub fn checks_for<'a>(&'a self, step_id: &'a str) -> impl Iterator<Item = &'a Check> + 'a {
        self.checks.iter().filter(move |c| c.for_each == step_id)
    }

    /// Serialize this document to YAML.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
