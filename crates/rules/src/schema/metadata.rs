//! Document-level metadata: identity, provider, service and scan scope.

use serde::{Deserialize, Serialize};

/// Metadata header of a service rule document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceMetadata {
    pub id: String,
    pub name: String,
    /// Provider key (`aws`, `azure`, `gcp`, ...) matched against accounts.
    pub provider: String,
    /// Logical service name; used for filtering and as the scope service.
    pub service: String,
    #[serde(default)]
    pub scope: ServiceScopeKind,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Whether a service is scanned per region or once per account.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceScopeKind {
    #[default]
    Regional,
    Global,
}

pub(crate) fn default_true() -> bool {
    true
}
