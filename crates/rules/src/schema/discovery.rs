//! Discovery step types: provider calls and item projection.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One node of the discovery graph.
///
/// A step without `for_each` runs its calls once per scope. A step with
/// `for_each` runs its calls once per item emitted by the referenced step,
/// with that item bound under `as`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryStep {
    pub id: String,
    #[serde(default)]
    pub for_each: Option<String>,
    /// Binding name of the parent item in call params and emit paths.
    #[serde(default = "default_alias", rename = "as")]
    pub alias: String,
    pub calls: Vec<Call>,
    #[serde(default)]
    pub emit: Emit,
}

/// A single provider operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Call {
    /// Logical client (service) name handed to the client registry.
    pub client: String,
    /// Provider operation identifier.
    pub action: String,
    /// Call parameters; string values may contain `{{ placeholders }}`.
    #[serde(default)]
    pub params: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub on_error: OnError,
    #[serde(default)]
    pub paginate: Option<Pagination>,
}

/// What a failed call does to its step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// Fail the step and every step depending on it.
    #[default]
    Propagate,
    /// Treat the failure as zero items and record a gap.
    Continue,
}

/// Token-based pagination for list operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Pagination {
    /// Path (against `response`-bound scope) to the next-page token.
    pub token_path: String,
    /// Request parameter that receives the token on the next call.
    pub token_param: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

fn default_max_pages() -> u32 {
    100
}

/// Projection of a raw call response into items.
///
/// Paths are resolved against a scope holding the outer bindings, the parent
/// item (for `for_each` steps), `response`, and, when `items_for` is set, the
/// current element under `as`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Emit {
    /// Path to an array; one item per element. Unset means one item per response.
    #[serde(default)]
    pub items_for: Option<String>,
    #[serde(default = "default_alias", rename = "as")]
    pub alias: String,
    /// Item field holding the resource identifier.
    #[serde(default)]
    pub id: Option<String>,
    /// Declared field name -> path. Empty keeps the whole element (or response).
    #[serde(default)]
    pub item: IndexMap<String, String>,
}

impl Default for Emit {
    fn default() -> Self {
        Self {
            items_for: None,
            alias: default_alias(),
            id: None,
            item: IndexMap::new(),
        }
    }
}

pub(crate) fn default_alias() -> String {
    "item".to_string()
}
