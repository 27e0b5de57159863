//! Rule metadata store: descriptive text keyed by `rule_id`.
//!
//! Check definitions only carry a `rule_id`; titles, severities and
//! remediation guidance are kept outside the rule documents so they can be
//! maintained (and translated) independently.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::loader::DocumentError;

/// Severity attached to a rule in the metadata store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Descriptive information for one rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleInfo {
    pub rule_id: String,
    pub title: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub remediation: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Lookup of rule metadata by `rule_id`.
pub trait MetadataStore: Send + Sync {
    fn lookup(&self, rule_id: &str) -> Option<RuleInfo>;

    fn contains(&self, rule_id: &str) -> bool {
        self.lookup(rule_id).is_some()
    }
}

/// Metadata held in memory, typically loaded from a YAML list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    entries: HashMap<String, RuleInfo>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries; a later duplicate `rule_id` replaces an earlier one.
    pub fn from_entries(entries: impl IntoIterator<Item = RuleInfo>) -> Self {
        let mut store = Self::new();
        for info in entries {
            store.insert(info);
        }
        store
    }

    /// Parse a YAML sequence of [`RuleInfo`] entries.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DocumentError> {
        let entries: Vec<RuleInfo> = serde_yaml::from_str(yaml)?;
        if let Some(blank) = entries.iter().position(|e| e.rule_id.trim().is_empty()) {
            return Err(DocumentError::Validation(format!(
                "metadata entry {blank} has an empty rule_id"
            )));
        }
        Ok(Self::from_entries(entries))
    }

    pub fn from_file(path: &Path) -> Result<Self, DocumentError> {
        let contents = fs::read_to_string(path)?;
        let store = Self::from_yaml_str(&contents)?;
        tracing::info!(path = %path.display(), entries = store.len(), "loaded rule metadata");
        Ok(store)
    }

    pub fn insert(&mut self, info: RuleInfo) {
        self.entries.insert(info.rule_id.clone(), info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn lookup(&self, rule_id: &str) -> Option<RuleInfo> {
        self.entries.get(rule_id).cloned()
    }
}
