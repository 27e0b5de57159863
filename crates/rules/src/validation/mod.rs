//! Static validation of service rule documents.
//!
//! Covers the document header, the discovery graph (step ids, `for_each`
//! references, call templates, emit paths) and checks (targets, rule ids,
//! operator/value compatibility). Returns a [`ValidationResult`] with errors
//! (the document is excluded from the rule set) and warnings (advisory).

mod check_checks;
mod discovery_checks;
mod schema_checks;

pub mod fuzzy;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::MetadataStore;
use crate::schema::*;

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Location inside the document, e.g. `"discovery[1].calls[0].params.Bucket"`.
    pub path: String,
    pub message: String,
    /// Optional "did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)?;
        } else {
            write!(f, "{}: {}", self.path, self.message)?;
        }
        if let Some(s) = &self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: suggestion.map(str::to_string),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a parsed [`ServiceDocument`].
pub fn validate_document(doc: &ServiceDocument) -> ValidationResult {
    let mut result = ValidationResult::new();
    schema_checks::validate_header(doc, &mut result);
    discovery_checks::validate_discovery(doc, &mut result);
    check_checks::validate_checks(doc, &mut result);
    result
}

/// Validate and additionally warn about checks whose `rule_id` has no metadata.
pub fn validate_document_with_metadata(
    doc: &ServiceDocument,
    store: &dyn MetadataStore,
) -> ValidationResult {
    let mut result = validate_document(doc);
    check_checks::validate_metadata_coverage(doc, store, &mut result);
    result
}

/// Parse raw YAML and validate. Parse errors are reported as validation errors.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    let envelope: RuleEnvelope = match serde_yaml::from_str(yaml) {
        Ok(env) => env,
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", format!("YAML parse error: {e}"));
            return result;
        }
    };
    match envelope.parse_full() {
        Ok(doc) => validate_document(&doc),
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", e);
            result
        }
    }
}
