//! Error types and load result structures for the rule loader.

use std::path::PathBuf;

use crate::validation::ValidationError;

/// Errors that can occur while loading a rule document.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Structural problem found before full validation (wrong kind, empty id, duplicate id).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The document parsed but failed static validation.
    #[error("document '{id}' is invalid: {}", summarize(.errors))]
    Invalid {
        id: String,
        errors: Vec<ValidationError>,
    },
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result alias for loader operations.
pub type Result<T> = std::result::Result<T, DocumentError>;

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Document was parsed, validated and added to the rule set.
    Loaded { document_id: String, warnings: usize },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}
