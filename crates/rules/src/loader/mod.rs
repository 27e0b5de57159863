//! Filesystem rule loader and the validated in-memory rule set.
//!
//! Scans the rules directory for YAML documents, parses them via two-pass
//! deserialization (RuleEnvelope -> ServiceDocument), validates each one and
//! keeps only the documents that pass. Invalid documents are reported per
//! file and never reach the scanner.

mod core;
mod error;
mod ruleset;

#[cfg(test)]
mod tests;

pub use self::core::{parse_document, RuleLoader};
pub use self::error::{DocumentError, LoadResult, LoadStatus, Result};
pub use self::ruleset::RuleSet;
