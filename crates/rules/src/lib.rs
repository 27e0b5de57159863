//! Service rule documents and the pure evaluation primitives that run them.
//!
//! This crate provides:
//! - YAML rule document model with two-pass deserialization
//! - Filesystem loader and `RuleSet` of validated documents
//! - Static validation with "did you mean" suggestions
//! - Field accessor, condition evaluator and template substitution
//! - Rule metadata store (titles, severities, remediation)

pub mod accessor;
pub mod condition;
pub mod context;
pub mod graph;
pub mod loader;
pub mod metadata;
pub mod schema;
pub mod template;
pub mod validation;
