//! YAML DSL schema types with serde deserialization.
//!
//! Defines the type hierarchy for service rule documents:
//! - `RuleEnvelope`: lightweight first-pass header (apiVersion, kind, metadata)
//! - `ServiceDocument`: discovery steps plus checks for one cloud service
//! - `DiscoveryStep` / `Call` / `Emit`: how resources are enumerated
//! - `Check` / `FieldAssertion`: what is asserted on each emitted item
//!
//! Pure data. Behavior lives in the accessor, condition and template modules
//! and in the engine crate.

mod check;
mod discovery;
mod document;
mod envelope;
mod metadata;

pub use check::*;
pub use discovery::*;
pub use document::*;
pub use envelope::*;
pub use metadata::*;
