//! Rule envelope for lightweight first-pass deserialization.

use serde::{Deserialize, Serialize};

use super::{ServiceDocument, SERVICE_RULES_KIND};

/// Minimal metadata read during the first pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub rest: serde_yaml::Value,
}

/// Lightweight first-pass deserializer that reads only the header fields.
///
/// Used during two-pass loading: first check `kind` and `metadata.id` so a
/// wrong document type gets a precise error, then deserialize the full
/// document with `deny_unknown_fields`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEnvelope {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: EnvelopeMetadata,
    /// Remaining fields captured as raw YAML for second-pass deserialization.
    #[serde(flatten)]
    pub rest: serde_yaml::Value,
}

impl RuleEnvelope {
    /// Two-pass: reconstruct the full YAML value and deserialize into the concrete type.
    pub fn parse_full(&self) -> std::result::Result<ServiceDocument, String> {
        if self.kind != SERVICE_RULES_KIND {
            return Err(format!(
                "unsupported kind '{}', expected '{}'",
                self.kind, SERVICE_RULES_KIND
            ));
        }
        let value = serde_yaml::to_value(self).map_err(|e| e.to_string())?;
        serde_yaml::from_value(value).map_err(|e| e.to_string())
    }
}
