//! Header validation: apiVersion, kind and metadata.

use crate::schema::*;
use super::ValidationResult;
use super::fuzzy::is_kebab_case;

pub(super) fn validate_header(doc: &ServiceDocument, result: &mut ValidationResult) {
    if doc.api_version != API_VERSION {
        result.error(
            "apiVersion",
            format!("apiVersion must be '{API_VERSION}', got '{}'", doc.api_version),
        );
    }

    if doc.kind != SERVICE_RULES_KIND {
        result.error(
            "kind",
            format!("kind must be '{SERVICE_RULES_KIND}', got '{}'", doc.kind),
        );
    }

    let meta = &doc.metadata;
    if !is_kebab_case(&meta.id) {
        result.error(
            "metadata.id",
            format!(
                "id must be kebab-case (lowercase alphanumeric + hyphens), got '{}'",
                meta.id
            ),
        );
    }
    if meta.name.trim().is_empty() {
        result.error("metadata.name", "name must not be empty");
    }
    if meta.provider.trim().is_empty() {
        result.error("metadata.provider", "provider must not be empty");
    } else if meta.provider != meta.provider.to_lowercase() {
        result.warn(
            "metadata.provider",
            format!("provider '{}' is matched case-sensitively against accounts", meta.provider),
        );
    }
    if meta.service.trim().is_empty() {
        result.error("metadata.service", "service must not be empty");
    }

    if doc.discovery.is_empty() {
        result.error("discovery", "document must declare at least one discovery step");
    }
    if doc.checks.is_empty() {
        result.warn("checks", "document declares no checks");
    }
}
