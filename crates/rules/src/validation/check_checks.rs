//! Check validation: targets, rule ids and operator/value compatibility.

use std::collections::HashSet;

use serde_json::Value;

use crate::condition::as_number;
use crate::context::OUTER_BINDINGS;
use crate::metadata::MetadataStore;
use crate::schema::*;
use super::ValidationResult;
use super::discovery_checks::validate_path_root;
use super::fuzzy::fuzzy_match;

/// Binding for the current item while a check is evaluated.
const ITEM_BINDING: &str = "item";

pub(super) fn validate_checks(doc: &ServiceDocument, result: &mut ValidationResult) {
    let step_ids: Vec<&str> = doc.discovery.iter().map(|s| s.id.as_str()).collect();
    let mut bound: Vec<&str> = OUTER_BINDINGS.to_vec();
    bound.push(ITEM_BINDING);

    let mut rule_ids = HashSet::new();
    for (i, check) in doc.checks.iter().enumerate() {
        let path = format!("checks[{i}]");

        if check.rule_id.trim().is_empty() {
            result.error(format!("{path}.rule_id"), "rule_id must not be empty");
        } else if !rule_ids.insert(check.rule_id.as_str()) {
            result.error(
                format!("{path}.rule_id"),
                format!("duplicate rule_id '{}'", check.rule_id),
            );
        }

        if doc.step(&check.for_each).is_none() {
            result.error_with_suggestion(
                format!("{path}.for_each"),
                format!("unknown discovery step '{}'", check.for_each),
                fuzzy_match(&check.for_each, &step_ids),
            );
        }

        if check.conditions.is_empty() {
            result.error(format!("{path}.conditions"), "check must declare at least one condition");
        }
        for (c, assertion) in check.conditions.iter().enumerate() {
            let cpath = format!("{path}.conditions[{c}]");
            validate_path_root(&assertion.var, &format!("{cpath}.var"), &bound, result);
            validate_operand(assertion, &cpath, result);
        }
    }
}

fn validate_operand(assertion: &FieldAssertion, path: &str, result: &mut ValidationResult) {
    let op = assertion.op;
    let value_path = format!("{path}.value");

    let Some(value) = &assertion.value else {
        if !op.is_existence() {
            result.error(value_path, format!("operator '{op}' requires a value"));
        }
        return;
    };

    if op.is_existence() {
        result.warn(value_path, format!("value is ignored by operator '{op}'"));
    } else if op.is_membership() {
        if !value.is_array() {
            result.error(value_path, format!("operator '{op}' requires a list value"));
        }
    } else if op.is_numeric() {
        if as_number(value).is_none() {
            result.error(value_path, format!("operator '{op}' requires a numeric value, got {value}"));
        }
    } else if op == Operator::Regex {
        match value {
            Value::String(pattern) => {
                if let Err(e) = regex::Regex::new(pattern) {
                    result.error(value_path, format!("invalid regex '{pattern}': {e}"));
                }
            }
            other => result.error(value_path, format!("operator 'regex' requires a string pattern, got {other}")),
        }
    }
}

pub(super) fn validate_metadata_coverage(
    doc: &ServiceDocument,
    store: &dyn MetadataStore,
    result: &mut ValidationResult,
) {
    for (i, check) in doc.checks.iter().enumerate() {
        if !check.rule_id.is_empty() && !store.contains(&check.rule_id) {
            result.warn(
                format!("checks[{i}].rule_id"),
                format!("no metadata entry for rule '{}'", check.rule_id),
            );
        }
    }
}
