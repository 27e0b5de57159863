//! Discovery graph validation: step ids, `for_each` references, call
//! templates, pagination and emit projections.

use std::collections::HashSet;

use serde_json::Value;

use crate::accessor::FieldPath;
use crate::context::OUTER_BINDINGS;
use crate::graph::{self, GraphError};
use crate::schema::*;
use crate::template::Template;
use super::ValidationResult;
use super::fuzzy::fuzzy_match;

/// Binding that holds the raw call response inside emit paths.
pub(super) const RESPONSE_BINDING: &str = "response";

pub(super) fn validate_discovery(doc: &ServiceDocument, result: &mut ValidationResult) {
    let step_ids: Vec<&str> = doc.discovery.iter().map(|s| s.id.as_str()).collect();

    let mut seen = HashSet::new();
    for (i, step) in doc.discovery.iter().enumerate() {
        let path = format!("discovery[{i}]");
        if step.id.trim().is_empty() {
            result.error(format!("{path}.id"), "step id must not be empty");
        } else if !seen.insert(step.id.as_str()) {
            result.error(format!("{path}.id"), format!("duplicate step id '{}'", step.id));
        }

        validate_step(doc, i, step, &step_ids, result);
    }

    if let Err(GraphError::Cycle(ids)) = graph::discovery_order(doc) {
        result.error(
            "discovery",
            format!("for_each references form a cycle: {}", ids.join(", ")),
        );
    }

    for (i, step) in doc.discovery.iter().enumerate() {
        let has_checks = doc.checks_for(&step.id).next().is_some();
        let has_dependents = doc
            .discovery
            .iter()
            .any(|s| s.for_each.as_deref() == Some(step.id.as_str()));
        if !has_checks && !has_dependents {
            result.warn(
                format!("discovery[{i}]"),
                format!("step '{}' is not used by any check or step", step.id),
            );
        }
    }
}

fn validate_step(
    doc: &ServiceDocument,
    index: usize,
    step: &DiscoveryStep,
    step_ids: &[&str],
    result: &mut ValidationResult,
) {
    let path = format!("discovery[{index}]");
    let mut bound: Vec<&str> = OUTER_BINDINGS.to_vec();

    match &step.for_each {
        Some(parent) if parent == &step.id => {
            result.error(format!("{path}.for_each"), "step cannot iterate its own items");
        }
        Some(parent) => match doc.step_index(parent) {
            None => result.error_with_suggestion(
                format!("{path}.for_each"),
                format!("unknown step '{parent}'"),
                fuzzy_match(parent, step_ids),
            ),
            Some(j) if j > index => result.error(
                format!("{path}.for_each"),
                format!("step '{parent}' must be declared before '{}'", step.id),
            ),
            Some(_) => {}
        },
        None => {}
    }

    if step.for_each.is_some() {
        validate_alias(&step.alias, &format!("{path}.as"), result);
        bound.push(&step.alias);
    } else if step.alias != "item" {
        result.warn(format!("{path}.as"), "'as' has no effect without 'for_each'");
    }

    if step.calls.is_empty() {
        result.error(format!("{path}.calls"), "step must declare at least one call");
    }
    for (c, call) in step.calls.iter().enumerate() {
        validate_call(call, &format!("{path}.calls[{c}]"), &bound, result);
    }

    validate_emit(&step.emit, &format!("{path}.emit"), &bound, result);
}

fn validate_call(call: &Call, path: &str, bound: &[&str], result: &mut ValidationResult) {
    if call.client.trim().is_empty() {
        result.error(format!("{path}.client"), "client must not be empty");
    }
    if call.action.trim().is_empty() {
        result.error(format!("{path}.action"), "action must not be empty");
    }
    for (key, value) in &call.params {
        validate_param_value(value, &format!("{path}.params.{key}"), bound, result);
    }

    if let Some(page) = &call.paginate {
        let mut response_bound = bound.to_vec();
        response_bound.push(RESPONSE_BINDING);
        validate_path_root(&page.token_path, &format!("{path}.paginate.token_path"), &response_bound, result);
        if page.token_param.trim().is_empty() {
            result.error(format!("{path}.paginate.token_param"), "token_param must not be empty");
        } else if call.params.contains_key(&page.token_param) {
            result.warn(
                format!("{path}.paginate.token_param"),
                format!("param '{}' is overwritten by the pagination token", page.token_param),
            );
        }
        if page.max_pages == 0 {
            result.error(format!("{path}.paginate.max_pages"), "max_pages must be at least 1");
        }
    }
}

fn validate_param_value(value: &Value, path: &str, bound: &[&str], result: &mut ValidationResult) {
    match value {
        Value::String(s) if s.contains("{{") || s.contains("}}") => match Template::parse(s) {
            Ok(template) => {
                for placeholder in template.placeholders() {
                    if let Some(root) = placeholder.root_key() {
                        if !bound.contains(&root) {
                            result.error_with_suggestion(
                                path,
                                format!("placeholder '{placeholder}' references unbound name '{root}'"),
                                fuzzy_match(root, bound),
                            );
                        }
                    }
                }
            }
            Err(e) => result.error(path, e.to_string()),
        },
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                validate_param_value(item, &format!("{path}[{i}]"), bound, result);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                validate_param_value(v, &format!("{path}.{k}"), bound, result);
            }
        }
        _ => {}
    }
}

fn validate_emit(emit: &Emit, path: &str, bound: &[&str], result: &mut ValidationResult) {
    let mut scope: Vec<&str> = bound.to_vec();
    scope.push(RESPONSE_BINDING);

    if let Some(items_for) = &emit.items_for {
        validate_path_root(items_for, &format!("{path}.items_for"), &scope, result);
        validate_alias(&emit.alias, &format!("{path}.as"), result);
        scope.push(&emit.alias);
    }

    for (field, field_path) in &emit.item {
        validate_path_root(field_path, &format!("{path}.item.{field}"), &scope, result);
    }

    if let Some(id) = &emit.id {
        if !emit.item.is_empty() && !emit.item.contains_key(id) {
            let fields: Vec<&str> = emit.item.keys().map(String::as_str).collect();
            result.error_with_suggestion(
                format!("{path}.id"),
                format!("id field '{id}' is not declared in item"),
                fuzzy_match(id, &fields),
            );
        }
    }
}

fn validate_alias(alias: &str, path: &str, result: &mut ValidationResult) {
    if alias.is_empty() || alias.contains(['.', '[', ']']) || alias.contains(char::is_whitespace) {
        result.error(path, format!("'{alias}' is not a valid binding name"));
    } else if alias == RESPONSE_BINDING || OUTER_BINDINGS.contains(&alias) {
        result.error(path, format!("binding '{alias}' shadows a built-in name"));
    }
}

/// Parse `raw` and ensure its first segment names one of `bound`.
pub(super) fn validate_path_root(raw: &str, path: &str, bound: &[&str], result: &mut ValidationResult) {
    let parsed = match FieldPath::parse(raw) {
        Ok(p) => p,
        Err(e) => {
            result.error(path, e.to_string());
            return;
        }
    };
    if parsed.is_self() {
        return;
    }
    match parsed.root_key() {
        Some(root) if bound.contains(&root) => {}
        Some(root) => result.error_with_suggestion(
            path,
            format!("path '{raw}' starts with unbound name '{root}'"),
            fuzzy_match(root, bound),
        ),
        None => result.error(path, format!("path '{raw}' must start with a binding name")),
    }
}
