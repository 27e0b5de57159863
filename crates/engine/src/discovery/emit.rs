//! Emit projection: raw call responses to items.

use serde_json::{Map, Value};

use skyaudit_rules::accessor::{AccessError, FieldPath};
use skyaudit_rules::context::ResourceContext;
use skyaudit_rules::schema::{Emit, Pagination};

/// Binding holding the raw call response while a response is projected.
pub const RESPONSE_BINDING: &str = "response";

/// Project one response into items.
///
/// `scope` already holds the outer bindings, the parent item (if any) and
/// the response. Without `items_for` the whole response becomes one item;
/// with it, every element of the resolved array does. An absent or null
/// array yields no items; a non-array value is treated as one element.
pub fn project(emit: &Emit, scope: &ResourceContext) -> Result<Vec<Value>, AccessError> {
    let Some(items_for) = &emit.items_for else {
        let whole = scope.get(RESPONSE_BINDING).cloned().unwrap_or(Value::Null);
        return Ok(vec![build_item(emit, scope, whole)?]);
    };

    let elements = match FieldPath::parse(items_for)?.resolve(scope.as_value())? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(single) => vec![single],
    };

    let mut element_scope = scope.clone();
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        element_scope.bind(emit.alias.as_str(), element.clone());
        out.push(build_item(emit, &element_scope, element)?);
    }
    Ok(out)
}

fn build_item(emit: &Emit, scope: &ResourceContext, whole: Value) -> Result<Value, AccessError> {
    if emit.item.is_empty() {
        return Ok(whole);
    }
    let mut fields = Map::with_capacity(emit.item.len());
    for (name, path) in &emit.item {
        // Absent fields are left out so `not_exists` sees them as absent.
        if let Some(value) = FieldPath::parse(path)?.resolve(scope.as_value())? {
            fields.insert(name.clone(), value);
        }
    }
    Ok(Value::Object(fields))
}

/// Resource id of an emitted item: the `emit.id` field, else `id`, else a
/// positional `step[index]` label.
pub fn resource_id(emit: &Emit, step_id: &str, index: usize, item: &Value) -> String {
    let field = emit.id.as_deref().unwrap_or("id");
    match item.get(field) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        _ => format!("{step_id}[{index}]"),
    }
}

/// Next-page token, if the response carries a non-empty one.
pub fn next_token(page: &Pagination, scope: &ResourceContext) -> Result<Option<String>, AccessError> {
    Ok(match FieldPath::parse(&page.token_path)?.resolve(scope.as_value())? {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
