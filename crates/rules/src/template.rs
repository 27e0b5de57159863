//! Strict `{{ placeholder }}` substitution for call parameters.
//!
//! One syntax only: `{{ identifier(.identifier)* }}`, resolved through the
//! field accessor against a [`ResourceContext`]. An unbound or null
//! placeholder is an error; a partially rendered string is never returned.

use serde_json::Value;

use crate::accessor::{AccessError, FieldPath};
use crate::context::ResourceContext;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("malformed template '{template}': {reason}")]
    Malformed { template: String, reason: String },

    #[error("unbound placeholder '{{{{ {placeholder} }}}}' in '{template}'")]
    Unbound { template: String, placeholder: String },

    #[error("placeholder '{{{{ {placeholder} }}}}' in '{template}' is null")]
    Null { template: String, placeholder: String },

    #[error(transparent)]
    Access(#[from] AccessError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Placeholder(FieldPath),
}

/// A parsed template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        let malformed = |reason: &str| TemplateError::Malformed {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut rest = raw;
        while let Some(start) = rest.find("{{") {
            if start > 0 {
                parts.push(Part::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| malformed("unclosed '{{'"))?;
            let inner = after[..end].trim();
            if !is_placeholder_expr(inner) {
                return Err(malformed(&format!(
                    "'{inner}' is not of the form identifier(.identifier)*"
                )));
            }
            let path = FieldPath::parse(inner).map_err(|e| malformed(&e.to_string()))?;
            parts.push(Part::Placeholder(path));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            parts.push(Part::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder paths in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &FieldPath> {
        self.parts.iter().filter_map(|p| match p {
            Part::Placeholder(path) => Some(path),
            Part::Literal(_) => None,
        })
    }

    /// The template is exactly one placeholder with no surrounding text.
    fn sole_placeholder(&self) -> Option<&FieldPath> {
        match self.parts.as_slice() {
            [Part::Placeholder(path)] => Some(path),
            _ => None,
        }
    }

    fn lookup(&self, path: &FieldPath, root: &Value) -> Result<Value, TemplateError> {
        match path.resolve(root)? {
            None => Err(TemplateError::Unbound {
                template: self.raw.clone(),
                placeholder: path.to_string(),
            }),
            Some(Value::Null) => Err(TemplateError::Null {
                template: self.raw.clone(),
                placeholder: path.to_string(),
            }),
            Some(value) => Ok(value),
        }
    }

    /// Render to a string against `root`.
    pub fn render_with(&self, root: &Value) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.raw.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Placeholder(path) => {
                    let value = self.lookup(path, root)?;
                    out.push_str(&display_value(&value));
                }
            }
        }
        Ok(out)
    }

    /// Render to a JSON value; a sole placeholder keeps the bound value's type.
    pub fn render_value_with(&self, root: &Value) -> Result<Value, TemplateError> {
        match self.sole_placeholder() {
            Some(path) => self.lookup(path, root),
            None => self.render_with(root).map(Value::String),
        }
    }
}

/// Render a template string against a resource context.
pub fn render(template: &str, ctx: &ResourceContext) -> Result<String, TemplateError> {
    Template::parse(template)?.render_with(ctx.as_value())
}

/// Render every string inside `value` (objects and arrays are walked).
pub fn render_value(value: &Value, ctx: &ResourceContext) -> Result<Value, TemplateError> {
    render_value_against(value, ctx.as_value())
}

fn render_value_against(value: &Value, root: &Value) -> Result<Value, TemplateError> {
    match value {
        Value::String(s) if s.contains("{{") => Template::parse(s)?.render_value_with(root),
        Value::Array(items) => items
            .iter()
            .map(|v| render_value_against(v, root))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), render_value_against(v, root)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_placeholder_expr(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}
