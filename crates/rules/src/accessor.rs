//! Dotted/indexed field paths over arbitrary JSON values.
//!
//! Path syntax: dot-separated segments, each a key optionally followed by
//! `[N]` (select one element) or `[]` (project over every element), e.g.
//! `response.Buckets[].Name` or `Rules[0].Algorithm`. The sentinel
//! `__self__` addresses the root itself.
//!
//! Resolution never guesses: walking into an array by key without `[]` is an
//! [`AccessError::AmbiguousArray`]. Anything else that does not line up
//! (missing key, index out of range, descending into a scalar) is simply
//! absent, reported as `Ok(None)` and kept distinct from a present `null`.

use std::fmt;

use serde_json::Value;

/// Path addressing the root value itself.
pub const SELF_PATH: &str = "__self__";

/// Malformed path text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("field path is empty")]
    Empty,

    #[error("empty segment in field path '{0}'")]
    EmptySegment(String),

    #[error("unclosed '[' in field path '{0}'")]
    UnclosedBracket(String),

    #[error("invalid index '{index}' in field path '{path}'")]
    InvalidIndex { path: String, index: String },

    #[error("unexpected '{ch}' in field path '{path}'")]
    UnexpectedChar { path: String, ch: char },
}

/// Failure to resolve a well-formed path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("ambiguous traversal in '{path}': '{segment}' applied to an array without []")]
    AmbiguousArray { path: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Project,
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::Empty);
        }
        if trimmed == SELF_PATH {
            return Ok(Self {
                raw: trimmed.to_string(),
                segments: Vec::new(),
            });
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            parse_part(trimmed, part, &mut segments)?;
        }

        Ok(Self {
            raw: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_self(&self) -> bool {
        self.segments.is_empty()
    }

    /// First key of the path, i.e. the binding it reads from.
    pub fn root_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(k)) => Some(k),
            _ => None,
        }
    }

    /// Whether the path contains a `[]` projection.
    pub fn projects(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Project))
    }

    /// Resolve against `root`. `Ok(None)` means absent.
    pub fn resolve(&self, root: &Value) -> Result<Option<Value>, AccessError> {
        walk(self, root, &self.segments)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Parse and resolve in one go.
pub fn resolve(path: &str, root: &Value) -> Result<Option<Value>, AccessError> {
    FieldPath::parse(path)?.resolve(root)
}

fn parse_part(path: &str, part: &str, out: &mut Vec<Segment>) -> Result<(), PathError> {
    if part.is_empty() {
        return Err(PathError::EmptySegment(path.to_string()));
    }

    let (key, mut rest) = match part.find('[') {
        Some(idx) => (&part[..idx], &part[idx..]),
        None => (part, ""),
    };

    if let Some(ch) = key.chars().find(|c| *c == ']' || c.is_whitespace()) {
        return Err(PathError::UnexpectedChar {
            path: path.to_string(),
            ch,
        });
    }
    if key.is_empty() && rest.is_empty() {
        return Err(PathError::EmptySegment(path.to_string()));
    }
    if !key.is_empty() {
        out.push(Segment::Key(key.to_string()));
    }

    while !rest.is_empty() {
        let inner_end = rest
            .find(']')
            .ok_or_else(|| PathError::UnclosedBracket(path.to_string()))?;
        let inner = &rest[1..inner_end];
        if inner.is_empty() {
            out.push(Segment::Project);
        } else {
            let index = inner.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                path: path.to_string(),
                index: inner.to_string(),
            })?;
            out.push(Segment::Index(index));
        }
        rest = &rest[inner_end + 1..];
        if let Some(ch) = rest.chars().next() {
            if ch != '[' {
                return Err(PathError::UnexpectedChar {
                    path: path.to_string(),
                    ch,
                });
            }
        }
    }

    Ok(())
}

fn walk(path: &FieldPath, current: &Value, segments: &[Segment]) -> Result<Option<Value>, AccessError> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(Some(current.clone()));
    };

    match head {
        Segment::Key(key) => match current {
            Value::Object(map) => match map.get(key) {
                Some(next) => walk(path, next, rest),
                None => Ok(None),
            },
            Value::Array(_) => Err(AccessError::AmbiguousArray {
                path: path.raw.clone(),
                segment: key.clone(),
            }),
            _ => Ok(None),
        },
        Segment::Index(index) => match current {
            Value::Array(items) => match items.get(*index) {
                Some(next) => walk(path, next, rest),
                None => Ok(None),
            },
            _ => Ok(None),
        },
        Segment::Project => match current {
            Value::Array(items) => {
                let flatten = rest.iter().any(|s| matches!(s, Segment::Project));
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match walk(path, item, rest)? {
                        Some(Value::Array(inner)) if flatten => out.extend(inner),
                        Some(value) => out.push(value),
                        None => {}
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            _ => Ok(None),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "Name": "logs",
            "Owner": null,
            "Tags": [
                {"Key": "env", "Value": "prod"},
                {"Key": "team"},
            ],
            "Rules": [
                {"Algorithm": "AES256", "Targets": [{"Id": "a"}, {"Id": "b"}]},
                {"Algorithm": "aws:kms", "Targets": [{"Id": "c"}]},
            ],
            "Versioning": {"Status": "Enabled"},
        })
    }

    #[test]
    fn resolves_nested_keys() {
        let v = sample();
        assert_eq!(resolve("Versioning.Status", &v).unwrap(), Some(json!("Enabled")));
        assert_eq!(resolve("Name", &v).unwrap(), Some(json!("logs")));
    }

    #[test]
    fn self_returns_root() {
        let v = sample();
        assert_eq!(resolve(SELF_PATH, &v).unwrap(), Some(v.clone()));
        assert!(FieldPath::parse("__self__").unwrap().is_self());
    }

    #[test]
    fn absent_is_distinct_from_null() {
        let v = sample();
        assert_eq!(resolve("Owner", &v).unwrap(), Some(Value::Null));
        assert_eq!(resolve("Missing", &v).unwrap(), None);
        assert_eq!(resolve("Owner.Id", &v).unwrap(), None);
        assert_eq!(resolve("Name.Length", &v).unwrap(), None);
    }

    #[test]
    fn index_selects_single_element() {
        let v = sample();
        assert_eq!(resolve("Rules[0].Algorithm", &v).unwrap(), Some(json!("AES256")));
        assert_eq!(resolve("Rules[1].Targets[0].Id", &v).unwrap(), Some(json!("c")));
        assert_eq!(resolve("Rules[9].Algorithm", &v).unwrap(), None);
        assert_eq!(resolve("Name[0]", &v).unwrap(), None);
    }

    #[test]
    fn projection_collects_and_skips_absent() {
        let v = sample();
        assert_eq!(
            resolve("Tags[].Value", &v).unwrap(),
            Some(json!(["prod"]))
        );
        assert_eq!(
            resolve("Rules[].Algorithm", &v).unwrap(),
            Some(json!(["AES256", "aws:kms"]))
        );
    }

    #[test]
    fn nested_projection_flattens() {
        let v = sample();
        assert_eq!(
            resolve("Rules[].Targets[].Id", &v).unwrap(),
            Some(json!(["a", "b", "c"]))
        );
    }

    #[test]
    fn array_without_brackets_is_an_error() {
        let v = sample();
        let err = resolve("Tags.Key", &v).unwrap_err();
        assert!(matches!(err, AccessError::AmbiguousArray { ref segment, .. } if segment == "Key"));
    }

    #[test]
    fn returning_an_array_is_not_traversal() {
        let v = sample();
        let tags = resolve("Tags", &v).unwrap().unwrap();
        assert!(tags.is_array());
    }

    #[test]
    fn root_level_projection() {
        let v = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(resolve("[].id", &v).unwrap(), Some(json!([1, 2])));
        assert_eq!(resolve("[1].id", &v).unwrap(), Some(json!(2)));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        assert_eq!(FieldPath::parse("  "), Err(PathError::Empty));
        assert!(matches!(FieldPath::parse("a..b"), Err(PathError::EmptySegment(_))));
        assert!(matches!(FieldPath::parse("a[0"), Err(PathError::UnclosedBracket(_))));
        assert!(matches!(FieldPath::parse("a[x]"), Err(PathError::InvalidIndex { .. })));
        assert!(matches!(FieldPath::parse("a[0]b"), Err(PathError::UnexpectedChar { .. })));
        assert!(matches!(FieldPath::parse("a b"), Err(PathError::UnexpectedChar { .. })));
    }

    #[test]
    fn resolution_is_deterministic() {
        let v = sample();
        let path = FieldPath::parse("Rules[].Targets[].Id").unwrap();
        let first = path.resolve(&v).unwrap();
        for _ in 0..10 {
            assert_eq!(path.resolve(&v).unwrap(), first);
        }
        assert_eq!(v, sample());
    }

    #[test]
    fn root_key_reports_binding() {
        assert_eq!(FieldPath::parse("item.status").unwrap().root_key(), Some("item"));
        assert_eq!(FieldPath::parse("[0]").unwrap().root_key(), None);
        assert!(FieldPath::parse("a[].b").unwrap().projects());
    }
}
