//! Check types: field assertions combined with AND/OR logic.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::metadata::default_true;

/// A compliance assertion evaluated over the items of one discovery step.
///
/// Titles, severities and remediation text are looked up by `rule_id` in the
/// metadata store; they never live in the check itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Check {
    pub rule_id: String,
    /// Discovery step whose items this check iterates.
    pub for_each: String,
    #[serde(default)]
    pub logic: Logic,
    pub conditions: Vec<FieldAssertion>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// How multiple assertions combine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    #[default]
    #[serde(alias = "AND")]
    And,
    #[serde(alias = "OR")]
    Or,
}

/// A single field assertion: `var <op> value`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FieldAssertion {
    /// Field path resolved against the evaluation context (`item.*`, `region`, ...).
    pub var: String,
    pub op: Operator,
    /// Expected value; omitted for `exists` / `not_exists`.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

/// The fixed operator set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "eq")]
    Equals,
    #[serde(alias = "ne")]
    NotEquals,
    Contains,
    NotContains,
    Exists,
    NotExists,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Regex,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::NotContains,
        Operator::Exists,
        Operator::NotExists,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::NotIn,
        Operator::Regex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::Exists => "exists",
            Operator::NotExists => "not_exists",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::Regex => "regex",
        }
    }

    /// Existence operators ignore the expected value.
    pub fn is_existence(&self) -> bool {
        matches!(self, Operator::Exists | Operator::NotExists)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte
        )
    }

    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
