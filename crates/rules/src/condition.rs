//! Condition evaluator: the fixed operator set over extracted values.
//!
//! [`evaluate`] applies one operator to an (optionally absent) actual value.
//! [`evaluate_assertions`] runs a check's assertions in document order and
//! combines them with AND/OR.

use regex::Regex;
use serde_json::Value;

use crate::accessor::{AccessError, FieldPath};
use crate::schema::{FieldAssertion, Logic, Operator};

/// Evaluation failure for a single assertion. Scoped to one (check, resource).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("'{op}' needs numeric operands, got {actual} and {expected}")]
    NotNumeric {
        op: Operator,
        actual: String,
        expected: String,
    },

    #[error("'{op}' is not supported on {kind} values")]
    Unsupported { op: Operator, kind: &'static str },

    #[error("'{op}' expects {wanted} as expected value")]
    InvalidExpected { op: Operator, wanted: &'static str },

    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// Apply `op` to `actual` and `expected`.
///
/// `actual == None` means the field is absent. Existence operators handle
/// that case; every other operator evaluates to `false` on an absent field.
pub fn evaluate(actual: Option<&Value>, op: Operator, expected: Option<&Value>) -> Result<bool, EvalError> {
    let Some(actual) = actual else {
        return Ok(op == Operator::NotExists);
    };
    let expected = expected.unwrap_or(&Value::Null);

    match op {
        Operator::Equals => Ok(values_equal(actual, expected)),
        Operator::NotEquals => Ok(!values_equal(actual, expected)),
        Operator::Contains => contains(op, actual, expected),
        Operator::NotContains => contains(op, actual, expected).map(|hit| !hit),
        Operator::Gt => compare(op, actual, expected, |a, e| a > e),
        Operator::Gte => compare(op, actual, expected, |a, e| a >= e),
        Operator::Lt => compare(op, actual, expected, |a, e| a < e),
        Operator::Lte => compare(op, actual, expected, |a, e| a <= e),
        Operator::In => membership(op, actual, expected),
        Operator::NotIn => membership(op, actual, expected).map(|hit| !hit),
        Operator::Regex => matches_regex(actual, expected),
        Operator::Exists => Ok(!actual.is_null()),
        Operator::NotExists => Ok(actual.is_null()),
    }
}

/// Combined outcome of a check's assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionOutcome {
    pub passed: bool,
    /// Index of the first assertion that evaluated to `false`.
    pub first_failure: Option<usize>,
}

/// An assertion that could not be evaluated, with its position.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("condition {index} ({var} {op}): {source}")]
pub struct AssertionError {
    pub index: usize,
    pub var: String,
    pub op: Operator,
    #[source]
    pub source: EvalError,
}

/// Evaluate every assertion against `root` in document order and combine.
///
/// All assertions are evaluated; the first one that errors makes the whole
/// combination an error regardless of `logic`.
pub fn evaluate_assertions(
    assertions: &[FieldAssertion],
    logic: Logic,
    root: &Value,
) -> Result<AssertionOutcome, AssertionError> {
    let mut results = Vec::with_capacity(assertions.len());
    let mut first_error = None;

    for (index, assertion) in assertions.iter().enumerate() {
        match evaluate_assertion(assertion, root) {
            Ok(hit) => results.push(hit),
            Err(source) => {
                if first_error.is_none() {
                    first_error = Some(AssertionError {
                        index,
                        var: assertion.var.clone(),
                        op: assertion.op,
                        source,
                    });
                }
                results.push(false);
            }
        }
    }

    if let Some(err) = first_error {
        return Err(err);
    }

    let passed = match logic {
        Logic::And => results.iter().all(|r| *r),
        Logic::Or => results.iter().any(|r| *r),
    };
    let first_failure = results.iter().position(|r| !*r);

    Ok(AssertionOutcome {
        passed,
        first_failure,
    })
}

/// Resolve the assertion's field against `root` and evaluate it.
pub fn evaluate_assertion(assertion: &FieldAssertion, root: &Value) -> Result<bool, EvalError> {
    let path = FieldPath::parse(&assertion.var).map_err(AccessError::from)?;
    let actual = path.resolve(root)?;
    evaluate(actual.as_ref(), assertion.op, assertion.value.as_ref())
}

// ── Operator helpers ────────────────────────────────────────────────

/// JSON equality, plus numeric equivalence (`1 == 1.0`, `"3" == 3`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        _ => false,
    }
}

/// Finite numeric value of a number or numeric string. `NaN` and the
/// infinities are not numbers here.
pub(crate) fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite())
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn contains(op: Operator, actual: &Value, expected: &Value) -> Result<bool, EvalError> {
    match actual {
        Value::String(haystack) => {
            let needle = scalar_text(expected).ok_or(EvalError::InvalidExpected {
                op,
                wanted: "a scalar",
            })?;
            Ok(haystack.contains(&needle))
        }
        Value::Array(items) => Ok(items.iter().any(|item| values_equal(item, expected))),
        Value::Object(map) => match expected {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Err(EvalError::InvalidExpected {
                op,
                wanted: "a string key",
            }),
        },
        other => Err(EvalError::Unsupported {
            op,
            kind: kind_of(other),
        }),
    }
}

fn compare(
    op: Operator,
    actual: &Value,
    expected: &Value,
    holds: impl Fn(f64, f64) -> bool,
) -> Result<bool, EvalError> {
    let (Some(a), Some(e)) = (as_number(actual), as_number(expected)) else {
        return Err(EvalError::NotNumeric {
            op,
            actual: actual.to_string(),
            expected: expected.to_string(),
        });
    };
    Ok(holds(a, e))
}

fn membership(op: Operator, actual: &Value, expected: &Value) -> Result<bool, EvalError> {
    let Value::Array(candidates) = expected else {
        return Err(EvalError::InvalidExpected {
            op,
            wanted: "a list",
        });
    };
    Ok(candidates.iter().any(|c| values_equal(actual, c)))
}

fn matches_regex(actual: &Value, expected: &Value) -> Result<bool, EvalError> {
    let Value::String(pattern) = expected else {
        return Err(EvalError::InvalidExpected {
            op: Operator::Regex,
            wanted: "a pattern string",
        });
    };
    let re = Regex::new(pattern).map_err(|e| EvalError::InvalidRegex {
        pattern: pattern.clone(),
        reason: e.to_string(),
    })?;
    match scalar_text(actual) {
        Some(text) => Ok(re.is_match(&text)),
        None => Err(EvalError::Unsupported {
            op: Operator::Regex,
            kind: kind_of(actual),
        }),
    }
}
