//! Expression resolver for condition and loop nodes.
//!
//! Expressions are deliberately small: a dot path on the left, one comparison
//! operator, and a literal on the right (`fetch.meta.count >= 3`,
//! `user.role == "admin"`). A bare path evaluates to its truthiness. There is
//! no scripting, no arithmetic, no boolean combinators.

use serde_json::Value;

use crate::context::ResultContext;
use crate::error::NodeError;

/// Comparison operators, longest spelling first so that `>=` is never split
/// into `>` + `=` during parsing.
const OPERATORS: [&str; 7] = ["==", "!=", ">=", "<=", ">", "<", " contains "];

/// Evaluate a boolean expression against the context.
pub fn evaluate(expression: &str, ctx: &ResultContext) -> Result<bool, NodeError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(NodeError::ExpressionError("empty expression".to_string()));
    }

    for op in OPERATORS {
        if let Some(pos) = expression.find(op) {
            let lhs = expression[..pos].trim();
            let rhs = expression[pos + op.len()..].trim();
            if lhs.is_empty() || rhs.is_empty() {
                return Err(NodeError::ExpressionError(format!(
                    "malformed expression: '{}'",
                    expression
                )));
            }
            let actual = ctx.resolve(lhs)?;
            let expected = parse_literal(rhs);
            return compare(op.trim(), &actual, &expected, expression);
        }
    }

    // No operator: truthiness of the path itself.
    Ok(truthy(&ctx.resolve(expression)?))
}

/// Truthiness in the JavaScript-ish sense the portal's definitions expect:
/// null/false/0/""/[]/{} are false, everything else true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn parse_literal(raw: &str) -> Value {
    // JSON literals (numbers, quoted strings, true/false/null, arrays) parse
    // directly; anything else is a bare-word string.
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn compare(op: &str, actual: &Value, expected: &Value, expression: &str) -> Result<bool, NodeError> {
    match op {
        "==" => Ok(loose_eq(actual, expected)),
        "!=" => Ok(!loose_eq(actual, expected)),
        "contains" => Ok(eval_contains(actual, expected)),
        ">" | "<" | ">=" | "<=" => {
            let (a, b) = match (as_f64(actual), as_f64(expected)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(NodeError::ExpressionError(format!(
                        "non-numeric operands for '{}' in '{}'",
                        op, expression
                    )))
                }
            };
            Ok(match op {
                ">" => a > b,
                "<" => a < b,
                ">=" => a >= b,
                _ => a <= b,
            })
        }
        other => Err(NodeError::ExpressionError(format!(
            "unsupported operator: '{}'",
            other
        ))),
    }
}

/// Equality with numeric coercion: `3 == 3.0` and `"3" == 3` both hold, the
/// way the portal's stored definitions assume.
fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_f64(actual), as_f64(expected)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => false,
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn eval_contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => match expected {
            Value::String(e) => s.contains(e.as_str()),
            other => s.contains(&other.to_string()),
        },
        Value::Array(items) => items.iter().any(|item| loose_eq(item, expected)),
        _ => false,
    }
}
