/// AST-walking evaluator
///
/// Identifiers are read-only lookups through an `ExpressionScope`; a missing
/// variable evaluates to `null`. `==`/`!=` coerce numeric strings and booleans,
/// `===`/`!==` compare type and value. Ordering is numeric when both sides
/// coerce to numbers and lexicographic on their text otherwise.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::ExpressionError;
use crate::runtime::context::ExecutionContext;
use crate::runtime::template::value_to_text;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// Read-only variable source for identifiers
pub trait ExpressionScope {
    fn lookup(&self, path: &str) -> Option<Value>;
}

impl ExpressionScope for ExecutionContext {
    fn lookup(&self, path: &str) -> Option<Value> {
        self.get_path(path).cloned()
    }
}

/// Evaluate an expression to a JSON value
pub fn evaluate(expr: &Expr, scope: &dyn ExpressionScope) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Variable(path) => Ok(scope.lookup(path).unwrap_or(Value::Null)),
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                UnaryOp::Neg => {
                    let n = to_number(&value).ok_or_else(|| {
                        ExpressionError::Type(format!("cannot negate {}", value))
                    })?;
                    Ok(number_value(-n))
                }
            }
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let left = evaluate(left, scope)?;
                if !is_truthy(&left) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(is_truthy(&evaluate(right, scope)?)))
            }
            BinaryOp::Or => {
                let left = evaluate(left, scope)?;
                if is_truthy(&left) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(is_truthy(&evaluate(right, scope)?)))
            }
            _ => {
                let left = evaluate(left, scope)?;
                let right = evaluate(right, scope)?;
                apply_binary(*op, &left, &right)
            }
        },
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Add => {
            if left.is_string() || right.is_string() {
                return Ok(Value::String(format!(
                    "{}{}",
                    value_to_text(left),
                    value_to_text(right)
                )));
            }
            arithmetic(op, left, right, |a, b| Ok(a + b))
        }
        BinaryOp::Sub => arithmetic(op, left, right, |a, b| Ok(a - b)),
        BinaryOp::Mul => arithmetic(op, left, right, |a, b| Ok(a * b)),
        BinaryOp::Div => arithmetic(op, left, right, |a, b| {
            if b == 0.0 {
                Err(ExpressionError::DivisionByZero)
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Rem => arithmetic(op, left, right, |a, b| {
            if b == 0.0 {
                Err(ExpressionError::DivisionByZero)
            } else {
                Ok(a % b)
            }
        }),
        BinaryOp::Contains => Ok(Value::Bool(contains(left, right))),
        comparison => Ok(Value::Bool(compare(comparison, left, right))),
    }
}

fn arithmetic<F>(op: BinaryOp, left: &Value, right: &Value, apply: F) -> Result<Value, ExpressionError>
where
    F: Fn(f64, f64) -> Result<f64, ExpressionError>,
{
    match (to_number(left), to_number(right)) {
        (Some(a), Some(b)) => Ok(number_value(apply(a, b)?)),
        _ => Err(ExpressionError::Type(format!(
            "cannot apply '{}' to {} and {}",
            op, left, right
        ))),
    }
}

/// Apply a comparison operator to two values
///
/// Non-comparison operators compare as `false`.
pub fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::Eq => loose_equals(left, right),
        BinaryOp::NotEq => !loose_equals(left, right),
        BinaryOp::StrictEq => strict_equals(left, right),
        BinaryOp::StrictNotEq => !strict_equals(left, right),
        BinaryOp::Gt => ordering(left, right) == Some(Ordering::Greater),
        BinaryOp::Gte => matches!(ordering(left, right), Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::Lt => ordering(left, right) == Some(Ordering::Less),
        BinaryOp::Lte => matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal)),
        _ => false,
    }
}

/// Truthiness: null, false, 0, NaN and "" are falsy
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Integral results stay integers so `2 + 3` renders as `5`
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Number(_), _) | (_, Value::Number(_)) | (Value::Bool(_), _) | (_, Value::Bool(_)) => {
            match (to_number(left), to_number(right)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => left == right,
    }
}

fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (to_number(left), to_number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(value_to_text(left).cmp(&value_to_text(right))),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.contains(&value_to_text(needle)),
        Value::Array(items) => items.iter().any(|item| loose_equals(item, needle)),
        Value::Object(map) => map.contains_key(&value_to_text(needle)),
        _ => false,
    }
}
