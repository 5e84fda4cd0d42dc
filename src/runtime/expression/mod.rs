/// Sandboxed expression interpreter for conditional nodes
///
/// A tokenizer, a recursive-descent parser and an AST-walking evaluator. The
/// language only has literals, read-only context lookups, arithmetic,
/// comparison and boolean logic:
/// - `score > 0.8`
/// - `intent == 'search' && !(retries >= 3)`
/// - `status === "done" or topic contains "rust"`
///
/// There are no calls, assignments or I/O, so untrusted workflow authors cannot
/// reach anything outside the values they are given.

pub mod ast;
pub mod evaluator;
pub mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use evaluator::{compare, evaluate, is_truthy, ExpressionScope};
pub use parser::parse;

use serde_json::Value;
use thiserror::Error;

/// Longest expression source accepted by the parser
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Deepest nesting accepted by the parser
pub const MAX_NESTING_DEPTH: usize = 64;

/// Errors raised while parsing or evaluating an expression
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("Expression is empty")]
    Empty,

    #[error("Expression exceeds {MAX_EXPRESSION_LEN} characters")]
    TooLong,

    #[error("Expression nesting exceeds {MAX_NESTING_DEPTH} levels")]
    TooDeep,

    #[error("Unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("Unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type error: {0}")]
    Type(String),
}

/// Source text for a value spliced into an expression
///
/// Strings become double-quoted literals with `\\`, `"`, newlines and tabs
/// escaped. Other scalars keep their JSON form, floats in plain decimal. Objects and arrays have no literal
/// syntax and are spliced as a quoted JSON string.
pub fn literal(value: &Value) -> String {
    match value {
        Value::String(text) => quote(text),
        Value::Object(_) | Value::Array(_) => quote(&value.to_string()),
        // Display never uses exponent notation, which the tokenizer rejects
        Value::Number(number) if number.is_f64() => match number.as_f64() {
            Some(float) => float.to_string(),
            None => number.to_string(),
        },
        scalar => scalar.to_string(),
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

/// Parse and evaluate an expression, returning its truthiness
pub fn evaluate_condition(
    source: &str,
    scope: &dyn ExpressionScope,
) -> Result<bool, ExpressionError> {
    let expr = parse(source)?;
    Ok(is_truthy(&evaluate(&expr, scope)?))
}
