/// Abstract syntax tree for conditional expressions

use serde_json::Value;
use std::fmt;

/// An expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, string, boolean or null literal
    Literal(Value),
    /// Read-only context lookup by dotted path
    Variable(String),
    /// Prefix operator
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Infix operator
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!` / `not`
    Not,
    /// `-`
    Neg,
}

/// Infix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// `==`, coercing
    Eq,
    /// `===`
    StrictEq,
    /// `!=`, coercing
    NotEq,
    /// `!==`
    StrictNotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// substring, array element or object key
    Contains,
    And,
    Or,
}

impl BinaryOp {
    /// Parse one of the comparison operators used by structured conditionals
    pub fn comparison(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "==" => Some(BinaryOp::Eq),
            "===" => Some(BinaryOp::StrictEq),
            "!=" => Some(BinaryOp::NotEq),
            "!==" => Some(BinaryOp::StrictNotEq),
            ">" => Some(BinaryOp::Gt),
            ">=" => Some(BinaryOp::Gte),
            "<" => Some(BinaryOp::Lt),
            "<=" => Some(BinaryOp::Lte),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::StrictEq => "===",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Contains => "contains",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        f.write_str(symbol)
    }
}
