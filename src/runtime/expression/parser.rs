/// Tokenizer and recursive-descent parser
///
/// Precedence, loosest first: `|| or`, `&& and`, equality, ordering and
/// `contains`, `+ -`, `* / %`, prefix `! not -`.

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::{ExpressionError, MAX_EXPRESSION_LEN, MAX_NESTING_DEPTH};
use serde_json::{Number, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Str(s) => format!("\"{}\"", s),
            Token::Ident(name) => name.clone(),
            Token::Op(op) => op.to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
        }
    }
}

/// Longest operators first so `===` is never read as `==` followed by `=`
const OPERATORS: [&str; 16] = [
    "===", "!==", "==", "!=", ">=", "<=", "&&", "||", ">", "<", "!", "+", "-", "*", "/", "%",
];

/// Parse an expression string into an AST
pub fn parse(source: &str) -> Result<Expr, ExpressionError> {
    if source.len() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::TooLong);
    }
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }

    let mut parser = Parser {
        tokens,
        position: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExpressionError::UnexpectedToken(token.describe())),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut index = 0;

    while let Some(ch) = source[index..].chars().next() {
        if ch.is_whitespace() {
            index += ch.len_utf8();
            continue;
        }

        if ch == '(' || ch == ')' {
            tokens.push(if ch == '(' { Token::LParen } else { Token::RParen });
            index += 1;
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (text, consumed) = read_string(&source[index..], ch)
                .ok_or(ExpressionError::UnterminatedString(index))?;
            tokens.push(Token::Str(text));
            index += consumed;
            continue;
        }

        if ch.is_ascii_digit() {
            let end = source[index..]
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .map(|offset| index + offset)
                .unwrap_or(source.len());
            let literal = &source[index..end];
            let number = literal
                .parse::<f64>()
                .map_err(|_| ExpressionError::UnexpectedToken(literal.to_string()))?;
            tokens.push(Token::Number(number));
            index = end;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' || ch == '$' {
            let end = source[index..]
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$' || c == '.'))
                .map(|offset| index + offset)
                .unwrap_or(source.len());
            let word = &source[index..end];
            tokens.push(match word {
                "and" => Token::Op("&&"),
                "or" => Token::Op("||"),
                "not" => Token::Op("!"),
                "contains" => Token::Op("contains"),
                _ => Token::Ident(word.to_string()),
            });
            index = end;
            continue;
        }

        match OPERATORS.iter().find(|op| source[index..].starts_with(**op)) {
            Some(op) => {
                tokens.push(Token::Op(*op));
                index += op.len();
            }
            None => {
                return Err(ExpressionError::UnexpectedChar {
                    ch,
                    position: index,
                })
            }
        }
    }

    Ok(tokens)
}

/// Read a quoted literal, returning its unescaped text and byte length including quotes
fn read_string(input: &str, quote: char) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut chars = input.char_indices().skip(1);

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '\\' => {
                let (_, escaped) = chars.next()?;
                text.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
            }
            c if c == quote => return Some((text, offset + c.len_utf8())),
            c => text.push(c),
        }
    }
    None
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    /// Consume the next token if it is one of the given operators
    fn take_op(&mut self, candidates: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if candidates.contains(op) => {
                let op = *op;
                self.position += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.take_op(&["||"]).is_some() {
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_equality()?;
        while self.take_op(&["&&"]).is_some() {
            let right = self.parse_equality()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while let Some(op) = self.take_op(&["==", "===", "!=", "!=="]) {
            let op = BinaryOp::comparison(op).ok_or(ExpressionError::UnexpectedEnd)?;
            let right = self.parse_comparison()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.take_op(&[">", ">=", "<", "<=", "contains"]) {
            let op = if op == "contains" {
                BinaryOp::Contains
            } else {
                BinaryOp::comparison(op).ok_or(ExpressionError::UnexpectedEnd)?
            };
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.take_op(&["+", "-"]) {
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.take_op(&["*", "/", "%"]) {
            let op = match op {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if let Some(op) = self.take_op(&["!", "-"]) {
            self.enter()?;
            let operand = self.parse_unary()?;
            self.depth -= 1;
            let op = if op == "!" { UnaryOp::Not } else { UnaryOp::Neg };
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(
                Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            )),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Variable(name),
            }),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.parse_or()?;
                self.depth -= 1;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(ExpressionError::UnexpectedToken(other.describe())),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Some(other) => Err(ExpressionError::UnexpectedToken(other.describe())),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ExpressionError::TooDeep);
        }
        Ok(())
    }
}
