//! Restricted condition expressions for `condition` steps and `while` guards.
//!
//! # Responsibility
//! - Substitute bound `$name` references with literal text.
//! - Parse and evaluate the resulting boolean/comparison expression.
//!
//! # Invariants
//! - The grammar has literals, comparisons, and boolean operators only. There
//!   are no identifiers, calls, or arithmetic.
//! - [`evaluate_condition`] never fails: errors are logged and read as false.
//! - Nesting of `(`, `[` and `not` is capped at [`MAX_NESTING`].
//! - A mapping variable is substituted as the list of its keys, so
//!   `'key' in $mapping` tests membership and an empty mapping is falsy.
//!
//! ```text
//! or         := and (("or" | "||") and)*
//! and        := not (("and" | "&&") not)*
//! not        := ("not" | "!") not | comparison
//! comparison := primary (op primary)?
//! op         := "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "not" "in"
//! primary    := number | string | bool | null | "[" list "]" | "(" or ")"
//! ```

use crate::workflow::environment::Environment;
use log::warn;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use std::cmp::Ordering;

/// Deepest nesting of groups, lists, and negations a condition may use.
pub const MAX_NESTING: usize = 64;

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid reference regex"));

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("unexpected character `{found}` at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid escape sequence `\\{0}`")]
    InvalidEscape(char),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("unexpected token {0}")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expression nested deeper than {MAX_NESTING} levels")]
    TooDeep,
    #[error("cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

/// Evaluates `condition` against `env`, treating every failure as false.
pub fn evaluate_condition(condition: &str, env: &Environment) -> bool {
    match evaluate(condition, env) {
        Ok(result) => result,
        Err(err) => {
            warn!(
                "event=condition_eval module=workflow status=error condition={} error={err}",
                crate::logging::sanitize_message(condition, 120)
            );
            false
        }
    }
}

/// Strict evaluation. An empty or blank condition is true.
pub fn evaluate(condition: &str, env: &Environment) -> Result<bool, ConditionError> {
    if condition.trim().is_empty() {
        return Ok(true);
    }
    let expression = substitute(condition, env);
    let tokens = tokenize(&expression)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(ConditionError::UnexpectedToken(token.describe()));
    }
    Ok(truthy(&expr.eval()?))
}

/// Replaces each bound `$name` with its literal form. Unbound references are
/// left in place and later fail to tokenize.
pub fn substitute(condition: &str, env: &Environment) -> String {
    REFERENCE_RE
        .replace_all(condition, |caps: &Captures<'_>| match env.get(&caps[1]) {
            Some(value) => literal(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn literal(value: &Value) -> String {
    // JSON text doubles as the expression literal syntax for scalars and lists.
    as_expression_value(value).to_string()
}

fn as_expression_value(value: &Value) -> Value {
    match value {
        Value::Object(entries) => Value::Array(entries.keys().cloned().map(Value::String).collect()),
        Value::Array(items) => Value::Array(items.iter().map(as_expression_value).collect()),
        scalar => scalar.clone(),
    }
}

pub(crate) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(Value),
    Compare(CompareOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Literal(value) => format!("`{value}`"),
            Self::Compare(op) => format!("`{}`", op.symbol()),
            Self::And => "`and`".to_string(),
            Self::Or => "`or`".to_string(),
            Self::Not => "`not`".to_string(),
            Self::In => "`in`".to_string(),
            Self::LParen => "`(`".to_string(),
            Self::RParen => "`)`".to_string(),
            Self::LBracket => "`[`".to_string(),
            Self::RBracket => "`]`".to_string(),
            Self::Comma => "`,`".to_string(),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Eq));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Compare(CompareOp::Ne));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                let inclusive = next == Some('=');
                let op = match (c, inclusive) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                tokens.push(Token::Compare(op));
                i += if inclusive { 2 } else { 1 };
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' | '\'' => {
                let (text, end) = read_string(&chars, i)?;
                tokens.push(Token::Literal(Value::String(text)));
                i = end;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '.' | '+' | '-'))
                {
                    // Only allow a sign directly after an exponent marker.
                    if matches!(chars[i], '+' | '-') && !matches!(chars[i - 1], 'e' | 'E') {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Literal(parse_number(&text)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(keyword(word)?);
            }
            other => {
                return Err(ConditionError::UnexpectedChar {
                    found: other,
                    offset: i,
                })
            }
        }
    }

    Ok(tokens)
}

fn keyword(word: String) -> Result<Token, ConditionError> {
    let token = match word.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "true" | "True" => Token::Literal(Value::Bool(true)),
        "false" | "False" => Token::Literal(Value::Bool(false)),
        "null" | "None" => Token::Literal(Value::Null),
        _ => return Err(ConditionError::UnknownIdentifier(word)),
    };
    Ok(token)
}

fn parse_number(text: &str) -> Result<Value, ConditionError> {
    if let Ok(integer) = text.parse::<i64>() {
        return Ok(Value::from(integer));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| ConditionError::InvalidNumber(text.to_string()))
}

/// Reads a quoted literal starting at `start`; returns the text and the index
/// after the closing quote.
fn read_string(chars: &[char], start: usize) -> Result<(String, usize), ConditionError> {
    let quote = chars[start];
    let mut text = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((text, i + 1)),
            '\\' => {
                let escaped = *chars.get(i + 1).ok_or(ConditionError::UnterminatedString)?;
                i += 2;
                match escaped {
                    '\\' | '"' | '\'' | '/' => text.push(escaped),
                    'n' => text.push('\n'),
                    't' => text.push('\t'),
                    'r' => text.push('\r'),
                    'b' => text.push('\u{8}'),
                    'f' => text.push('\u{c}'),
                    'u' => {
                        let hex: String = chars.get(i..i + 4).unwrap_or_default().iter().collect();
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or(ConditionError::InvalidEscape('u'))?;
                        text.push(decoded);
                        i += 4;
                    }
                    other => return Err(ConditionError::InvalidEscape(other)),
                }
            }
            c => {
                text.push(c);
                i += 1;
            }
        }
    }

    Err(ConditionError::UnterminatedString)
}

#[derive(Debug)]
enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self) -> Result<Value, ConditionError> {
        let value = match self {
            Self::Literal(value) => value.clone(),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(Expr::eval)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Self::Not(inner) => Value::Bool(!truthy(&inner.eval()?)),
            Self::And(operands) => {
                for operand in operands {
                    if !truthy(&operand.eval()?) {
                        return Ok(Value::Bool(false));
                    }
                }
                Value::Bool(true)
            }
            Self::Or(operands) => {
                for operand in operands {
                    if truthy(&operand.eval()?) {
                        return Ok(Value::Bool(true));
                    }
                }
                Value::Bool(false)
            }
            Self::Compare(op, left, right) => {
                Value::Bool(compare(*op, &left.eval()?, &right.eval()?)?)
            }
        };
        Ok(value)
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => left == right,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    let mismatch = || ConditionError::TypeMismatch {
        op: op.symbol(),
        left: type_name(left),
        right: type_name(right),
    };

    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::In | CompareOp::NotIn => {
            let found = match (left, right) {
                (_, Value::Array(items)) => items.iter().any(|item| values_equal(left, item)),
                (Value::String(needle), Value::String(haystack)) => {
                    haystack.contains(needle.as_str())
                }
                _ => return Err(mismatch()),
            };
            Ok(found == (op == CompareOp::In))
        }
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(mismatch)?;
            Ok(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
    }
}

/// Boolean chains are flat operand lists; only groups, lists, and negations
/// recurse, and those are bounded by `depth`.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ConditionError::UnexpectedToken(token.describe())),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ConditionError>,
    ) -> Result<T, ConditionError> {
        if self.depth >= MAX_NESTING {
            return Err(ConditionError::TooDeep);
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut operands = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            operands.push(self.parse_and()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Expr::Or(operands),
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut operands = vec![self.parse_not()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            operands.push(self.parse_not()?);
        }
        Ok(match operands.len() {
            1 => operands.remove(0),
            _ => Expr::And(operands),
        })
    }

    fn parse_not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return self.nested(|parser| Ok(Expr::Not(Box::new(parser.parse_not()?))));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_primary()?;
        let op = match (self.peek(), self.tokens.get(self.pos + 1)) {
            (Some(Token::Compare(op)), _) => {
                let op = *op;
                self.pos += 1;
                op
            }
            (Some(Token::In), _) => {
                self.pos += 1;
                CompareOp::In
            }
            (Some(Token::Not), Some(Token::In)) => {
                self.pos += 2;
                CompareOp::NotIn
            }
            _ => return Ok(left),
        };
        let right = self.parse_primary()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ConditionError> {
        match self.next() {
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::LParen) => self.nested(|parser| {
                let inner = parser.parse_or()?;
                parser.expect(Token::RParen)?;
                Ok(inner)
            }),
            Some(Token::LBracket) => self.nested(Self::parse_list),
            Some(token) => Err(ConditionError::UnexpectedToken(token.describe())),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }

    /// Items after an opening `[`.
    fn parse_list(&mut self) -> Result<Expr, ConditionError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.parse_or()?);
            match self.next() {
                Some(Token::Comma) => {}
                Some(Token::RBracket) => return Ok(Expr::List(items)),
                Some(token) => return Err(ConditionError::UnexpectedToken(token.describe())),
                None => return Err(ConditionError::UnexpectedEnd),
            }
        }
    }
}
