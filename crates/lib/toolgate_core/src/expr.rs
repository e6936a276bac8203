// @awa-component: QRY-Expression
//
//! Computed filter values.
//!
//! A parameter may carry an `expr` instead of a static `value`, e.g.
//! `now() - days(30)`. Expressions are parsed once, when the catalog is
//! loaded, into a small AST and evaluated once per call against an
//! [`EvalContext`] holding the call's clock. The language is closed: it has
//! literals, a fixed set of pure date/time functions, `+`/`-`, unary minus
//! and comparisons. Nothing in it can reach the host process.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeDelta, Utc};
use thiserror::Error;

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("parse error at {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("type error: cannot apply {op} to {detail}")]
    Type { op: &'static str, detail: String },

    #[error("invalid date/time: {0}")]
    InvalidDateTime(String),

    #[error("arithmetic overflow")]
    Overflow,
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Now,
    Today,
    Weeks,
    Days,
    Hours,
    Minutes,
    Seconds,
    Date,
    Timestamp,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "now" => Self::Now,
            "today" => Self::Today,
            "weeks" => Self::Weeks,
            "days" => Self::Days,
            "hours" => Self::Hours,
            "minutes" => Self::Minutes,
            "seconds" => Self::Seconds,
            "date" => Self::Date,
            "timestamp" => Self::Timestamp,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        match self {
            Self::Now => "now",
            Self::Today => "today",
            Self::Weeks => "weeks",
            Self::Days => "days",
            Self::Hours => "hours",
            Self::Minutes => "minutes",
            Self::Seconds => "seconds",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
        }
    }

    fn arity(self) -> usize {
        match self {
            Self::Now | Self::Today => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Call(Function, Vec<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Evaluated expression value.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Duration(TimeDelta),
}

impl ExprValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
            Self::Duration(_) => "duration",
        }
    }

    /// Render the value the way it is sent to the store.
    ///
    /// Timestamps become RFC 3339 strings with millisecond precision, dates
    /// `YYYY-MM-DD`, durations a number of seconds.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(b),
            Self::Number(n) => number_to_json(n),
            Self::String(s) => serde_json::Value::String(s),
            Self::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Duration(d) => number_to_json(d.num_milliseconds() as f64 / 1000.0),
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Inputs an expression may observe. Only the clock, for now.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext {
    pub now: DateTime<Utc>,
}

impl EvalContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    pub fn current() -> Self {
        Self { now: Utc::now() }
    }
}

/// A parsed expression together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let root = Parser::new(source)?.parse()?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> Result<ExprValue, ExprError> {
        eval(&self.root, ctx)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// =============================================================================
// Lexer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Op(BinaryOp),
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => tokens.push((start, Token::LParen)),
            ')' => tokens.push((start, Token::RParen)),
            ',' => tokens.push((start, Token::Comma)),
            '+' => tokens.push((start, Token::Plus)),
            '-' => tokens.push((start, Token::Minus)),
            '=' | '!' | '<' | '>' => {
                let next_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, next_eq) {
                    ('=', true) => BinaryOp::Eq,
                    ('!', true) => BinaryOp::Ne,
                    ('<', true) => BinaryOp::Le,
                    ('>', true) => BinaryOp::Ge,
                    ('<', false) => BinaryOp::Lt,
                    ('>', false) => BinaryOp::Gt,
                    _ => {
                        return Err(ExprError::Parse {
                            position: start,
                            message: format!("unexpected character '{c}'"),
                        });
                    }
                };
                if next_eq {
                    i += 1;
                }
                tokens.push((start, Token::Op(op)));
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(ExprError::Parse {
                                position: start,
                                message: "unterminated string".to_string(),
                            });
                        }
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some(escaped) => value.push(*escaped),
                                None => {
                                    return Err(ExprError::Parse {
                                        position: i,
                                        message: "dangling escape".to_string(),
                                    });
                                }
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => break,
                        Some(ch) => {
                            value.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((start, Token::String(value)));
            }
            c if c.is_ascii_digit() || c == '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = text.parse::<f64>().map_err(|_| ExprError::Parse {
                    position: start,
                    message: format!("invalid number '{text}'"),
                })?;
                tokens.push((start, Token::Number(number)));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((start, Token::Ident(chars[start..i].iter().collect())));
                continue;
            }
            other => {
                return Err(ExprError::Parse {
                    position: start,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
        i += 1;
    }

    Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Self, ExprError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            end: source.len(),
        })
    }

    fn parse(mut self) -> Result<Expr, ExprError> {
        if self.tokens.is_empty() {
            return Err(ExprError::Parse {
                position: 0,
                message: "empty expression".to_string(),
            });
        }
        let expr = self.comparison()?;
        if let Some((position, token)) = self.tokens.get(self.pos) {
            return Err(ExprError::Parse {
                position: *position,
                message: format!("unexpected token {token:?}"),
            });
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        let position = self.position();
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(ExprError::Parse {
                position,
                message: format!("expected {expected:?}, found {token:?}"),
            }),
            None => Err(ExprError::Parse {
                position,
                message: format!("expected {expected:?}, found end of input"),
            }),
        }
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.additive()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.additive()?;
            return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let position = self.position();
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::String(s)) => Ok(Expr::String(s)),
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                _ => self.call(name, position),
            },
            Some(token) => Err(ExprError::Parse {
                position,
                message: format!("unexpected token {token:?}"),
            }),
            None => Err(ExprError::Parse {
                position,
                message: "unexpected end of input".to_string(),
            }),
        }
    }

    fn call(&mut self, name: String, position: usize) -> Result<Expr, ExprError> {
        let function = Function::lookup(&name).ok_or(ExprError::UnknownFunction(name))?;
        if self.peek() != Some(&Token::LParen) {
            return Err(ExprError::Parse {
                position,
                message: format!("{}() must be called", function.name()),
            });
        }
        self.pos += 1;

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.comparison()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        if args.len() != function.arity() {
            return Err(ExprError::Arity {
                function: function.name(),
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call(function, args))
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn eval(expr: &Expr, ctx: &EvalContext) -> Result<ExprValue, ExprError> {
    match expr {
        Expr::Null => Ok(ExprValue::Null),
        Expr::Bool(b) => Ok(ExprValue::Bool(*b)),
        Expr::Number(n) => Ok(ExprValue::Number(*n)),
        Expr::String(s) => Ok(ExprValue::String(s.clone())),
        Expr::Neg(inner) => match eval(inner, ctx)? {
            ExprValue::Number(n) => Ok(ExprValue::Number(-n)),
            ExprValue::Duration(d) => Ok(ExprValue::Duration(-d)),
            other => Err(ExprError::Type {
                op: "unary -",
                detail: other.kind().to_string(),
            }),
        },
        Expr::Call(function, args) => {
            let args = args
                .iter()
                .map(|a| eval(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            call(*function, args, ctx)
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, eval(lhs, ctx)?, eval(rhs, ctx)?),
    }
}

fn call(function: Function, args: Vec<ExprValue>, ctx: &EvalContext) -> Result<ExprValue, ExprError> {
    let mut args = args.into_iter();
    match function {
        Function::Now => Ok(ExprValue::Timestamp(ctx.now)),
        Function::Today => Ok(ExprValue::Date(ctx.now.date_naive())),
        Function::Weeks => duration(function, args.next(), 7.0 * 86_400_000.0),
        Function::Days => duration(function, args.next(), 86_400_000.0),
        Function::Hours => duration(function, args.next(), 3_600_000.0),
        Function::Minutes => duration(function, args.next(), 60_000.0),
        Function::Seconds => duration(function, args.next(), 1_000.0),
        Function::Date => match args.next() {
            Some(ExprValue::Timestamp(ts)) => Ok(ExprValue::Date(ts.date_naive())),
            Some(ExprValue::Date(d)) => Ok(ExprValue::Date(d)),
            Some(ExprValue::String(s)) => parse_date(&s).map(ExprValue::Date),
            other => Err(type_error("date()", other)),
        },
        Function::Timestamp => match args.next() {
            Some(ExprValue::Timestamp(ts)) => Ok(ExprValue::Timestamp(ts)),
            Some(ExprValue::Date(d)) => Ok(ExprValue::Timestamp(midnight(d)?)),
            Some(ExprValue::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|ts| ExprValue::Timestamp(ts.with_timezone(&Utc)))
                .or_else(|_| parse_date(&s).and_then(|d| midnight(d).map(ExprValue::Timestamp))),
            other => Err(type_error("timestamp()", other)),
        },
    }
}

fn duration(function: Function, arg: Option<ExprValue>, unit_ms: f64) -> Result<ExprValue, ExprError> {
    match arg {
        Some(ExprValue::Number(n)) => {
            let ms = n * unit_ms;
            if !ms.is_finite() || ms.abs() >= i64::MAX as f64 {
                return Err(ExprError::Overflow);
            }
            TimeDelta::try_milliseconds(ms.round() as i64)
                .map(ExprValue::Duration)
                .ok_or(ExprError::Overflow)
        }
        other => Err(type_error(function.name(), other)),
    }
}

fn type_error(op: &'static str, value: Option<ExprValue>) -> ExprError {
    ExprError::Type {
        op,
        detail: value.map(|v| v.kind()).unwrap_or("nothing").to_string(),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, ExprError> {
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc).date_naive())
        .map_err(|_| ExprError::InvalidDateTime(s.to_string()))
}

fn midnight(d: NaiveDate) -> Result<DateTime<Utc>, ExprError> {
    d.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ExprError::InvalidDateTime(d.to_string()))
}

fn binary(op: BinaryOp, lhs: ExprValue, rhs: ExprValue) -> Result<ExprValue, ExprError> {
    use ExprValue as V;

    let mismatch = |lhs: &V, rhs: &V| ExprError::Type {
        op: op.symbol(),
        detail: format!("{} and {}", lhs.kind(), rhs.kind()),
    };

    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (V::Number(a), V::Number(b)) => Ok(V::Number(a + b)),
            (V::String(a), V::String(b)) => Ok(V::String(a + &b)),
            (V::Timestamp(t), V::Duration(d)) | (V::Duration(d), V::Timestamp(t)) => t
                .checked_add_signed(d)
                .map(V::Timestamp)
                .ok_or(ExprError::Overflow),
            (V::Date(t), V::Duration(d)) | (V::Duration(d), V::Date(t)) => t
                .checked_add_signed(d)
                .map(V::Date)
                .ok_or(ExprError::Overflow),
            (V::Duration(a), V::Duration(b)) => {
                a.checked_add(&b).map(V::Duration).ok_or(ExprError::Overflow)
            }
            (a, b) => Err(mismatch(&a, &b)),
        },
        BinaryOp::Sub => match (lhs, rhs) {
            (V::Number(a), V::Number(b)) => Ok(V::Number(a - b)),
            (V::Timestamp(t), V::Duration(d)) => t
                .checked_sub_signed(d)
                .map(V::Timestamp)
                .ok_or(ExprError::Overflow),
            (V::Date(t), V::Duration(d)) => t
                .checked_sub_signed(d)
                .map(V::Date)
                .ok_or(ExprError::Overflow),
            (V::Timestamp(a), V::Timestamp(b)) => Ok(V::Duration(a.signed_duration_since(b))),
            (V::Date(a), V::Date(b)) => Ok(V::Duration(a.signed_duration_since(b))),
            (V::Duration(a), V::Duration(b)) => {
                a.checked_sub(&b).map(V::Duration).ok_or(ExprError::Overflow)
            }
            (a, b) => Err(mismatch(&a, &b)),
        },
        BinaryOp::Eq => Ok(V::Bool(lhs == rhs)),
        BinaryOp::Ne => Ok(V::Bool(lhs != rhs)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (&lhs, &rhs) {
                (V::Number(a), V::Number(b)) => a.partial_cmp(b),
                (V::String(a), V::String(b)) => Some(a.cmp(b)),
                (V::Timestamp(a), V::Timestamp(b)) => Some(a.cmp(b)),
                (V::Date(a), V::Date(b)) => Some(a.cmp(b)),
                (V::Duration(a), V::Duration(b)) => Some(a.cmp(b)),
                _ => return Err(mismatch(&lhs, &rhs)),
            };
            let Some(ordering) = ordering else {
                return Ok(V::Bool(false));
            };
            Ok(V::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
    }
}
