//! Whitelisted arithmetic formulas.
//!
//! Item bonus fields may carry a small formula such as `tick * 2 + 1`.
//! Only integers, `+ - * / ( )` and a single named variable are accepted;
//! anything else is a parse error. Nothing is ever executed as code.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Deepest nesting of parentheses and unary minus accepted.
pub const MAX_DEPTH: usize = 64;
/// Most tokens a formula may contain.
pub const MAX_TOKENS: usize = 256;

/// Error type for formula parsing and evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, usize),
    #[error("Unknown variable '{found}' (only '{expected}' is allowed)")]
    UnknownVariable { found: String, expected: String },
    #[error("Unexpected end of formula")]
    UnexpectedEnd,
    #[error("Unexpected token {0}")]
    UnexpectedToken(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Arithmetic overflow")]
    Overflow,
    #[error("Formula nests deeper than 64 levels")]
    TooDeep,
    #[error("Formula has more than 256 tokens")]
    TooLong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Num(i64),
    Var,
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(n) => write!(f, "{n}"),
            Token::Var => write!(f, "variable"),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Num(i64),
    Var,
    Neg(Box<Expr>),
    Binary(Op, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

/// A parsed formula over one named variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FormulaSpec", into = "FormulaSpec")]
pub struct Formula {
    source: String,
    variable: String,
    expr: Expr,
}

/// Serialized form of a [`Formula`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaSpec {
    pub source: String,
    pub variable: String,
}

impl TryFrom<FormulaSpec> for Formula {
    type Error = FormulaError;

    fn try_from(raw: FormulaSpec) -> Result<Self, Self::Error> {
        Formula::parse(&raw.source, &raw.variable)
    }
}

impl From<Formula> for FormulaSpec {
    fn from(formula: Formula) -> Self {
        FormulaSpec {
            source: formula.source,
            variable: formula.variable,
        }
    }
}

impl Formula {
    /// Parse `source`, allowing `variable` as the only identifier.
    pub fn parse(source: &str, variable: &str) -> Result<Self, FormulaError> {
        let tokens = tokenize(source, variable)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(FormulaError::UnexpectedToken(token.to_string()));
        }
        Ok(Formula {
            source: source.to_string(),
            variable: variable.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Evaluate with the variable bound to `value`. Division truncates.
    pub fn evaluate(&self, value: i64) -> Result<i64, FormulaError> {
        eval(&self.expr, value)
    }
}

fn eval(expr: &Expr, value: i64) -> Result<i64, FormulaError> {
    match expr {
        Expr::Num(n) => Ok(*n),
        Expr::Var => Ok(value),
        Expr::Neg(inner) => eval(inner, value)?
            .checked_neg()
            .ok_or(FormulaError::Overflow),
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, value)?;
            let b = eval(rhs, value)?;
            match op {
                Op::Add => a.checked_add(b).ok_or(FormulaError::Overflow),
                Op::Sub => a.checked_sub(b).ok_or(FormulaError::Overflow),
                Op::Mul => a.checked_mul(b).ok_or(FormulaError::Overflow),
                Op::Div => {
                    if b == 0 {
                        Err(FormulaError::DivisionByZero)
                    } else {
                        a.checked_div(b).ok_or(FormulaError::Overflow)
                    }
                }
            }
        }
    }
}

fn tokenize(source: &str, variable: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            ' ' | '\t' => {
                i += 1;
            }
            '+' | '-' | '*' | '/' | '(' | ')' => {
                tokens.push(match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[start..i].iter().collect();
                let n = digits.parse().map_err(|_| FormulaError::Overflow)?;
                tokens.push(Token::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if ident != variable {
                    return Err(FormulaError::UnknownVariable {
                        found: ident,
                        expected: variable.to_string(),
                    });
                }
                tokens.push(Token::Var);
            }
            other => return Err(FormulaError::UnexpectedChar(other, i)),
        }
        if tokens.len() > MAX_TOKENS {
            return Err(FormulaError::TooLong);
        }
    }

    Ok(tokens)
}

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
        self.pos += 1;
        token
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Op::Add,
                Some(Token::Minus) => Op::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Op::Mul,
                Some(Token::Slash) => Op::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // factor := number | variable | '-' factor | '(' expression ')'
    fn factor(&mut self) -> Result<Expr, FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        let factor = self.factor_inner();
        self.depth -= 1;
        factor
    }

    fn factor_inner(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Var) => Ok(Expr::Var),
            Some(Token::Minus) => Ok(Expr::Neg(Box::new(self.factor()?))),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(FormulaError::UnexpectedToken(other.to_string())),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            Some(other) => Err(FormulaError::UnexpectedToken(other.to_string())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}
