//! Expression boundary
//!
//! The reader and evaluator only see expressions through [`ExpressionEngine`].
//! [`BasicExpressionEngine`] is the default implementation: literals, named
//! values, member/index access, comparison and logical operators, and a small
//! set of built-in functions.

pub mod evaluate;
pub mod lexer;
pub mod parser;
pub mod token;

use evaluate::{builtin_arity, Evaluation};
use lexer::Lexer;
use parser::{parse, Expr};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use token::LexemeKind;
use weft_core::Token;

pub const MAX_EXPRESSION_DEPTH: usize = 50;
pub const MAX_EXPRESSION_LENGTH: usize = 21_000;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpressionError {
    #[error("Unexpected symbol: '{symbol}'. Located at position {position} within expression: {expression}")]
    UnexpectedSymbol {
        symbol: String,
        position: usize,
        expression: String,
    },

    #[error("Unexpected end of expression: {expression}")]
    UnexpectedEnd { expression: String },

    #[error("Unrecognized named-value: '{name}'. Located at position {position} within expression: {expression}")]
    UnrecognizedNamedValue {
        name: String,
        position: usize,
        expression: String,
    },

    #[error("Unrecognized function: '{name}'. Located at position {position} within expression: {expression}")]
    UnrecognizedFunction {
        name: String,
        position: usize,
        expression: String,
    },

    #[error("Too few parameters supplied: '{name}'. Located at position {position} within expression: {expression}")]
    TooFewParameters {
        name: String,
        position: usize,
        expression: String,
    },

    #[error("Too many parameters supplied: '{name}'. Located at position {position} within expression: {expression}")]
    TooManyParameters {
        name: String,
        position: usize,
        expression: String,
    },

    #[error("Exceeded max expression depth {max}")]
    MaxDepthExceeded { max: usize },

    #[error("Exceeded max expression length {max}")]
    MaxLengthExceeded { max: usize },

    #[error("{message}")]
    Runtime { message: String },
}

// ============================================================================
// VALUES
// ============================================================================

/// Named values visible to expressions. Names are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionValues {
    values: BTreeMap<String, Token>,
}

impl ExpressionValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Token) -> Option<Token> {
        self.values.insert(name.to_lowercase(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Token> {
        self.values.get(&name.to_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<Token> {
        self.values.remove(&name.to_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_lowercase())
    }

    /// Lowercased names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values from a JSON object, one named value per top-level key.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(name, value)| (name.clone(), Token::from_json(value)))
                .collect(),
            _ => Self::default(),
        }
    }
}

impl<S: AsRef<str>> FromIterator<(S, Token)> for ExpressionValues {
    fn from_iter<I: IntoIterator<Item = (S, Token)>>(iter: I) -> Self {
        let mut values = Self::default();
        for (name, value) in iter {
            values.insert(name.as_ref(), value);
        }
        values
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// Validates and evaluates expression text.
pub trait ExpressionEngine: Send + Sync {
    /// Check syntax and that every named value and function is allowed.
    /// `allowed` holds context entries: `name` or `name(min,max)`.
    fn validate(&self, expression: &str, allowed: &[String]) -> Result<(), ExpressionError>;

    fn evaluate(&self, expression: &str, values: &ExpressionValues) -> Result<Token, ExpressionError>;
}

/// Host function callable from expressions.
pub type ExpressionFunction = Arc<dyn Fn(&[Token]) -> Result<Token, String> + Send + Sync>;

/// Default engine.
#[derive(Clone, Default)]
pub struct BasicExpressionEngine {
    functions: HashMap<String, (usize, usize, ExpressionFunction)>,
}

impl BasicExpressionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function. It is only accepted at validation time in
    /// positions whose context lists it.
    pub fn with_function<F>(mut self, name: &str, min: usize, max: usize, function: F) -> Self
    where
        F: Fn(&[Token]) -> Result<Token, String> + Send + Sync + 'static,
    {
        self.functions
            .insert(name.to_lowercase(), (min, max, Arc::new(function)));
        self
    }

    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for BasicExpressionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicExpressionEngine")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExpressionEngine for BasicExpressionEngine {
    fn validate(&self, expression: &str, allowed: &[String]) -> Result<(), ExpressionError> {
        let expr = parse(expression)?;
        let context = AllowedContext::new(allowed);
        context.check(&expr, expression)
    }

    fn evaluate(&self, expression: &str, values: &ExpressionValues) -> Result<Token, ExpressionError> {
        let expr = parse(expression)?;
        Evaluation {
            values,
            functions: &self.functions,
        }
        .eval(&expr)
    }
}

/// Named values and function signatures allowed at one position.
struct AllowedContext {
    named: HashSet<String>,
    functions: HashMap<String, (usize, usize)>,
}

impl AllowedContext {
    fn new(allowed: &[String]) -> Self {
        let mut named = HashSet::new();
        let mut functions = HashMap::new();
        for entry in allowed {
            match parse_signature(entry) {
                Some((name, min, max)) => {
                    functions.insert(name.to_lowercase(), (min, max));
                }
                None => {
                    named.insert(entry.trim().to_lowercase());
                }
            }
        }
        Self { named, functions }
    }

    fn check(&self, expr: &Expr, expression: &str) -> Result<(), ExpressionError> {
        match expr {
            Expr::Literal(_) => Ok(()),
            Expr::NamedValue { name, position } => {
                if self.named.contains(&name.to_lowercase()) {
                    Ok(())
                } else {
                    Err(ExpressionError::UnrecognizedNamedValue {
                        name: name.clone(),
                        position: *position,
                        expression: expression.to_string(),
                    })
                }
            }
            Expr::Member { target, .. } => self.check(target, expression),
            Expr::Index { target, index } => {
                self.check(target, expression)?;
                self.check(index, expression)
            }
            Expr::Not(operand) => self.check(operand, expression),
            Expr::Binary { left, right, .. } => {
                self.check(left, expression)?;
                self.check(right, expression)
            }
            Expr::Call { name, args, position } => {
                let Some((min, max)) = builtin_arity(name).or_else(|| self.functions.get(&name.to_lowercase()).copied())
                else {
                    return Err(ExpressionError::UnrecognizedFunction {
                        name: name.clone(),
                        position: *position,
                        expression: expression.to_string(),
                    });
                };
                if args.len() < min {
                    return Err(ExpressionError::TooFewParameters {
                        name: name.clone(),
                        position: *position,
                        expression: expression.to_string(),
                    });
                }
                if args.len() > max {
                    return Err(ExpressionError::TooManyParameters {
                        name: name.clone(),
                        position: *position,
                        expression: expression.to_string(),
                    });
                }
                args.iter().try_for_each(|arg| self.check(arg, expression))
            }
        }
    }
}

/// Parse `name(min,max)` or `name()`. `MAX` means unbounded.
fn parse_signature(entry: &str) -> Option<(&str, usize, usize)> {
    let entry = entry.trim();
    let open = entry.find('(')?;
    let name = entry[..open].trim();
    let params = entry[open + 1..].strip_suffix(')')?.trim();
    if params.is_empty() {
        return Some((name, 0, usize::MAX));
    }

    let bound = |text: &str, default: usize| -> usize {
        let text = text.trim();
        if text.eq_ignore_ascii_case("max") {
            usize::MAX
        } else {
            text.parse().unwrap_or(default)
        }
    };
    match params.split_once(',') {
        Some((min, max)) => Some((name, bound(min, 0), bound(max, usize::MAX))),
        None => Some((name, bound(params, 0), usize::MAX)),
    }
}

/// The value of an expression that is a single string literal.
pub fn string_literal(expression: &str) -> Option<String> {
    let mut lexemes = Lexer::new(expression).tokenize().into_iter();
    match (lexemes.next()?.kind, lexemes.next()?.kind) {
        (LexemeKind::String(value), LexemeKind::Eof) => Some(value),
        _ => None,
    }
}
