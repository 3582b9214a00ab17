//! Expression evaluation

use super::parser::{BinaryOp, Expr};
use super::{ExpressionError, ExpressionFunction, ExpressionValues};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use weft_core::{Token, TokenKind};

/// Built-in functions: name, minimum and maximum parameter count.
pub const BUILTIN_FUNCTIONS: &[(&str, usize, usize)] = &[
    ("contains", 2, 2),
    ("endsWith", 2, 2),
    ("format", 1, usize::MAX),
    ("fromJSON", 1, 1),
    ("join", 1, 2),
    ("startsWith", 2, 2),
    ("toJSON", 1, 1),
];

pub fn builtin_arity(name: &str) -> Option<(usize, usize)> {
    BUILTIN_FUNCTIONS
        .iter()
        .find(|(builtin, _, _)| builtin.eq_ignore_ascii_case(name))
        .map(|(_, min, max)| (*min, *max))
}

/// Evaluates one parsed expression against a set of named values.
pub(crate) struct Evaluation<'a> {
    pub values: &'a ExpressionValues,
    pub functions: &'a HashMap<String, (usize, usize, ExpressionFunction)>,
}

impl Evaluation<'_> {
    pub fn eval(&self, expr: &Expr) -> Result<Token, ExpressionError> {
        match expr {
            Expr::Literal(token) => Ok(token.clone()),
            Expr::NamedValue { name, .. } => Ok(self.values.get(name).cloned().unwrap_or_else(Token::null)),
            Expr::Member { target, name } => {
                let target = self.eval(target)?;
                Ok(target.get(name).cloned().unwrap_or_else(Token::null))
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(lookup_index(&target, &index))
            }
            Expr::Not(operand) => Ok(Token::boolean(!self.eval(operand)?.is_truthy())),
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    self.eval(right)
                } else {
                    Ok(left)
                }
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    Ok(left)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let ordering = compare(&left, &right);
                let result = match op {
                    BinaryOp::Eq => loose_equals(&left, &right),
                    BinaryOp::Ne => !loose_equals(&left, &right),
                    BinaryOp::Lt => ordering == Some(Ordering::Less),
                    BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    BinaryOp::Gt => ordering == Some(Ordering::Greater),
                    BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                    BinaryOp::And | BinaryOp::Or => false,
                };
                Ok(Token::boolean(result))
            }
            Expr::Call { name, args, .. } => {
                let args = args.iter().map(|arg| self.eval(arg)).collect::<Result<Vec<_>, _>>()?;
                self.call(name, &args)
            }
        }
    }

    fn call(&self, name: &str, args: &[Token]) -> Result<Token, ExpressionError> {
        if let Some((min, max)) = builtin_arity(name) {
            check_arity(name, min, max, args)?;
            return call_builtin(name, args);
        }

        let Some((min, max, function)) = self.functions.get(&name.to_lowercase()) else {
            return Err(runtime(format!("Function '{}' is not available", name)));
        };
        check_arity(name, *min, *max, args)?;
        function(args).map_err(runtime)
    }
}

fn check_arity(name: &str, min: usize, max: usize, args: &[Token]) -> Result<(), ExpressionError> {
    if args.len() < min || args.len() > max {
        return Err(runtime(format!(
            "Function '{}' was called with {} parameter(s)",
            name,
            args.len()
        )));
    }
    Ok(())
}

fn runtime(message: String) -> ExpressionError {
    ExpressionError::Runtime { message }
}

fn lookup_index(target: &Token, index: &Token) -> Token {
    match (&target.kind, &index.kind) {
        (TokenKind::Sequence(items), _) => {
            let position = to_number(index);
            if position.is_finite() && position >= 0.0 {
                items.get(position.floor() as usize).cloned().unwrap_or_else(Token::null)
            } else {
                Token::null()
            }
        }
        (TokenKind::Mapping(_), _) if index.is_literal() => {
            target.get(&index.to_string()).cloned().unwrap_or_else(Token::null)
        }
        _ => Token::null(),
    }
}

/// Numeric coercion used by comparisons between different kinds.
pub fn to_number(token: &Token) -> f64 {
    match &token.kind {
        TokenKind::Null => 0.0,
        TokenKind::Boolean(value) => {
            if *value {
                1.0
            } else {
                0.0
            }
        }
        TokenKind::Number(value) => *value,
        TokenKind::String(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        _ => f64::NAN,
    }
}

/// Equality with string case folding and numeric coercion across kinds.
pub fn loose_equals(left: &Token, right: &Token) -> bool {
    match (&left.kind, &right.kind) {
        (TokenKind::Null, TokenKind::Null) => true,
        (TokenKind::Boolean(a), TokenKind::Boolean(b)) => a == b,
        (TokenKind::Number(a), TokenKind::Number(b)) => a == b,
        (TokenKind::String(a), TokenKind::String(b)) => a.to_lowercase() == b.to_lowercase(),
        (TokenKind::Sequence(a), TokenKind::Sequence(b)) => Arc::ptr_eq(a, b),
        (TokenKind::Mapping(a), TokenKind::Mapping(b)) => Arc::ptr_eq(a, b),
        _ if left.is_literal() && right.is_literal() => to_number(left) == to_number(right),
        _ => false,
    }
}

fn compare(left: &Token, right: &Token) -> Option<Ordering> {
    match (&left.kind, &right.kind) {
        (TokenKind::String(a), TokenKind::String(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
        _ => to_number(left).partial_cmp(&to_number(right)),
    }
}

// ============================================================================
// BUILT-IN FUNCTIONS
// ============================================================================

fn call_builtin(name: &str, args: &[Token]) -> Result<Token, ExpressionError> {
    match name.to_lowercase().as_str() {
        "format" => format(args),
        "contains" => Ok(Token::boolean(contains(&args[0], &args[1]))),
        "startswith" => Ok(Token::boolean(
            args[0].to_string().to_lowercase().starts_with(&args[1].to_string().to_lowercase()),
        )),
        "endswith" => Ok(Token::boolean(
            args[0].to_string().to_lowercase().ends_with(&args[1].to_string().to_lowercase()),
        )),
        "join" => Ok(join(args)),
        "tojson" => serde_json::to_string_pretty(&args[0].to_json())
            .map(Token::string)
            .map_err(|e| runtime(e.to_string())),
        "fromjson" => {
            let text = args[0].to_string();
            serde_json::from_str::<serde_json::Value>(&text)
                .map(|value| Token::from_json(&value))
                .map_err(|e| runtime(format!("Error parsing fromJSON input: {}", e)))
        }
        _ => Err(runtime(format!("Function '{}' is not available", name))),
    }
}

fn contains(search: &Token, item: &Token) -> bool {
    match &search.kind {
        TokenKind::Sequence(items) => items.iter().any(|candidate| loose_equals(candidate, item)),
        _ if search.is_literal() => search
            .to_string()
            .to_lowercase()
            .contains(&item.to_string().to_lowercase()),
        _ => false,
    }
}

fn join(args: &[Token]) -> Token {
    let separator = args.get(1).map(Token::to_string).unwrap_or_else(|| ",".to_string());
    match &args[0].kind {
        TokenKind::Sequence(items) => Token::string(
            items
                .iter()
                .map(Token::to_string)
                .collect::<Vec<_>>()
                .join(&separator),
        ),
        _ if args[0].is_literal() => Token::string(args[0].to_string()),
        _ => Token::string(""),
    }
}

/// `format('{0} and {1}', a, b)`. `{{` and `}}` are escaped braces.
fn format(args: &[Token]) -> Result<Token, ExpressionError> {
    let pattern = args[0].to_string();
    let invalid = || runtime(format!("The following format string is invalid: {}", pattern));

    let chars: Vec<char> = pattern.chars().collect();
    let mut result = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                result.push('{');
                i += 2;
            }
            '{' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == '}')
                    .map(|offset| i + 1 + offset)
                    .ok_or_else(invalid)?;
                let index: usize = chars[i + 1..close]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .map_err(|_| invalid())?;
                let arg = args.get(index + 1).ok_or_else(|| {
                    runtime(format!(
                        "The following format string references more arguments than were supplied: {}",
                        pattern
                    ))
                })?;
                result.push_str(&arg.to_string());
                i = close + 1;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                result.push('}');
                i += 2;
            }
            '}' => return Err(invalid()),
            c => {
                result.push(c);
                i += 1;
            }
        }
    }
    Ok(Token::string(result))
}
