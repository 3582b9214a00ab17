//! Error types for WEFT operations
//!
//! Two tiers: [`TemplateError`] values are recoverable and accumulate in
//! [`ValidationErrors`] while a pass continues, [`FatalError`] aborts the pass.

use crate::token::Span;
use std::fmt;
use thiserror::Error;

/// Recoverable template defects, reported against a node and skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Schema definition '{name}' not found")]
    UnknownType { name: String },

    #[error("Unexpected value '{value}'")]
    UnexpectedValue { value: String },

    #[error("A sequence was not expected")]
    UnexpectedSequence,

    #[error("A mapping was not expected")]
    UnexpectedMapping,

    #[error("'{key}' is already defined")]
    DuplicateKey { key: String },

    #[error("Required property is missing: {name}")]
    MissingRequiredProperty { name: String },

    #[error("There's not enough info to determine what you meant. Add one of these properties: {properties}")]
    AmbiguousOneOf { properties: String },

    #[error("A template expression is not allowed in this context")]
    ExpressionNotAllowed,

    #[error("The expression is not closed. An unescaped ${{{{ sequence was found, but the closing }}}} sequence was not found.")]
    UnterminatedExpression,

    #[error("An expression was expected")]
    ExpectedExpression,

    #[error("Exactly {expected} parameter(s) were expected following the directive '{directive}'. Actual parameter count: {actual}")]
    DirectiveParameterCount {
        directive: String,
        expected: usize,
        actual: usize,
    },

    #[error("The directive '{directive}' is not allowed in this context.")]
    DirectiveNotAllowed { directive: String },

    #[error("The directive '{directive}' is not allowed in this context. Directives are not supported for expressions that are embedded within a string. Directives are only supported when the entire value is an expression.")]
    DirectiveNotAllowedInline { directive: String },

    #[error("Expected a mapping")]
    ExpectedMapping,

    #[error("Expected a sequence")]
    ExpectedSequence,

    #[error("Expected a string")]
    ExpectedString,

    #[error("{message}")]
    InvalidExpression { message: String },

    #[error("{message}")]
    ExpressionFailed { message: String },

    #[error("The variable '{name}' is already defined")]
    VariableAlreadyDefined { name: String },
}

/// One recorded validation error with its fully formatted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub error: TemplateError,
    pub span: Span,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Bounded list of validation errors collected during one pass.
#[derive(Debug, Clone)]
pub struct ValidationErrors {
    max_errors: usize,
    max_message_length: usize,
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new(max_errors: usize, max_message_length: usize) -> Self {
        Self {
            max_errors,
            max_message_length,
            errors: Vec::new(),
        }
    }

    /// Record an error. Errors past the cap are dropped and long messages are
    /// truncated.
    pub fn add(&mut self, error: TemplateError, span: Span, prefix: Option<&str>) {
        if self.errors.len() >= self.max_errors {
            return;
        }

        let mut message = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{}: {}", prefix, error),
            _ => error.to_string(),
        };
        if message.chars().count() > self.max_message_length {
            message = message.chars().take(self.max_message_length).collect();
            message.push_str("[...]");
        }

        self.errors.push(ValidationError {
            error,
            span,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Fail when at least one error was recorded.
    pub fn check(&self) -> Result<(), TemplateValidationFailure> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(TemplateValidationFailure {
            errors: self.errors.clone(),
        })
    }
}

/// Summary error for a pass that recorded validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("The template is not valid. {}", join_messages(.errors))]
pub struct TemplateValidationFailure {
    pub errors: Vec<ValidationError>,
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Budgeted resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Depth,
    Events,
    Bytes,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Depth => f.write_str("object depth"),
            Resource::Events => f.write_str("events"),
            Resource::Bytes => f.write_str("object size"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Maximum {resource} exceeded (limit {limit})")]
pub struct ResourceExceeded {
    pub resource: Resource,
    pub limit: usize,
}

/// Errors that abort a whole read or evaluate call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FatalError {
    #[error(transparent)]
    ResourceExceeded(#[from] ResourceExceeded),

    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

impl FatalError {
    pub fn invariant(message: impl Into<String>) -> Self {
        FatalError::Invariant(message.into())
    }

    pub fn resource(&self) -> Option<Resource> {
        match self {
            FatalError::ResourceExceeded(exceeded) => Some(exceeded.resource),
            FatalError::Invariant(_) => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

pub type FatalResult<T> = Result<T, FatalError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
