//! Per-call template context

use crate::expression::{ExpressionEngine, ExpressionValues};
use crate::schema::SchemaRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use weft_core::{MemoryBudget, Span, TemplateConfig, TemplateError, TraceWriter, ValidationErrors};

/// Everything one read or evaluate call needs. Shared collaborators are held
/// behind `Arc`; the budget, errors and values belong to this call only.
pub struct TemplateContext {
    pub schema: Arc<SchemaRegistry>,
    pub expressions: Arc<dyn ExpressionEngine>,
    pub trace: Arc<dyn TraceWriter>,
    pub memory: MemoryBudget,
    pub errors: ValidationErrors,
    /// Named values available to expressions during evaluation.
    pub values: ExpressionValues,
    /// Names of host functions available during evaluation.
    pub functions: Vec<String>,
    pub extended_directives: bool,
    file_names: Vec<String>,
}

impl TemplateContext {
    pub fn new(
        schema: Arc<SchemaRegistry>,
        expressions: Arc<dyn ExpressionEngine>,
        trace: Arc<dyn TraceWriter>,
        config: &TemplateConfig,
    ) -> Self {
        let limits = &config.limits;
        Self {
            schema,
            expressions,
            trace,
            memory: MemoryBudget::from_limits(limits),
            errors: ValidationErrors::new(limits.max_errors, limits.max_error_message_length),
            values: ExpressionValues::new(),
            functions: Vec::new(),
            extended_directives: config.extended_directives,
            file_names: Vec::new(),
        }
    }

    /// Id of a file name, registering it on first use.
    pub fn file_id(&mut self, name: &str) -> usize {
        match self.file_names.iter().position(|known| known == name) {
            Some(id) => id,
            None => {
                self.file_names.push(name.to_string());
                self.file_names.len() - 1
            }
        }
    }

    pub fn file_name(&self, id: usize) -> Option<&str> {
        self.file_names.get(id).map(String::as_str)
    }

    /// Record a validation error against a position and mirror it to the trace.
    pub fn error(&mut self, span: Span, error: TemplateError) {
        let prefix = self.prefix(span);
        let message = match &prefix {
            Some(prefix) => format!("{}: {}", prefix, error),
            None => error.to_string(),
        };
        self.trace.error(&message);
        self.errors.add(error, span, prefix.as_deref());
    }

    fn prefix(&self, span: Span) -> Option<String> {
        let file = span.file_id.and_then(|id| self.file_name(id));
        let position = match (span.line, span.column) {
            (Some(line), Some(column)) => Some(format!("(Line: {}, Col: {})", line, column)),
            _ => None,
        };
        match (file, position) {
            (Some(file), Some(position)) => Some(format!("{} {}", file, position)),
            (Some(file), None) => Some(file.to_string()),
            (None, Some(position)) => Some(position),
            (None, None) => None,
        }
    }

    /// Lowercased names usable during evaluation: value names plus `name()`
    /// for every host function.
    pub fn available_context(&self) -> HashSet<String> {
        self.values
            .names()
            .map(str::to_string)
            .chain(self.functions.iter().map(|f| format!("{}()", f.to_lowercase())))
            .collect()
    }
}
