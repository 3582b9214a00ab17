//! Engine façade

use crate::context::TemplateContext;
use crate::evaluator::evaluate_template;
use crate::expression::{BasicExpressionEngine, ExpressionEngine};
use crate::reader::{read_template, ObjectReader, ReadResult};
use crate::schema::SchemaRegistry;
use std::fmt;
use std::sync::Arc;
use weft_core::{ConfigResult, FatalResult, TemplateConfig, Token, TraceWriter, TracingTraceWriter};

/// Shared, read-only configuration for reading and evaluating templates.
///
/// An engine is cheap to clone and safe to share between threads. Every
/// call works on its own [`TemplateContext`] from [`TemplateEngine::context`],
/// which owns the call's memory budget, error list and named values.
#[derive(Clone)]
pub struct TemplateEngine {
    schema: Arc<SchemaRegistry>,
    config: TemplateConfig,
    expressions: Arc<dyn ExpressionEngine>,
    trace: Arc<dyn TraceWriter>,
}

impl TemplateEngine {
    /// Engine with the default expression engine, tracing through `tracing`.
    pub fn new(schema: SchemaRegistry, config: TemplateConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            schema: Arc::new(schema),
            config,
            expressions: Arc::new(BasicExpressionEngine::new()),
            trace: Arc::new(TracingTraceWriter),
        })
    }

    pub fn with_expression_engine(mut self, expressions: impl ExpressionEngine + 'static) -> Self {
        self.expressions = Arc::new(expressions);
        self
    }

    pub fn with_trace_writer(mut self, trace: impl TraceWriter + 'static) -> Self {
        self.trace = Arc::new(trace);
        self
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Fresh per-call context.
    pub fn context(&self) -> TemplateContext {
        TemplateContext::new(
            Arc::clone(&self.schema),
            Arc::clone(&self.expressions),
            Arc::clone(&self.trace),
            &self.config,
        )
    }

    /// Read a document. Positions are attributed to `file_name` when given.
    pub fn read<R: ObjectReader + ?Sized>(
        &self,
        context: &mut TemplateContext,
        type_name: &str,
        reader: &mut R,
        file_name: Option<&str>,
    ) -> FatalResult<ReadResult> {
        let file_id = file_name.map(|name| context.file_id(name));
        read_template(context, type_name, reader, file_id)
    }

    /// Evaluate a token tree. `remove_bytes` is the charge still held on
    /// `context` for `template`, typically [`ReadResult::bytes`] when the
    /// same context did the read; pass 0 for a fresh context.
    pub fn evaluate(
        &self,
        context: &mut TemplateContext,
        type_name: &str,
        template: &Token,
        remove_bytes: usize,
        file_name: Option<&str>,
    ) -> FatalResult<Option<Token>> {
        let file_id = file_name.map(|name| context.file_id(name));
        evaluate_template(context, type_name, template, remove_bytes, file_id)
    }
}

impl fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("definitions", &self.schema.names().count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::EventObjectReader;
    use crate::schema::{Definition, MappingDefinition, ANY, STRING};
    use weft_core::{ConfigError, NullTraceWriter};

    fn engine() -> TemplateEngine {
        let schema = SchemaRegistry::builder()
            .definition(
                "job",
                Definition::mapping(
                    MappingDefinition::new()
                        .required("name", STRING)
                        .property("with", "inputs"),
                ),
            )
            .definition(
                "inputs",
                Definition::mapping(MappingDefinition::new().loose(STRING, ANY)).with_context(["inputs"]),
            )
            .build()
            .unwrap();
        TemplateEngine::new(schema, TemplateConfig::default())
            .unwrap()
            .with_trace_writer(NullTraceWriter)
    }

    #[test]
    fn test_read_then_evaluate_in_one_context() {
        let engine = engine();
        let mut ctx = engine.context();
        let mut reader =
            EventObjectReader::from_yaml_str("name: deploy\nwith:\n  target: ${{ inputs.env }}\n").unwrap();
        let read = engine.read(&mut ctx, "job", &mut reader, Some("job.yml")).unwrap();
        assert!(ctx.errors.is_empty());
        assert!(read.bytes > 0);

        ctx.values.insert(
            "inputs",
            Token::mapping(vec![(Token::string("env"), Token::string("prod"))]),
        );
        let template = read.token.unwrap();
        let result = engine
            .evaluate(&mut ctx, "job", &template, read.bytes, Some("job.yml"))
            .unwrap()
            .unwrap();
        let target = result.get("with").and_then(|with| with.get("target"));
        assert_eq!(target.and_then(Token::as_str), Some("prod"));
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn test_contexts_are_independent() {
        let engine = engine();
        let mut first = engine.context();
        first.error(weft_core::Span::default(), weft_core::TemplateError::ExpectedMapping);
        first.memory.add_bytes(10).unwrap();

        let second = engine.context();
        assert!(second.errors.is_empty());
        assert_eq!(second.memory.current_bytes(), 0);
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut config = TemplateConfig::default();
        config.limits.max_depth = 0;
        let err = TemplateEngine::new(SchemaRegistry::builtin(), config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
