//! Schema-driven reader: object events in, validated token tree out

use super::object::ObjectReader;
use super::scalar::parse_scalar;
use crate::context::TemplateContext;
use crate::schema::{
    Definition, MappingDefinition, ScalarDefinition, ScalarMatch, SchemaRegistry, SequenceDefinition,
    StringDefinition, ANY,
};
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use weft_core::{FatalError, FatalResult, Span, TemplateError, Token, TokenKind, MIN_OBJECT_SIZE};

/// Outcome of a read. `token` is `None` only when the top-level type is
/// unknown; every other problem is recorded on the context.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub token: Option<Token>,
    /// Bytes added to the context's memory budget by this read.
    pub bytes: usize,
}

/// Read one document from `reader` against the definition named `type_name`.
pub fn read_template<R: ObjectReader + ?Sized>(
    context: &mut TemplateContext,
    type_name: &str,
    reader: &mut R,
    file_id: Option<usize>,
) -> FatalResult<ReadResult> {
    let schema = Arc::clone(&context.schema);
    let original_bytes = context.memory.current_bytes();

    let root = match schema.get_definition(type_name) {
        Ok(definition) => definition,
        Err(error) => {
            context.error(
                Span {
                    file_id,
                    ..Span::default()
                },
                error,
            );
            return Ok(ReadResult { token: None, bytes: 0 });
        }
    };

    reader.validate_start()?;
    let info = DefinitionInfo::root(root);
    let token = TemplateReader {
        context: &mut *context,
        schema: &schema,
        reader: &mut *reader,
        file_id,
    }
    .read_value(&info)?;
    reader.validate_end()?;

    let bytes = context.memory.current_bytes().saturating_sub(original_bytes);
    context
        .trace
        .verbose(&format!("Read template '{}': {} bytes, {} error(s)", type_name, bytes, context.errors.len()));
    Ok(ReadResult {
        token: Some(token),
        bytes,
    })
}

// ============================================================================
// DEFINITION CURSOR
// ============================================================================

/// The definitions legal at one position plus the expression context
/// inherited from its ancestors.
#[derive(Debug, Clone)]
struct DefinitionInfo<'s> {
    definitions: Vec<&'s Definition>,
    allowed_context: Rc<[String]>,
    /// Sequence whose item is this position.
    parent_sequence: Option<&'s SequenceDefinition>,
    /// Sequence a directive body may splice into.
    splice: Option<&'s SequenceDefinition>,
    /// Directive bodies merge into their parent, so whole-mapping checks
    /// are left to the parent.
    partial: bool,
}

impl<'s> DefinitionInfo<'s> {
    fn root(definition: &'s Definition) -> Self {
        Self {
            definitions: vec![definition],
            allowed_context: definition.reader_context.clone().into(),
            parent_sequence: None,
            splice: None,
            partial: false,
        }
    }

    fn child(
        &self,
        schema: &'s SchemaRegistry,
        name: &str,
        parent_sequence: Option<&'s SequenceDefinition>,
    ) -> Self {
        let definitions: Vec<&'s Definition> = schema.get_definition(name).into_iter().collect();
        let allowed_context = match definitions.first() {
            Some(definition) if !definition.reader_context.is_empty() => {
                merge_context(&self.allowed_context, &definition.reader_context)
            }
            _ => Rc::clone(&self.allowed_context),
        };
        Self {
            definitions,
            allowed_context,
            parent_sequence,
            splice: None,
            partial: false,
        }
    }

    /// The current definitions plus the enclosing sequence, for the value
    /// of a directive key.
    fn widened(&self) -> Self {
        Self {
            splice: self.parent_sequence.or(self.splice),
            partial: true,
            ..self.clone()
        }
    }

    fn with_variable(mut self, name: &str) -> Self {
        self.allowed_context = merge_context(&self.allowed_context, &[name.to_string()]);
        self
    }

    fn sequence(&self, schema: &'s SchemaRegistry) -> Option<&'s SequenceDefinition> {
        schema.sequence(&self.definitions).or(self.splice)
    }
}

/// Union of two context lists, case-insensitive, first spelling wins.
pub(crate) fn merge_context(parent: &[String], child: &[String]) -> Rc<[String]> {
    let mut seen = HashSet::new();
    parent
        .iter()
        .chain(child)
        .filter(|entry| seen.insert(entry.to_lowercase()))
        .cloned()
        .collect()
}

// ============================================================================
// READER
// ============================================================================

struct TemplateReader<'a, 's, R: ?Sized> {
    context: &'a mut TemplateContext,
    schema: &'s SchemaRegistry,
    reader: &'a mut R,
    file_id: Option<usize>,
}

impl<'a, 's, R: ObjectReader + ?Sized> TemplateReader<'a, 's, R> {
    fn read_value(&mut self, info: &DefinitionInfo<'s>) -> FatalResult<Token> {
        self.context.memory.increment_events()?;

        // Scalar
        if let Some(literal) = self.reader.allow_literal() {
            let literal = self.stamp(literal);
            let scalar = parse_scalar(self.context, literal.clone(), &info.allowed_context);
            let scalar = match scalar.kind {
                TokenKind::BasicExpression(_) if info.allowed_context.is_empty() => {
                    self.context.error(scalar.span, TemplateError::ExpressionNotAllowed);
                    literal
                }
                _ => self.validate(scalar, info),
            };
            self.context.memory.add_token(&scalar, false)?;
            return Ok(scalar);
        }

        // Sequence
        if let Some(span) = self.reader.allow_sequence_start() {
            let span = span.or_file(self.file_id);
            self.context.memory.increment_depth()?;
            self.context.memory.add_bytes(MIN_OBJECT_SIZE)?;

            let mut items = Vec::new();
            match info.sequence(self.schema) {
                Some(sequence) => {
                    let item_info = info.child(self.schema, &sequence.item_type, Some(sequence));
                    while !self.reader.allow_sequence_end() {
                        items.push(self.read_value(&item_info)?);
                    }
                }
                None => {
                    self.context.error(span, TemplateError::UnexpectedSequence);
                    while !self.reader.allow_sequence_end() {
                        self.skip_value()?;
                    }
                }
            }

            self.context.memory.decrement_depth();
            return Ok(Token::sequence(items).with_span(span));
        }

        // Mapping
        if let Some(span) = self.reader.allow_mapping_start() {
            let span = span.or_file(self.file_id);
            self.context.memory.increment_depth()?;
            self.context.memory.add_bytes(MIN_OBJECT_SIZE)?;

            let candidates = self.schema.mappings(&info.definitions);
            let all_loose = match candidates.as_slice() {
                [mapping] => !self.schema.has_properties(mapping) && mapping.loose_key_type.is_some(),
                _ => false,
            };

            let pairs = if candidates.is_empty() {
                self.context.error(span, TemplateError::UnexpectedMapping);
                while !self.reader.allow_mapping_end() {
                    self.skip_value()?;
                    self.skip_value()?;
                }
                Vec::new()
            } else if all_loose {
                let mapping = candidates[0];
                let key_info = self.loose_info(info, mapping.loose_key_type.as_deref());
                let value_info = self.loose_info(info, mapping.loose_value_type.as_deref());
                self.read_loose_mapping(info, &key_info, &value_info)?
            } else {
                self.read_well_known_mapping(info, candidates, span)?
            };

            self.context.memory.decrement_depth();
            return Ok(Token::mapping(pairs).with_span(span));
        }

        Err(FatalError::invariant("Expected a scalar value, a sequence, or a mapping"))
    }

    fn read_well_known_mapping(
        &mut self,
        info: &DefinitionInfo<'s>,
        mut candidates: Vec<&'s MappingDefinition>,
        span: Span,
    ) -> FatalResult<Vec<(Token, Token)>> {
        let loose = candidates
            .first()
            .filter(|mapping| mapping.loose_key_type.is_some())
            .map(|mapping| {
                (
                    self.loose_info(info, mapping.loose_key_type.as_deref()),
                    self.loose_info(info, mapping.loose_value_type.as_deref()),
                )
            });

        let mut pairs = Vec::new();
        let mut keys = HashSet::new();
        let mut has_expression_key = false;

        while let Some(raw) = self.reader.allow_literal() {
            self.context.memory.increment_events()?;
            let raw = self.stamp(raw);
            let key = parse_scalar(self.context, raw, &info.allowed_context);

            if key.is_expression() {
                has_expression_key = true;
                if let Some(pair) = self.read_expression_pair(key, info, None)? {
                    pairs.push(pair);
                }
                continue;
            }

            let key = string_key(key);
            let name = key.as_str().unwrap_or_default().to_string();

            if !keys.insert(name.to_lowercase()) {
                self.context.error(key.span, TemplateError::DuplicateKey { key: name });
                self.skip_value()?;
                continue;
            }

            // Well known
            if let Some(value_type) = self.schema.match_mapping_key(&mut candidates, &name) {
                self.context.memory.add_token(&key, false)?;
                let value_info = info.child(self.schema, value_type, None);
                let value = self.read_value(&value_info)?;
                pairs.push((key, value));
                continue;
            }

            // Loose
            if let Some((key_info, value_info)) = &loose {
                let key = self.validate(key, key_info);
                self.context.memory.add_token(&key, false)?;
                let value = self.read_value(value_info)?;
                pairs.push((key, value));
                continue;
            }

            self.context.error(key.span, TemplateError::UnexpectedValue { value: name });
            self.skip_value()?;
        }

        if !has_expression_key && !info.partial {
            if candidates.len() > 1 {
                let properties = self.schema.distinguishing_properties(&candidates).join(", ");
                self.context.error(span, TemplateError::AmbiguousOneOf { properties });
            } else if let Some(mapping) = candidates.first() {
                for name in self.schema.missing_required(mapping, &keys) {
                    self.context.error(span, TemplateError::MissingRequiredProperty { name });
                }
            }
        }

        self.expect_mapping_end()?;
        Ok(pairs)
    }

    fn read_loose_mapping(
        &mut self,
        info: &DefinitionInfo<'s>,
        key_info: &DefinitionInfo<'s>,
        value_info: &DefinitionInfo<'s>,
    ) -> FatalResult<Vec<(Token, Token)>> {
        let mut pairs = Vec::new();
        let mut keys = HashSet::new();

        while let Some(raw) = self.reader.allow_literal() {
            self.context.memory.increment_events()?;
            let raw = self.stamp(raw);
            let key = parse_scalar(self.context, raw, &info.allowed_context);

            if key.is_expression() {
                if let Some(pair) = self.read_expression_pair(key, info, Some(value_info))? {
                    pairs.push(pair);
                }
                continue;
            }

            let key = string_key(key);
            let name = key.as_str().unwrap_or_default().to_string();
            if !keys.insert(name.to_lowercase()) {
                self.context.error(key.span, TemplateError::DuplicateKey { key: name });
                self.skip_value()?;
                continue;
            }

            let key = self.validate(key, key_info);
            self.context.memory.add_token(&key, false)?;
            let value = self.read_value(value_info)?;
            pairs.push((key, value));
        }

        self.expect_mapping_end()?;
        Ok(pairs)
    }

    /// An expression or directive in key position. Returns `None` when the
    /// pair was dropped.
    fn read_expression_pair(
        &mut self,
        key: Token,
        info: &DefinitionInfo<'s>,
        loose_value: Option<&DefinitionInfo<'s>>,
    ) -> FatalResult<Option<(Token, Token)>> {
        if info.allowed_context.is_empty() {
            self.context.error(key.span, TemplateError::ExpressionNotAllowed);
            self.skip_value()?;
            return Ok(None);
        }

        self.context.memory.add_token(&key, false)?;
        let value_info = match &key.kind {
            TokenKind::BasicExpression(_) => match loose_value {
                Some(loose_value) => loose_value.clone(),
                None => info.child(self.schema, ANY, None),
            },
            TokenKind::Each { variable, .. } => info.widened().with_variable(variable),
            _ => info.widened(),
        };
        let value = self.read_value(&value_info)?;
        Ok(Some((key, value)))
    }

    fn loose_info(&self, info: &DefinitionInfo<'s>, name: Option<&str>) -> DefinitionInfo<'s> {
        info.child(self.schema, name.unwrap_or(ANY), None)
    }

    /// Check a literal against the scalar alternatives of the position. A
    /// non-string literal may come back coerced to a string.
    fn validate(&mut self, scalar: Token, info: &DefinitionInfo<'s>) -> Token {
        if scalar.is_literal() {
            return match self.schema.match_scalar(&info.definitions, &scalar) {
                ScalarMatch::Matched(ScalarDefinition::String(string)) => {
                    self.check_expression_string(&scalar, string, info);
                    scalar
                }
                ScalarMatch::Matched(_) => scalar,
                ScalarMatch::Coerced(coerced, string) => {
                    self.check_expression_string(&coerced, string, info);
                    coerced
                }
                ScalarMatch::NoMatch => {
                    let value = scalar.to_string();
                    self.context.error(scalar.span, TemplateError::UnexpectedValue { value });
                    scalar
                }
            };
        }

        match scalar.kind {
            TokenKind::BasicExpression(_) => {}
            _ => {
                let value = scalar.to_string();
                self.context.error(scalar.span, TemplateError::UnexpectedValue { value });
            }
        }
        scalar
    }

    /// String values of `is-expression` definitions must themselves parse
    /// as expressions under the position's context.
    fn check_expression_string(&mut self, literal: &Token, string: &StringDefinition, info: &DefinitionInfo<'s>) {
        if !string.is_expression {
            return;
        }
        let Some(text) = literal.as_str() else {
            return;
        };
        if let Err(error) = self.context.expressions.validate(text, &info.allowed_context) {
            self.context.error(
                literal.span,
                TemplateError::InvalidExpression {
                    message: error.to_string(),
                },
            );
        }
    }

    fn skip_value(&mut self) -> FatalResult<()> {
        self.context.memory.increment_events()?;

        if self.reader.allow_literal().is_some() {
            return Ok(());
        }

        if self.reader.allow_sequence_start().is_some() {
            self.context.memory.increment_depth()?;
            while !self.reader.allow_sequence_end() {
                self.skip_value()?;
            }
            self.context.memory.decrement_depth();
            return Ok(());
        }

        if self.reader.allow_mapping_start().is_some() {
            self.context.memory.increment_depth()?;
            while !self.reader.allow_mapping_end() {
                self.skip_value()?;
                self.skip_value()?;
            }
            self.context.memory.decrement_depth();
            return Ok(());
        }

        Err(FatalError::invariant("Expected a scalar value, a sequence, or a mapping"))
    }

    fn expect_mapping_end(&mut self) -> FatalResult<()> {
        if self.reader.allow_mapping_end() {
            Ok(())
        } else {
            Err(FatalError::invariant("Expected mapping end"))
        }
    }

    fn stamp(&self, literal: Token) -> Token {
        let span = literal.span.or_file(self.file_id);
        literal.with_span(span)
    }
}

/// Keys are always strings; other literals are rendered as text.
pub(crate) fn string_key(key: Token) -> Token {
    match key.kind {
        TokenKind::String(_) => key,
        _ => Token::string(key.to_string()).with_span(key.span),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::BasicExpressionEngine;
    use crate::reader::EventObjectReader;
    use crate::schema::{MappingDefinition, StringDefinition};
    use weft_core::{NullTraceWriter, Resource, TemplateConfig, TemplateLimits};

    fn schema() -> SchemaRegistry {
        SchemaRegistry::builder()
            .definition(
                "workflow",
                Definition::mapping(
                    MappingDefinition::new()
                        .required("name", "non-empty-string")
                        .property("env", "env")
                        .property("steps", "steps"),
                ),
            )
            .definition(
                "env",
                Definition::mapping(MappingDefinition::new().loose("non-empty-string", "string"))
                    .with_context(["matrix"]),
            )
            .definition("non-empty-string", Definition::string(StringDefinition::non_empty()))
            .definition("steps", Definition::sequence("step").with_context(["matrix"]))
            .definition("step", Definition::one_of(["run-step", "uses-step"]))
            .definition(
                "run-step",
                Definition::mapping(
                    MappingDefinition::new()
                        .required("run", "string")
                        .property("name", "string"),
                ),
            )
            .definition(
                "uses-step",
                Definition::mapping(
                    MappingDefinition::new()
                        .required("uses", "string")
                        .property("name", "string")
                        .property("with", "mapping"),
                ),
            )
            .build()
            .unwrap()
    }

    fn context_with(config: &TemplateConfig) -> TemplateContext {
        TemplateContext::new(
            Arc::new(schema()),
            Arc::new(BasicExpressionEngine::new()),
            Arc::new(NullTraceWriter),
            config,
        )
    }

    fn context() -> TemplateContext {
        context_with(&TemplateConfig::default())
    }

    fn read(ctx: &mut TemplateContext, yaml: &str) -> FatalResult<ReadResult> {
        let mut reader = EventObjectReader::from_yaml_str(yaml).unwrap();
        read_template(ctx, "workflow", &mut reader, None)
    }

    fn messages(ctx: &TemplateContext) -> Vec<String> {
        ctx.errors.iter().map(|e| e.message.clone()).collect()
    }

    #[test]
    fn test_read_valid_workflow() {
        let mut ctx = context();
        let result = read(&mut ctx, "name: ci\nsteps:\n  - run: make\n  - uses: actions/checkout\n").unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", messages(&ctx));
        let token = result.token.unwrap();
        assert_eq!(token.get("name").and_then(Token::as_str), Some("ci"));
        assert_eq!(token.get("steps").and_then(Token::as_sequence).map(|s| s.len()), Some(2));
        assert!(result.bytes > 0);
        assert_eq!(result.bytes, ctx.memory.current_bytes());
    }

    #[test]
    fn test_unknown_root_type() {
        let mut ctx = context();
        let mut reader = EventObjectReader::from_yaml_str("a: 1").unwrap();
        let result = read_template(&mut ctx, "nope", &mut reader, None).unwrap();
        assert_eq!(result.token, None);
        assert_eq!(messages(&ctx), vec!["Schema definition 'nope' not found"]);
    }

    #[test]
    fn test_missing_required_and_unexpected_key() {
        let mut ctx = context();
        read(&mut ctx, "bogus: 1\n").unwrap();
        let errors = messages(&ctx);
        assert!(errors.iter().any(|m| m.contains("bogus")), "{:?}", errors);
        assert!(errors.iter().any(|m| m.contains("Required property is missing: name")), "{:?}", errors);
    }

    #[test]
    fn test_duplicate_key_keeps_first() {
        let mut ctx = context();
        let mut reader = EventObjectReader::from_json_str(r#"{"name": "a", "NAME": "b"}"#).unwrap();
        let token = read_template(&mut ctx, "workflow", &mut reader, None).unwrap().token.unwrap();
        assert_eq!(ctx.errors.len(), 1);
        assert!(matches!(ctx.errors.iter().next().map(|e| &e.error), Some(TemplateError::DuplicateKey { .. })));
        assert_eq!(token.as_mapping().map(|m| m.len()), Some(1));
        assert_eq!(token.get("name"), Some(&Token::string("a")));
    }

    #[test]
    fn test_one_of_ambiguity_lists_distinguishing_properties() {
        let mut ctx = context();
        read(&mut ctx, "name: ci\nsteps:\n  - name: x\n").unwrap();
        assert_eq!(
            ctx.errors.iter().map(|e| &e.error).collect::<Vec<_>>(),
            vec![&TemplateError::AmbiguousOneOf {
                properties: "run, uses, with".to_string()
            }]
        );
    }

    #[test]
    fn test_one_of_narrows_to_single_candidate() {
        let mut ctx = context();
        read(&mut ctx, "name: ci\nsteps:\n  - name: x\n    uses: a/b\n    with: {k: v}\n").unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", messages(&ctx));
    }

    #[test]
    fn test_expression_not_allowed_keeps_text() {
        let mut ctx = context();
        let token = read(&mut ctx, "name: ${{ matrix.os }}\n").unwrap().token.unwrap();
        assert_eq!(token.get("name").and_then(Token::as_str), Some("${{ matrix.os }}"));
        assert_eq!(ctx.errors.iter().next().map(|e| &e.error), Some(&TemplateError::ExpressionNotAllowed));
    }

    #[test]
    fn test_expression_allowed_under_context() {
        let mut ctx = context();
        let token = read(&mut ctx, "name: ci\nenv:\n  OS: ${{ matrix.os }}\n").unwrap().token.unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", messages(&ctx));
        assert_eq!(
            token.get("env").and_then(|env| env.get("os")).map(|t| &t.kind),
            Some(&TokenKind::BasicExpression("matrix.os".into()))
        );
    }

    #[test]
    fn test_loose_key_validated() {
        let mut ctx = context();
        read(&mut ctx, "name: ci\nenv:\n  '': x\n").unwrap();
        assert_eq!(
            ctx.errors.iter().map(|e| &e.error).collect::<Vec<_>>(),
            vec![&TemplateError::UnexpectedValue { value: String::new() }]
        );
    }

    #[test]
    fn test_unexpected_sequence_is_skipped() {
        let mut ctx = context();
        let token = read(&mut ctx, "name: [a, [b]]\n").unwrap().token.unwrap();
        assert_eq!(token.get("name").and_then(Token::as_sequence).map(|s| s.len()), Some(0));
        assert!(ctx.errors.iter().any(|e| e.error == TemplateError::UnexpectedSequence));
    }

    #[test]
    fn test_insert_key_spreads_under_context() {
        let mut ctx = context();
        let token = read(&mut ctx, "name: ci\nenv:\n  ${{ insert }}: ${{ matrix.env }}\n")
            .unwrap()
            .token
            .unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", messages(&ctx));
        let env = token.get("env").and_then(Token::as_mapping).unwrap();
        assert_eq!(env[0].0.kind, TokenKind::InsertExpression);
        assert_eq!(env[0].1.kind, TokenKind::BasicExpression("matrix.env".into()));
    }

    #[test]
    fn test_directive_body_splices_into_sequence() {
        let config = TemplateConfig {
            extended_directives: true,
            ..TemplateConfig::default()
        };
        let mut ctx = context_with(&config);
        let yaml = "name: ci\nsteps:\n  - ${{ if matrix.fast }}:\n      - run: a\n      - run: b\n";
        let token = read(&mut ctx, yaml).unwrap().token.unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", messages(&ctx));
        let steps = token.get("steps").and_then(Token::as_sequence).unwrap();
        let (key, body) = &steps[0].as_mapping().unwrap()[0];
        assert_eq!(key.kind, TokenKind::If("matrix.fast".into()));
        assert_eq!(body.as_sequence().map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_each_variable_visible_in_body() {
        let config = TemplateConfig {
            extended_directives: true,
            ..TemplateConfig::default()
        };
        let mut ctx = context_with(&config);
        let yaml = "name: ci\nsteps:\n  - ${{ each tool in matrix.tools }}:\n      run: ${{ tool }}\n";
        read(&mut ctx, yaml).unwrap();
        assert!(ctx.errors.is_empty(), "{:?}", messages(&ctx));
    }

    #[test]
    fn test_depth_limit_is_fatal() {
        let config = TemplateConfig {
            limits: TemplateLimits {
                max_depth: 3,
                ..TemplateLimits::default()
            },
            ..TemplateConfig::default()
        };
        let mut ctx = context_with(&config);
        let mut reader = EventObjectReader::from_yaml_str("a: {b: {c: {d: 1}}}").unwrap();
        let error = read_template(&mut ctx, "any", &mut reader, None).unwrap_err();
        assert_eq!(error.resource(), Some(Resource::Depth));
    }

    #[test]
    fn test_file_id_stamped_on_errors() {
        let mut ctx = context();
        let file = ctx.file_id("ci.yml");
        let mut reader = EventObjectReader::from_yaml_str("name: x\nbogus: 1\n").unwrap();
        let token = read_template(&mut ctx, "workflow", &mut reader, Some(file)).unwrap().token.unwrap();
        assert_eq!(messages(&ctx), vec!["ci.yml (Line: 2, Col: 1): Unexpected value 'bogus'"]);

        let (key, value) = &token.as_mapping().unwrap()[0];
        assert_eq!(key.span, Span::new(Some(file), 1, 1));
        assert_eq!(value.span, Span::new(Some(file), 1, 7));
    }

    #[test]
    fn test_mapping_keys_count_as_events() {
        let limited = |max_events| TemplateConfig {
            limits: TemplateLimits {
                max_events,
                ..TemplateLimits::default()
            },
            ..TemplateConfig::default()
        };

        // Loose: the root, three keys and three values
        let mut ctx = context_with(&limited(6));
        let mut reader = EventObjectReader::from_yaml_str("{a: 1, b: 2, c: 3}").unwrap();
        let error = read_template(&mut ctx, "any", &mut reader, None).unwrap_err();
        assert_eq!(error.resource(), Some(Resource::Events));

        let mut ctx = context_with(&limited(7));
        let mut reader = EventObjectReader::from_yaml_str("{a: 1, b: 2, c: 3}").unwrap();
        assert!(read_template(&mut ctx, "any", &mut reader, None).is_ok());

        // Well known: the root, two keys and two values
        let mut ctx = context_with(&limited(4));
        let error = read(&mut ctx, "name: ci\nenv: {}\n").unwrap_err();
        assert_eq!(error.resource(), Some(Resource::Events));
    }
}
