//! Evaluator: re-walks a token tree against its schema, expanding
//! expressions wherever their context is available
//!
//! The walk has the same shape as the reader's, but pulls events from an
//! [`Unraveler`] instead of an object reader. Each position decides whether
//! to expand from the evaluator context of its definition: expressions are
//! evaluated only once every name they may reference is available, and are
//! left in place for a later pass otherwise.

use crate::context::TemplateContext;
use crate::reader::{merge_context, string_key};
use crate::schema::{Definition, MappingDefinition, ScalarMatch, SchemaRegistry, ANY};
use crate::unraveler::Unraveler;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;
use weft_core::{FatalError, FatalResult, Span, TemplateError, Token, TokenKind};

/// Evaluate `template` against the definition named `type_name`.
///
/// `remove_bytes` is the budget charge still held for `template` itself and
/// is released once the walk has consumed it. Returns `None` only when the
/// type is unknown.
pub fn evaluate_template(
    context: &mut TemplateContext,
    type_name: &str,
    template: &Token,
    remove_bytes: usize,
    file_id: Option<usize>,
) -> FatalResult<Option<Token>> {
    let file_name = file_id.and_then(|id| context.file_name(id)).map(str::to_string);
    match &file_name {
        Some(name) => context.trace.info(&format!("Begin evaluating template '{}'", name)),
        None => context.trace.info("Begin evaluating template"),
    }

    let schema = Arc::clone(&context.schema);
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
            if remove_bytes > 0 {
                context.memory.subtract_bytes(remove_bytes)?;
            }
            return Ok(None);
        }
    };

    let available = context.available_context();
    let info = DefinitionInfo::root(root, &available);
    let unraveler = Unraveler::new(context, template, remove_bytes)?;
    let mut evaluator = TemplateEvaluator {
        context: &mut *context,
        schema: &schema,
        unraveler,
        available,
    };
    let token = evaluator.evaluate_value(&info)?;
    evaluator.unraveler.read_end(evaluator.context)?;

    match &file_name {
        Some(name) => context.trace.info(&format!("Finished evaluating template '{}'", name)),
        None => context.trace.info("Finished evaluating template"),
    }
    Ok(Some(token))
}

// ============================================================================
// DEFINITION CURSOR
// ============================================================================

#[derive(Debug, Clone)]
struct DefinitionInfo<'s> {
    definitions: Vec<&'s Definition>,
    allowed_context: Rc<[String]>,
    expand: bool,
}

impl<'s> DefinitionInfo<'s> {
    fn root(definition: &'s Definition, available: &HashSet<String>) -> Self {
        let allowed_context: Rc<[String]> = definition.evaluator_context.clone().into();
        let expand = !allowed_context.is_empty() && is_available(&allowed_context, available);
        Self {
            definitions: vec![definition],
            allowed_context,
            expand,
        }
    }

    /// A child position. A definition that declares its own context extends
    /// the inherited one and re-decides `expand`; otherwise both carry over.
    fn child(&self, schema: &'s SchemaRegistry, name: &str, available: &HashSet<String>) -> Self {
        let definitions: Vec<&'s Definition> = schema.get_definition(name).into_iter().collect();
        match definitions.first() {
            Some(definition) if !definition.evaluator_context.is_empty() => {
                let allowed_context = merge_context(&self.allowed_context, &definition.evaluator_context);
                let expand = is_available(&allowed_context, available);
                Self {
                    definitions,
                    allowed_context,
                    expand,
                }
            }
            _ => Self {
                definitions,
                allowed_context: Rc::clone(&self.allowed_context),
                expand: self.expand,
            },
        }
    }
}

fn is_available(allowed: &[String], available: &HashSet<String>) -> bool {
    allowed.iter().all(|entry| available.contains(&entry.to_lowercase()))
}

// ============================================================================
// EVALUATOR
// ============================================================================

struct TemplateEvaluator<'a, 's> {
    context: &'a mut TemplateContext,
    schema: &'s SchemaRegistry,
    unraveler: Unraveler,
    available: HashSet<String>,
}

impl<'a, 's> TemplateEvaluator<'a, 's> {
    fn evaluate_value(&mut self, info: &DefinitionInfo<'s>) -> FatalResult<Token> {
        // Scalar
        if let Some(scalar) = self.unraveler.allow_scalar(self.context, info.expand)? {
            return Ok(self.validate(scalar, info));
        }

        // Sequence
        if let Some(span) = self.unraveler.allow_sequence_start(self.context, info.expand)? {
            let mut items = Vec::new();
            match self.schema.sequence(&info.definitions) {
                Some(sequence) => {
                    let item_info = info.child(self.schema, &sequence.item_type, &self.available);
                    while !self.unraveler.allow_sequence_end(self.context, item_info.expand)? {
                        items.push(self.evaluate_value(&item_info)?);
                    }
                }
                None => {
                    self.context.error(span, TemplateError::UnexpectedSequence);
                    while !self.unraveler.allow_sequence_end(self.context, false)? {
                        self.unraveler.skip_sequence_item(self.context)?;
                    }
                }
            }
            return Ok(Token::sequence(items).with_span(span));
        }

        // Mapping
        if let Some(span) = self.unraveler.allow_mapping_start(self.context, info.expand)? {
            let candidates = self.schema.mappings(&info.definitions);
            let all_loose = match candidates.as_slice() {
                [mapping] => !self.schema.has_properties(mapping) && mapping.loose_key_type.is_some(),
                _ => false,
            };

            let pairs = if candidates.is_empty() {
                self.context.error(span, TemplateError::UnexpectedMapping);
                while !self.unraveler.allow_mapping_end(self.context, false)? {
                    self.unraveler.skip_mapping_key(self.context)?;
                    self.unraveler.skip_mapping_value(self.context)?;
                }
                Vec::new()
            } else if all_loose {
                let mapping = candidates[0];
                let key_info = self.loose_info(info, mapping.loose_key_type.as_deref());
                let value_info = self.loose_info(info, mapping.loose_value_type.as_deref());
                self.evaluate_loose_mapping(info, &key_info, &value_info)?
            } else {
                self.evaluate_well_known_mapping(info, candidates, span)?
            };
            return Ok(Token::mapping(pairs).with_span(span));
        }

        Err(FatalError::invariant("Expected a scalar value, a sequence, or a mapping"))
    }

    fn evaluate_well_known_mapping(
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

        while let Some(key) = self.unraveler.allow_scalar(self.context, info.expand)? {
            // Not expanded at this position
            if key.is_expression() {
                has_expression_key = true;
                let value_info = info.child(self.schema, ANY, &self.available);
                let value = self.evaluate_value(&value_info)?;
                pairs.push((key, value));
                continue;
            }

            let key = string_key(key);
            let name = key.as_str().unwrap_or_default().to_string();

            if !keys.insert(name.to_lowercase()) {
                self.context.error(key.span, TemplateError::DuplicateKey { key: name });
                self.unraveler.skip_mapping_value(self.context)?;
                continue;
            }

            // Well known
            if let Some(value_type) = self.schema.match_mapping_key(&mut candidates, &name) {
                let value_info = info.child(self.schema, value_type, &self.available);
                let value = self.evaluate_value(&value_info)?;
                pairs.push((key, value));
                continue;
            }

            // Loose
            if let Some((key_info, value_info)) = &loose {
                let key = self.validate(key, key_info);
                let value = self.evaluate_value(value_info)?;
                pairs.push((key, value));
                continue;
            }

            self.context.error(key.span, TemplateError::UnexpectedValue { value: name });
            self.unraveler.skip_mapping_value(self.context)?;
        }

        if !has_expression_key {
            if candidates.len() > 1 {
                let properties = self.schema.distinguishing_properties(&candidates).join(", ");
                self.context.error(span, TemplateError::AmbiguousOneOf { properties });
            } else if let Some(mapping) = candidates.first() {
                for name in self.schema.missing_required(mapping, &keys) {
                    self.context.error(span, TemplateError::MissingRequiredProperty { name });
                }
            }
        }

        self.unraveler.read_mapping_end(self.context)?;
        Ok(pairs)
    }

    fn evaluate_loose_mapping(
        &mut self,
        info: &DefinitionInfo<'s>,
        key_info: &DefinitionInfo<'s>,
        value_info: &DefinitionInfo<'s>,
    ) -> FatalResult<Vec<(Token, Token)>> {
        let mut pairs = Vec::new();
        let mut keys = HashSet::new();

        while let Some(key) = self.unraveler.allow_scalar(self.context, info.expand)? {
            if key.is_expression() {
                let value = match key.kind {
                    TokenKind::BasicExpression(_) => self.evaluate_value(value_info)?,
                    _ => {
                        let any = info.child(self.schema, ANY, &self.available);
                        self.evaluate_value(&any)?
                    }
                };
                pairs.push((key, value));
                continue;
            }

            let key = string_key(key);
            let name = key.as_str().unwrap_or_default().to_string();
            if !keys.insert(name.to_lowercase()) {
                self.context.error(key.span, TemplateError::DuplicateKey { key: name });
                self.unraveler.skip_mapping_value(self.context)?;
                continue;
            }

            let key = self.validate(key, key_info);
            let value = self.evaluate_value(value_info)?;
            pairs.push((key, value));
        }

        self.unraveler.read_mapping_end(self.context)?;
        Ok(pairs)
    }

    fn loose_info(&self, info: &DefinitionInfo<'s>, name: Option<&str>) -> DefinitionInfo<'s> {
        info.child(self.schema, name.unwrap_or(ANY), &self.available)
    }

    /// Literals must match a scalar alternative of the position. Unexpanded
    /// expressions and directives pass through untouched for a later pass.
    fn validate(&mut self, scalar: Token, info: &DefinitionInfo<'s>) -> Token {
        if !scalar.is_literal() {
            return scalar;
        }
        match self.schema.match_scalar(&info.definitions, &scalar) {
            ScalarMatch::Matched(_) => scalar,
            ScalarMatch::Coerced(coerced, _) => coerced,
            ScalarMatch::NoMatch => {
                let value = scalar.to_string();
                self.context.error(scalar.span, TemplateError::UnexpectedValue { value });
                scalar
            }
        }
    }
}
