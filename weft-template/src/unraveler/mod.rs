//! Unraveler: a pull cursor over a token tree that expands expressions and
//! directives on request
//!
//! The cursor keeps an explicit stack of [`Frame`]s, one per token on the
//! path from the root. Callers ask for the next event with an `expand` flag;
//! when it is set, expressions and directives at the current position are
//! evaluated and their results spliced into the event stream. Every frame
//! charges its bytes and one level of depth to the context's memory budget
//! while it is on the stack.

mod frame;

use crate::context::TemplateContext;
use crate::reader::directive_name;
use frame::{Frame, FrameState};
use std::sync::Arc;
use weft_core::{
    FatalError, FatalResult, MemoryBudget, Span, TemplateError, Token, TokenKind, MIN_OBJECT_SIZE,
};

/// Where the top frame sits relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Root,
    SequenceItem,
    MappingKey,
    MappingValue,
    /// Directly under an expression or directive frame.
    Nested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expansion {
    SequenceItem,
    MappingKey,
    /// Mapping value or document root.
    Value,
    Insert,
    Conditional,
    Each,
    /// One-pair mapping in a sequence whose key is a conditional or `each`.
    SequenceDirective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stop,
    Expand(Expansion),
    EndExpression,
    CloseSplice,
    NextEach,
    NotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Sequence,
    Mapping,
}

impl Shape {
    fn matches(self, token: &Token) -> bool {
        match self {
            Shape::Sequence => matches!(token.kind, TokenKind::Sequence(_)),
            Shape::Mapping => matches!(token.kind, TokenKind::Mapping(_)),
        }
    }

    fn error(self) -> TemplateError {
        match self {
            Shape::Sequence => TemplateError::ExpectedSequence,
            Shape::Mapping => TemplateError::ExpectedMapping,
        }
    }
}

/// Pull cursor over one token tree.
#[derive(Debug)]
pub struct Unraveler {
    stack: Vec<Frame>,
    expanded: bool,
}

impl Unraveler {
    /// Start a cursor at `template`. `remove_bytes` is released from the
    /// budget once the root has been consumed.
    pub fn new(context: &mut TemplateContext, template: &Token, remove_bytes: usize) -> FatalResult<Self> {
        if !(template.is_literal()
            || matches!(
                template.kind,
                TokenKind::Sequence(_) | TokenKind::Mapping(_) | TokenKind::BasicExpression(_)
            ))
        {
            return Err(FatalError::invariant(format!(
                "Unexpected '{}' token at the template root",
                template.type_name()
            )));
        }

        let mut unraveler = Self {
            stack: Vec::new(),
            expanded: false,
        };
        context.memory.increment_events()?;
        unraveler.push(context, template.clone(), remove_bytes, false)?;
        Ok(unraveler)
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub fn allow_scalar(&mut self, context: &mut TemplateContext, expand: bool) -> FatalResult<Option<Token>> {
        self.prepare(context, expand)?;
        let token = match self.stack.last() {
            Some(frame) if frame.is_scalar_event() => frame.token.clone(),
            _ => return Ok(None),
        };
        context.memory.add_token(&token, false)?;
        self.move_next(context, false)?;
        Ok(Some(token))
    }

    pub fn allow_sequence_start(&mut self, context: &mut TemplateContext, expand: bool) -> FatalResult<Option<Span>> {
        self.prepare(context, expand)?;
        let span = match self.stack.last() {
            Some(frame) if frame.is_container_start() && matches!(frame.state, FrameState::Sequence(_)) => {
                frame.token.span
            }
            _ => return Ok(None),
        };
        context.memory.add_bytes(MIN_OBJECT_SIZE)?;
        self.move_next(context, false)?;
        Ok(Some(span))
    }

    pub fn allow_sequence_end(&mut self, context: &mut TemplateContext, expand: bool) -> FatalResult<bool> {
        self.prepare(context, expand)?;
        match self.stack.last() {
            Some(frame) if frame.is_container_end() && matches!(frame.state, FrameState::Sequence(_)) => {
                self.move_next(context, false)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn allow_mapping_start(&mut self, context: &mut TemplateContext, expand: bool) -> FatalResult<Option<Span>> {
        self.prepare(context, expand)?;
        let span = match self.stack.last() {
            Some(frame) if frame.is_container_start() && matches!(frame.state, FrameState::Mapping(_)) => {
                frame.token.span
            }
            _ => return Ok(None),
        };
        context.memory.add_bytes(MIN_OBJECT_SIZE)?;
        self.move_next(context, false)?;
        Ok(Some(span))
    }

    pub fn allow_mapping_end(&mut self, context: &mut TemplateContext, expand: bool) -> FatalResult<bool> {
        self.prepare(context, expand)?;
        match self.stack.last() {
            Some(frame) if frame.is_container_end() && matches!(frame.state, FrameState::Mapping(_)) => {
                self.move_next(context, false)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn read_mapping_end(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        if self.allow_mapping_end(context, false)? {
            Ok(())
        } else {
            Err(self.unexpected("Unexpected state while reading the mapping end"))
        }
    }

    /// The cursor must be exhausted.
    pub fn read_end(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        context.memory.increment_events()?;
        if self.stack.is_empty() {
            Ok(())
        } else {
            Err(self.unexpected("Expected end of template object"))
        }
    }

    pub fn skip_sequence_item(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        context.memory.increment_events()?;
        if self.position() != Position::SequenceItem {
            return Err(self.unexpected("Unexpected state while skipping a sequence item"));
        }
        self.move_next(context, true)
    }

    pub fn skip_mapping_key(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        context.memory.increment_events()?;
        if self.position() != Position::MappingKey {
            return Err(self.unexpected("Unexpected state while skipping a mapping key"));
        }
        self.move_next(context, true)
    }

    pub fn skip_mapping_value(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        context.memory.increment_events()?;
        if self.position() != Position::MappingValue {
            return Err(self.unexpected("Unexpected state while skipping a mapping value"));
        }
        self.move_next(context, true)
    }

    fn prepare(&mut self, context: &mut TemplateContext, expand: bool) -> FatalResult<()> {
        context.memory.increment_events()?;
        if expand {
            self.unravel(context, true)?;
        }
        Ok(())
    }

    /// Consume the current event. With `skip_nested`, a container is
    /// dropped whole instead of being entered.
    fn move_next(&mut self, context: &mut TemplateContext, skip_nested: bool) -> FatalResult<()> {
        context.memory.increment_events()?;

        let enter = match self.stack.last() {
            None => return Ok(()),
            Some(frame) => !skip_nested && frame.is_container_start(),
        };

        if enter {
            self.next_child(context)?;
        } else {
            self.pop(context)?;
            if self.stack.last().is_some_and(|parent| parent.container().is_some()) {
                self.next_child(context)?;
            }
        }

        self.expanded = false;
        self.unravel(context, false)
    }

    // ========================================================================
    // STACK
    // ========================================================================

    fn push(&mut self, context: &mut TemplateContext, token: Token, remove_bytes: usize, spliced: bool) -> FatalResult<()> {
        context.memory.add_token(&token, false)?;
        context.memory.increment_depth()?;
        let mut frame = Frame::new(token, remove_bytes);
        if let Some(state) = frame.container_mut().filter(|_| spliced) {
            state.spliced = true;
        }
        self.stack.push(frame);
        if spliced {
            self.next_child(context)?;
        }
        Ok(())
    }

    fn pop(&mut self, context: &mut TemplateContext) -> FatalResult<Option<Frame>> {
        let Some(frame) = self.stack.pop() else {
            return Ok(None);
        };
        context.memory.subtract_token(&frame.token, false)?;
        context.memory.decrement_depth();
        if frame.remove_bytes > 0 {
            context.memory.subtract_bytes(frame.remove_bytes)?;
        }
        Ok(Some(frame))
    }

    /// Advance the container on top and push its next child, if any.
    fn next_child(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let child = match self.stack.last_mut() {
            Some(frame) => {
                frame.advance();
                frame.current_child()
            }
            None => None,
        };
        match child {
            Some(child) => self.push(context, child, 0, false),
            None => Ok(()),
        }
    }

    fn position(&self) -> Position {
        let parent = self.stack.len().checked_sub(2).and_then(|i| self.stack.get(i));
        match parent.map(|frame| &frame.state) {
            None => Position::Root,
            Some(FrameState::Sequence(_)) => Position::SequenceItem,
            Some(FrameState::Mapping(state)) if state.is_key => Position::MappingKey,
            Some(FrameState::Mapping(_)) => Position::MappingValue,
            Some(_) => Position::Nested,
        }
    }

    fn parent_mut(&mut self) -> Option<&mut Frame> {
        let index = self.stack.len().checked_sub(2)?;
        self.stack.get_mut(index)
    }

    fn top_mut(&mut self) -> FatalResult<&mut Frame> {
        match self.stack.last_mut() {
            Some(frame) => Ok(frame),
            None => Err(FatalError::invariant("Unexpected end of template object")),
        }
    }

    fn top_token(&self) -> FatalResult<Token> {
        match self.stack.last() {
            Some(frame) => Ok(frame.token.clone()),
            None => Err(FatalError::invariant("Unexpected end of template object")),
        }
    }

    fn unexpected(&self, message: &str) -> FatalError {
        let state: Vec<String> = self.stack.iter().map(ToString::to_string).collect();
        FatalError::invariant(format!("{}. State: [{}]", message, state.join(" > ")))
    }

    // ========================================================================
    // UNRAVEL
    // ========================================================================

    fn step(&self) -> FatalResult<Step> {
        let Some(top) = self.stack.last() else {
            return Ok(Step::Stop);
        };
        let position = self.position();
        let parent_is_each = self
            .stack
            .len()
            .checked_sub(2)
            .and_then(|i| self.stack.get(i))
            .is_some_and(|parent| matches!(parent.state, FrameState::Each(_)));

        let step = match &top.state {
            FrameState::Literal => Step::Stop,

            FrameState::Expression { is_start: true } => match position {
                Position::SequenceItem => Step::Expand(Expansion::SequenceItem),
                Position::MappingKey => Step::Expand(Expansion::MappingKey),
                Position::MappingValue | Position::Root => Step::Expand(Expansion::Value),
                Position::Nested => return Err(self.unexpected("Unexpected expression position")),
            },
            FrameState::Expression { is_start: false }
            | FrameState::Insert { is_start: false }
            | FrameState::Conditional { is_start: false, .. } => Step::EndExpression,

            FrameState::Insert { is_start: true } => match position {
                Position::MappingKey => Step::Expand(Expansion::Insert),
                _ => Step::NotAllowed,
            },
            FrameState::Conditional { is_start: true, body } => match position {
                Position::MappingKey => Step::Expand(Expansion::Conditional),
                Position::SequenceItem if body.is_some() => Step::Expand(Expansion::Conditional),
                _ => Step::NotAllowed,
            },

            FrameState::Each(each) if each.is_end() => Step::EndExpression,
            FrameState::Each(each) if each.items.is_some() => Step::NextEach,
            FrameState::Each(each) => match position {
                Position::MappingKey => Step::Expand(Expansion::Each),
                Position::SequenceItem if each.body.is_some() => Step::Expand(Expansion::Each),
                _ => Step::NotAllowed,
            },

            FrameState::Sequence(state) | FrameState::Mapping(state)
                if state.spliced && top.is_container_end() =>
            {
                if parent_is_each {
                    Step::NextEach
                } else {
                    Step::CloseSplice
                }
            }
            FrameState::Mapping(state)
                if state.is_start && position == Position::SequenceItem && is_sequence_directive(&top.token) =>
            {
                Step::Expand(Expansion::SequenceDirective)
            }
            FrameState::Sequence(_) | FrameState::Mapping(_) => Step::Stop,
        };
        Ok(step)
    }

    fn unravel(&mut self, context: &mut TemplateContext, expand: bool) -> FatalResult<()> {
        if self.expanded {
            return Ok(());
        }

        loop {
            match self.step()? {
                Step::Stop => break,
                Step::Expand(_) if !expand => break,
                Step::Expand(expansion) => self.expand(context, expansion)?,
                Step::EndExpression => self.end_expression(context)?,
                Step::CloseSplice => {
                    self.pop(context)?;
                }
                Step::NextEach => {
                    if self.stack.last().is_some_and(|frame| frame.container().is_some()) {
                        self.pop(context)?;
                    }
                    self.next_each(context)?;
                }
                Step::NotAllowed => {
                    let token = self.top_token()?;
                    context.error(
                        token.span,
                        TemplateError::DirectiveNotAllowed {
                            directive: directive_name(&token).to_string(),
                        },
                    );
                    self.replace_with_literal(context)?;
                }
            }
            context.memory.increment_events()?;
        }

        self.expanded = expand;
        Ok(())
    }

    fn expand(&mut self, context: &mut TemplateContext, expansion: Expansion) -> FatalResult<()> {
        match expansion {
            Expansion::SequenceItem => self.expand_sequence_item(context),
            Expansion::MappingKey => self.expand_mapping_key(context),
            Expansion::Value => self.expand_value(context),
            Expansion::Insert => self.expand_insert(context),
            Expansion::Conditional => self.expand_conditional(context),
            Expansion::Each => self.expand_each(context),
            Expansion::SequenceDirective => self.expand_sequence_directive(context),
        }
    }

    /// A sequence item expression. A sequence result is spliced into the
    /// parent; a failed evaluation drops the item.
    fn expand_sequence_item(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let token = self.top_token()?;
        let value = evaluate_expression(context, &token);
        self.top_mut()?.finish();
        if let Some(value) = value {
            let bytes = charge(context, &value)?;
            let spliced = matches!(value.kind, TokenKind::Sequence(_));
            self.push(context, value, bytes, spliced)?;
        }
        Ok(())
    }

    /// A mapping key expression must produce a scalar. Otherwise the pair
    /// is dropped.
    fn expand_mapping_key(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let token = self.top_token()?;
        let key = match evaluate_expression(context, &token) {
            Some(value) if matches!(value.kind, TokenKind::String(_)) => Some(value),
            Some(value) if value.is_literal() => Some(Token::string(value.to_string()).with_span(value.span)),
            Some(_) => {
                context.error(token.span, TemplateError::ExpectedString);
                None
            }
            None => None,
        };

        match key {
            Some(key) => {
                self.top_mut()?.finish();
                let bytes = charge(context, &key)?;
                self.push(context, key, bytes, false)
            }
            None => {
                self.pop(context)?;
                if let Some(parent) = self.stack.last_mut() {
                    parent.advance();
                }
                self.next_child(context)
            }
        }
    }

    /// A mapping value or root expression. Failures collapse to an empty string.
    fn expand_value(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let token = self.top_token()?;
        let value = evaluate_expression(context, &token).unwrap_or_else(|| Token::string("").with_span(token.span));
        self.top_mut()?.finish();
        let bytes = charge(context, &value)?;
        self.push(context, value, bytes, false)
    }

    fn expand_insert(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let body = self.parent_value()?;
        let resolved = self.resolve_body(context, body, Shape::Mapping)?;
        self.top_mut()?.finish();
        self.splice(context, resolved)
    }

    fn expand_conditional(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let token = self.top_token()?;
        let position = self.position();
        let chain_open = self
            .parent_mut()
            .and_then(|parent| parent.container())
            .is_some_and(|state| state.index > 0 && state.chain == Some((state.index - 1, true)));

        let (take, open) = match &token.kind {
            TokenKind::If(condition) => evaluate_condition(context, condition, token.span),
            TokenKind::ElseIf(condition) if chain_open => evaluate_condition(context, condition, token.span),
            TokenKind::Else if chain_open => (true, false),
            _ => (false, false),
        };

        if let Some(state) = self.parent_mut().and_then(Frame::container_mut) {
            state.chain = Some((state.index, open));
        }

        if !take {
            self.top_mut()?.finish();
            return Ok(());
        }

        let (body, shape) = self.directive_body(position)?;
        let resolved = self.resolve_body(context, body, shape)?;
        self.top_mut()?.finish();
        self.splice(context, resolved)
    }

    fn expand_each(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let token = self.top_token()?;
        let TokenKind::Each { variable, collection } = &token.kind else {
            return Err(self.unexpected("Expected an each directive"));
        };

        if context.values.contains(variable) {
            context.error(
                token.span,
                TemplateError::VariableAlreadyDefined {
                    name: variable.to_string(),
                },
            );
            return self.replace_with_literal(context);
        }

        let position = self.position();
        let (body, _) = self.directive_body(position)?;
        let items = match evaluate_text(context, collection, token.span) {
            Some(value) => match &value.kind {
                TokenKind::Sequence(items) => items.to_vec(),
                TokenKind::Mapping(pairs) => pairs
                    .iter()
                    .map(|(key, value)| {
                        Token::mapping(vec![
                            (Token::string("key"), key.clone()),
                            (Token::string("value"), value.clone()),
                        ])
                    })
                    .collect(),
                _ => {
                    context.error(token.span, TemplateError::ExpectedSequence);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        if let FrameState::Each(each) = &mut self.top_mut()?.state {
            each.items = Some(items);
            each.index = 0;
            each.body = Some(body);
        }
        self.next_each(context)
    }

    /// Bind the next item of the `each` frame on top and splice a copy of
    /// its body. Items whose body comes out empty are passed over.
    fn next_each(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let shape = match self.position() {
            Position::MappingKey => Shape::Mapping,
            _ => Shape::Sequence,
        };

        loop {
            let (variable, item, body) = {
                let Some(Frame {
                    token,
                    state: FrameState::Each(each),
                    ..
                }) = self.stack.last_mut()
                else {
                    return Err(FatalError::invariant("Expected an each directive frame"));
                };
                let TokenKind::Each { variable, .. } = &token.kind else {
                    return Err(FatalError::invariant("Expected an each directive token"));
                };
                let Some(item) = each.items.as_ref().and_then(|items| items.get(each.index)).cloned() else {
                    return Ok(());
                };
                each.index += 1;
                (Arc::clone(variable), item, each.body.clone())
            };

            context.values.insert(&variable, item);
            let Some(body) = body else {
                return Err(self.unexpected("Each directive has no body"));
            };
            match self.resolve_body(context, body, shape)? {
                Some((body, bytes)) if !is_empty(&body) => return self.push(context, body, bytes, true),
                Some((_, bytes)) if bytes > 0 => context.memory.subtract_bytes(bytes)?,
                _ => {}
            }
        }
    }

    /// Replace a one-pair `{ directive: body }` sequence item with a frame
    /// for the directive that carries its body.
    fn expand_sequence_directive(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let Some(frame) = self.pop(context)? else {
            return Err(FatalError::invariant("Unexpected end of template object"));
        };
        let Some((key, value)) = frame.token.as_mapping().and_then(|pairs| pairs.first()).cloned() else {
            return Err(self.unexpected("Expected a one-pair mapping"));
        };

        self.push(context, key, 0, false)?;
        match &mut self.top_mut()?.state {
            FrameState::Conditional { body, .. } => *body = Some(value),
            FrameState::Each(each) => each.body = Some(value),
            _ => return Err(self.unexpected("Expected a directive frame")),
        }
        Ok(())
    }

    fn end_expression(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let Some(frame) = self.pop(context)? else {
            return Ok(());
        };

        if let (FrameState::Each(each), TokenKind::Each { variable, .. }) = (&frame.state, &frame.token.kind) {
            if each.items.is_some() {
                context.values.remove(variable);
            }
        }

        // A directive key has no replacement value, so its pair is skipped.
        let is_directive = !matches!(frame.state, FrameState::Expression { .. });
        let Some(parent) = self.stack.last_mut() else {
            return Ok(());
        };
        match parent.state {
            FrameState::Sequence(_) => {}
            FrameState::Mapping(_) if is_directive => parent.advance(),
            FrameState::Mapping(_) => {}
            _ => return Err(self.unexpected("Unexpected parent of an expression")),
        }
        self.next_child(context)
    }

    fn replace_with_literal(&mut self, context: &mut TemplateContext) -> FatalResult<()> {
        let Some(frame) = self.pop(context)? else {
            return Ok(());
        };
        let literal = Token::string(frame.token.to_string()).with_span(frame.token.span);
        self.push(context, literal, 0, false)
    }

    /// Value of the pair whose key is the directive on top.
    fn parent_value(&mut self) -> FatalResult<Token> {
        match self.parent_mut().and_then(|parent| parent.current_value()) {
            Some(value) => Ok(value),
            None => Err(self.unexpected("Expected a mapping value for the directive")),
        }
    }

    fn directive_body(&mut self, position: Position) -> FatalResult<(Token, Shape)> {
        if position == Position::MappingKey {
            return Ok((self.parent_value()?, Shape::Mapping));
        }
        let body = match &self.top_mut()?.state {
            FrameState::Conditional { body, .. } => body.clone(),
            FrameState::Each(each) => each.body.clone(),
            _ => None,
        };
        match body {
            Some(body) => Ok((body, Shape::Sequence)),
            None => Err(self.unexpected("Directive has no body")),
        }
    }

    /// The body as the required shape, evaluating it when it is an
    /// expression. Returns the charged bytes along with the body.
    fn resolve_body(&mut self, context: &mut TemplateContext, body: Token, shape: Shape) -> FatalResult<Option<(Token, usize)>> {
        if shape.matches(&body) {
            return Ok(Some((body, 0)));
        }
        if matches!(body.kind, TokenKind::BasicExpression(_)) {
            let Some(value) = evaluate_expression(context, &body) else {
                return Ok(None);
            };
            if shape.matches(&value) {
                let bytes = charge(context, &value)?;
                return Ok(Some((value, bytes)));
            }
        }
        context.error(body.span, shape.error());
        Ok(None)
    }

    /// Push a resolved directive body as an insertion, or release its bytes
    /// when there is nothing to insert.
    fn splice(&mut self, context: &mut TemplateContext, resolved: Option<(Token, usize)>) -> FatalResult<()> {
        match resolved {
            Some((body, bytes)) if !is_empty(&body) => self.push(context, body, bytes, true),
            Some((_, bytes)) if bytes > 0 => context.memory.subtract_bytes(bytes),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn is_sequence_directive(mapping: &Token) -> bool {
    match mapping.as_mapping().map(|pairs| &pairs[..]) {
        Some([(key, value)]) => {
            matches!(
                key.kind,
                TokenKind::If(_) | TokenKind::ElseIf(_) | TokenKind::Else | TokenKind::Each { .. }
            ) && matches!(value.kind, TokenKind::Sequence(_) | TokenKind::BasicExpression(_))
        }
        _ => false,
    }
}

fn is_empty(token: &Token) -> bool {
    match &token.kind {
        TokenKind::Sequence(items) => items.is_empty(),
        TokenKind::Mapping(pairs) => pairs.is_empty(),
        _ => false,
    }
}

fn evaluate_expression(context: &mut TemplateContext, token: &Token) -> Option<Token> {
    match &token.kind {
        TokenKind::BasicExpression(text) => evaluate_text(context, text, token.span),
        _ => None,
    }
}

/// Evaluate expression text, recording a failure against `span`. Results
/// without a position take the expression's.
fn evaluate_text(context: &mut TemplateContext, text: &str, span: Span) -> Option<Token> {
    match context.expressions.evaluate(text, &context.values) {
        Ok(value) if value.span.is_empty() => Some(value.with_span(span)),
        Ok(value) => Some(value),
        Err(error) => {
            context.error(
                span,
                TemplateError::ExpressionFailed {
                    message: error.to_string(),
                },
            );
            None
        }
    }
}

/// Conditions use truthiness. Returns whether the branch is taken and
/// whether the chain stays open. A failed condition closes the chain.
fn evaluate_condition(context: &mut TemplateContext, condition: &str, span: Span) -> (bool, bool) {
    match evaluate_text(context, condition, span) {
        Some(value) => {
            let truthy = value.is_truthy();
            (truthy, !truthy)
        }
        None => (false, false),
    }
}

/// Charge an expression result to the budget, nested tokens included.
fn charge(context: &mut TemplateContext, value: &Token) -> FatalResult<usize> {
    let bytes = MemoryBudget::calculate_bytes(value, true);
    context.memory.add_bytes(bytes)?;
    Ok(bytes)
}
