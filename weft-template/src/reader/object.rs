//! Object-model adapters
//!
//! A source document reaches the reader as a flat stream of literal and
//! container events pulled through [`ObjectReader`].

use once_cell::sync::Lazy;
use regex::Regex;
use saphyr_parser::{Event, Parser, ScalarStyle};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use weft_core::{FatalError, FatalResult, Span, Token, TokenKind};

/// Pull interface over a tokenized source document. Each `allow_*` call
/// consumes the next event only when it has the requested shape.
pub trait ObjectReader {
    fn allow_literal(&mut self) -> Option<Token>;
    fn allow_sequence_start(&mut self) -> Option<Span>;
    fn allow_sequence_end(&mut self) -> bool;
    fn allow_mapping_start(&mut self) -> Option<Span>;
    fn allow_mapping_end(&mut self) -> bool;
    fn validate_start(&mut self) -> FatalResult<()>;
    fn validate_end(&mut self) -> FatalResult<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent {
    /// Null, boolean, number or string.
    Literal(Token),
    SequenceStart(Span),
    SequenceEnd,
    MappingStart(Span),
    MappingEnd,
}

/// Adapter over a pre-built event list.
#[derive(Debug, Clone, Default)]
pub struct EventObjectReader {
    events: VecDeque<ObjectEvent>,
    started: bool,
}

impl EventObjectReader {
    pub fn new(events: Vec<ObjectEvent>) -> Self {
        Self {
            events: events.into(),
            started: false,
        }
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Events for a token tree. Expressions and directives are emitted as
    /// their `${{ }}` text so the reader parses them again.
    pub fn from_token(root: &Token) -> Self {
        enum Work<'a> {
            Token(&'a Token),
            SequenceEnd,
            MappingEnd,
        }

        let mut events = Vec::new();
        let mut stack = vec![Work::Token(root)];
        while let Some(work) = stack.pop() {
            let token = match work {
                Work::Token(token) => token,
                Work::SequenceEnd => {
                    events.push(ObjectEvent::SequenceEnd);
                    continue;
                }
                Work::MappingEnd => {
                    events.push(ObjectEvent::MappingEnd);
                    continue;
                }
            };

            match &token.kind {
                TokenKind::Sequence(items) => {
                    events.push(ObjectEvent::SequenceStart(token.span));
                    stack.push(Work::SequenceEnd);
                    stack.extend(items.iter().rev().map(Work::Token));
                }
                TokenKind::Mapping(pairs) => {
                    events.push(ObjectEvent::MappingStart(token.span));
                    stack.push(Work::MappingEnd);
                    for (key, value) in pairs.iter().rev() {
                        stack.push(Work::Token(value));
                        stack.push(Work::Token(key));
                    }
                }
                _ if token.is_literal() => events.push(ObjectEvent::Literal(token.clone())),
                _ => events.push(ObjectEvent::Literal(
                    Token::string(token.to_string()).with_span(token.span),
                )),
            }
        }
        Self::new(events)
    }

    /// Events for a JSON value. Object keys keep their source order.
    pub fn from_json(root: &serde_json::Value) -> Self {
        use serde_json::Value;

        enum Work<'a> {
            Value(&'a Value),
            Key(&'a str),
            SequenceEnd,
            MappingEnd,
        }

        let mut events = Vec::new();
        let mut stack = vec![Work::Value(root)];
        while let Some(work) = stack.pop() {
            match work {
                Work::SequenceEnd => events.push(ObjectEvent::SequenceEnd),
                Work::MappingEnd => events.push(ObjectEvent::MappingEnd),
                Work::Key(key) => events.push(ObjectEvent::Literal(Token::string(key))),
                Work::Value(Value::Array(items)) => {
                    events.push(ObjectEvent::SequenceStart(Span::default()));
                    stack.push(Work::SequenceEnd);
                    stack.extend(items.iter().rev().map(Work::Value));
                }
                Work::Value(Value::Object(map)) => {
                    events.push(ObjectEvent::MappingStart(Span::default()));
                    stack.push(Work::MappingEnd);
                    let pairs: Vec<_> = map.iter().collect();
                    for (key, value) in pairs.into_iter().rev() {
                        stack.push(Work::Value(value));
                        stack.push(Work::Key(key));
                    }
                }
                Work::Value(scalar) => events.push(ObjectEvent::Literal(Token::from_json(scalar))),
            }
        }
        Self::new(events)
    }

    pub fn from_json_str(source: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(source)?;
        Ok(Self::from_json(&value))
    }

    /// Events for a single YAML document, each carrying the 1-based line
    /// and column it starts at. Plain scalars resolve by the YAML 1.2 core
    /// schema, tags are dropped and aliases replay their anchored events.
    /// An empty stream reads as null.
    pub fn from_yaml_str(source: &str) -> Result<Self, YamlError> {
        let mut builder = YamlEvents::default();
        for item in Parser::new_from_str(source) {
            let (event, span) = item.map_err(|e| YamlError::Scan { message: e.to_string() })?;
            builder.push(event, Span::at(span.start.line(), span.start.col() + 1))?;
        }
        if builder.events.is_empty() {
            builder.events.push(ObjectEvent::Literal(Token::null()));
        }
        Ok(Self::new(builder.events))
    }

    fn next_if(&mut self, matches: impl FnOnce(&ObjectEvent) -> bool) -> Option<ObjectEvent> {
        if self.events.front().is_some_and(matches) {
            self.events.pop_front()
        } else {
            None
        }
    }
}

// ============================================================================
// YAML
// ============================================================================

/// Upper bound on events copied by alias replay in one document.
pub const MAX_ALIAS_EVENTS: usize = 100_000;

static PLAIN_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(\.[0-9]+|[0-9]+(\.[0-9]*)?)([eE][-+]?[0-9]+)?$").expect("number pattern is valid")
});

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum YamlError {
    #[error("{message}")]
    Scan { message: String },

    #[error("Multiple documents are not supported")]
    MultipleDocuments,

    #[error("Alias refers to unknown anchor {anchor}")]
    UnknownAnchor { anchor: usize },

    #[error("Alias expansion exceeds {limit} events")]
    AliasExpansion { limit: usize },
}

/// An open container while building YAML events.
struct Frame {
    mapping: bool,
    /// The next child of a mapping is a key.
    expect_key: bool,
    start: usize,
    anchor: usize,
}

#[derive(Default)]
struct YamlEvents {
    events: Vec<ObjectEvent>,
    frames: Vec<Frame>,
    anchors: HashMap<usize, Vec<ObjectEvent>>,
    replayed: usize,
    documents: usize,
}

impl YamlEvents {
    fn push(&mut self, event: Event<'_>, span: Span) -> Result<(), YamlError> {
        let start = self.events.len();
        match event {
            Event::DocumentStart(..) => {
                self.documents += 1;
                if self.documents > 1 {
                    return Err(YamlError::MultipleDocuments);
                }
            }
            Event::Scalar(value, style, anchor, ..) => {
                let token = scalar_token(&value, matches!(style, ScalarStyle::Plain));
                self.events.push(ObjectEvent::Literal(token.with_span(span)));
                self.finish_node(start, anchor);
            }
            Event::Alias(anchor) => {
                let replay = self.anchors.get(&anchor).ok_or(YamlError::UnknownAnchor { anchor })?;
                self.replayed += replay.len();
                if self.replayed > MAX_ALIAS_EVENTS {
                    return Err(YamlError::AliasExpansion {
                        limit: MAX_ALIAS_EVENTS,
                    });
                }
                self.events.extend(replay.iter().cloned());
                self.finish_node(start, 0);
            }
            Event::SequenceStart(anchor, ..) => {
                self.events.push(ObjectEvent::SequenceStart(span));
                self.open(false, start, anchor);
            }
            Event::MappingStart(anchor, ..) => {
                self.events.push(ObjectEvent::MappingStart(span));
                self.open(true, start, anchor);
            }
            Event::SequenceEnd => self.close(ObjectEvent::SequenceEnd),
            Event::MappingEnd => self.close(ObjectEvent::MappingEnd),
            _ => {}
        }
        Ok(())
    }

    fn open(&mut self, mapping: bool, start: usize, anchor: usize) {
        self.frames.push(Frame {
            mapping,
            expect_key: mapping,
            start,
            anchor,
        });
    }

    fn close(&mut self, end: ObjectEvent) {
        self.events.push(end);
        if let Some(frame) = self.frames.pop() {
            self.finish_node(frame.start, frame.anchor);
        }
    }

    /// Record the anchor of the node that began at `start`, and collapse a
    /// container in key position into one string literal.
    fn finish_node(&mut self, start: usize, anchor: usize) {
        if anchor != 0 {
            self.anchors.insert(anchor, self.events[start..].to_vec());
        }

        let Some(parent) = self.frames.last_mut() else {
            return;
        };
        if !parent.mapping {
            return;
        }
        let is_key = parent.expect_key;
        parent.expect_key = !is_key;

        if is_key && !matches!(&self.events[start..], [ObjectEvent::Literal(_)]) {
            let span = match &self.events[start] {
                ObjectEvent::Literal(token) => token.span,
                ObjectEvent::SequenceStart(span) | ObjectEvent::MappingStart(span) => *span,
                _ => Span::default(),
            };
            let text = fold_events(&self.events[start..]).to_json().to_string();
            self.events.truncate(start);
            self.events.push(ObjectEvent::Literal(Token::string(text).with_span(span)));
        }
    }
}

/// Rebuild the token tree of one complete node.
fn fold_events(events: &[ObjectEvent]) -> Token {
    let mut open: Vec<(Span, bool, Vec<Token>)> = Vec::new();
    let mut root = None;
    for event in events {
        let token = match event {
            ObjectEvent::Literal(token) => token.clone(),
            ObjectEvent::SequenceStart(span) => {
                open.push((*span, false, Vec::new()));
                continue;
            }
            ObjectEvent::MappingStart(span) => {
                open.push((*span, true, Vec::new()));
                continue;
            }
            ObjectEvent::SequenceEnd | ObjectEvent::MappingEnd => {
                let Some((span, mapping, items)) = open.pop() else {
                    continue;
                };
                let token = if mapping {
                    let pairs = items
                        .chunks_exact(2)
                        .map(|pair| (pair[0].clone(), pair[1].clone()))
                        .collect();
                    Token::mapping(pairs)
                } else {
                    Token::sequence(items)
                };
                token.with_span(span)
            }
        };
        match open.last_mut() {
            Some((_, _, items)) => items.push(token),
            None => root = Some(token),
        }
    }
    root.unwrap_or_else(Token::null)
}

/// Quoted and block scalars are always strings.
fn scalar_token(value: &str, plain: bool) -> Token {
    if !plain {
        return Token::string(value);
    }
    match value {
        "" | "~" | "null" | "Null" | "NULL" => return Token::null(),
        "true" | "True" | "TRUE" => return Token::boolean(true),
        "false" | "False" | "FALSE" => return Token::boolean(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => return Token::number(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => return Token::number(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return Token::number(f64::NAN),
        _ => {}
    }

    let radix = [("0x", 16), ("0o", 8)]
        .iter()
        .find_map(|(prefix, radix)| value.strip_prefix(prefix).map(|digits| (digits, *radix)));
    if let Some((digits, radix)) = radix {
        return match i64::from_str_radix(digits, radix) {
            Ok(number) if !digits.starts_with(['+', '-']) => Token::number(number as f64),
            _ => Token::string(value),
        };
    }

    if PLAIN_NUMBER.is_match(value) {
        if let Ok(number) = value.parse::<f64>() {
            return Token::number(number);
        }
    }
    Token::string(value)
}

impl ObjectReader for EventObjectReader {
    fn allow_literal(&mut self) -> Option<Token> {
        match self.next_if(|event| matches!(event, ObjectEvent::Literal(_)))? {
            ObjectEvent::Literal(token) => Some(token),
            _ => None,
        }
    }

    fn allow_sequence_start(&mut self) -> Option<Span> {
        match self.next_if(|event| matches!(event, ObjectEvent::SequenceStart(_)))? {
            ObjectEvent::SequenceStart(span) => Some(span),
            _ => None,
        }
    }

    fn allow_sequence_end(&mut self) -> bool {
        self.next_if(|event| matches!(event, ObjectEvent::SequenceEnd)).is_some()
    }

    fn allow_mapping_start(&mut self) -> Option<Span> {
        match self.next_if(|event| matches!(event, ObjectEvent::MappingStart(_)))? {
            ObjectEvent::MappingStart(span) => Some(span),
            _ => None,
        }
    }

    fn allow_mapping_end(&mut self) -> bool {
        self.next_if(|event| matches!(event, ObjectEvent::MappingEnd)).is_some()
    }

    fn validate_start(&mut self) -> FatalResult<()> {
        if self.started {
            return Err(FatalError::invariant("Document reading has already started"));
        }
        self.started = true;
        Ok(())
    }

    fn validate_end(&mut self) -> FatalResult<()> {
        if !self.events.is_empty() {
            return Err(FatalError::invariant(format!(
                "Expected end of document, {} event(s) remain",
                self.events.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn literal(event: &ObjectEvent) -> Option<&Token> {
        match event {
            ObjectEvent::Literal(token) => Some(token),
            _ => None,
        }
    }

    #[test]
    fn test_yaml_events_keep_key_order() {
        let reader = EventObjectReader::from_yaml_str("b: 1\na: [x, true]\n").unwrap();
        let events: Vec<ObjectEvent> = reader.events.into_iter().collect();
        assert_eq!(
            events,
            vec![
                ObjectEvent::MappingStart(Span::at(1, 1)),
                ObjectEvent::Literal(Token::string("b").with_span(Span::at(1, 1))),
                ObjectEvent::Literal(Token::number(1.0).with_span(Span::at(1, 4))),
                ObjectEvent::Literal(Token::string("a").with_span(Span::at(2, 1))),
                ObjectEvent::SequenceStart(Span::at(2, 4)),
                ObjectEvent::Literal(Token::string("x").with_span(Span::at(2, 5))),
                ObjectEvent::Literal(Token::boolean(true).with_span(Span::at(2, 8))),
                ObjectEvent::SequenceEnd,
                ObjectEvent::MappingEnd,
            ]
        );
    }

    #[test]
    fn test_yaml_nested_keys_carry_position() {
        let mut reader = EventObjectReader::from_yaml_str("jobs:\n  build:\n    run: make\n").unwrap();
        assert_eq!(reader.allow_mapping_start(), Some(Span::at(1, 1)));
        assert_eq!(reader.allow_literal().map(|t| t.span), Some(Span::at(1, 1)));
        assert_eq!(reader.allow_mapping_start(), Some(Span::at(2, 3)));
        assert_eq!(reader.allow_literal().map(|t| t.span), Some(Span::at(2, 3)));
        assert_eq!(reader.allow_mapping_start(), Some(Span::at(3, 5)));
        assert_eq!(reader.allow_literal().map(|t| t.span), Some(Span::at(3, 5)));
        assert_eq!(reader.allow_literal().map(|t| t.span), Some(Span::at(3, 10)));
    }

    #[test]
    fn test_yaml_plain_scalars_resolve() {
        let source = "[~, '', null, True, 'true', 0x1f, 0o17, -2.5e1, .inf, 1.2.3, \"7\"]";
        let reader = EventObjectReader::from_yaml_str(source).unwrap();
        let kinds: Vec<TokenKind> = reader.events.iter().filter_map(literal).map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Null,
                TokenKind::String("".into()),
                TokenKind::Null,
                TokenKind::Boolean(true),
                TokenKind::String("true".into()),
                TokenKind::Number(31.0),
                TokenKind::Number(15.0),
                TokenKind::Number(-25.0),
                TokenKind::Number(f64::INFINITY),
                TokenKind::String("1.2.3".into()),
                TokenKind::String("7".into()),
            ]
        );
    }

    #[test]
    fn test_yaml_aliases_replay_anchor() {
        let reader = EventObjectReader::from_yaml_str("base: &b [1, 2]\ncopy: *b\n").unwrap();
        let numbers = reader
            .events
            .iter()
            .filter_map(literal)
            .filter(|t| matches!(t.kind, TokenKind::Number(_)))
            .count();
        assert_eq!(numbers, 4);
        assert_eq!(reader.remaining(), 12);
    }

    #[test]
    fn test_yaml_alias_expansion_is_bounded() {
        let mut source = String::from("a0: &a0 [x, x, x, x, x, x, x, x, x, x]\n");
        for level in 1..6 {
            let refs = vec![format!("*a{}", level - 1); 10].join(", ");
            source.push_str(&format!("a{level}: &a{level} [{refs}]\n"));
        }
        let err = EventObjectReader::from_yaml_str(&source).unwrap_err();
        assert_eq!(err, YamlError::AliasExpansion { limit: MAX_ALIAS_EVENTS });
    }

    #[test]
    fn test_yaml_complex_key_becomes_text() {
        let mut reader = EventObjectReader::from_yaml_str("? [a, 1]\n: v\n").unwrap();
        assert!(reader.allow_mapping_start().is_some());
        let key = reader.allow_literal().unwrap();
        assert_eq!(key.as_str(), Some(r#"["a",1]"#));
        assert_eq!(key.span.line, Some(1));
        assert_eq!(reader.allow_literal().and_then(|t| t.as_str().map(str::to_string)).as_deref(), Some("v"));
        assert!(reader.allow_mapping_end());
        assert!(reader.validate_end().is_ok());
    }

    #[test]
    fn test_yaml_documents() {
        let mut reader = EventObjectReader::from_yaml_str("# nothing here\n").unwrap();
        assert_eq!(reader.allow_literal().map(|t| t.kind), Some(TokenKind::Null));
        assert_eq!(
            EventObjectReader::from_yaml_str("a: 1\n---\nb: 2\n").unwrap_err(),
            YamlError::MultipleDocuments
        );
        assert!(matches!(
            EventObjectReader::from_yaml_str("a: [1\n"),
            Err(YamlError::Scan { .. })
        ));
    }

    #[test]
    fn test_json_events_keep_key_order() {
        let reader = EventObjectReader::from_json_str(r#"{"z": null, "a": 2}"#).unwrap();
        let keys: Vec<String> = reader
            .events
            .iter()
            .filter_map(|e| match e {
                ObjectEvent::Literal(t) => t.as_str().map(str::to_string),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_token_events_render_expressions() {
        let tree = Token::mapping(vec![(Token::insert(), Token::expression("matrix"))])
            .with_span(Span::at(1, 1));
        let mut reader = EventObjectReader::from_token(&tree);
        assert_eq!(reader.allow_mapping_start(), Some(Span::at(1, 1)));
        assert_eq!(reader.allow_literal().and_then(|t| t.as_str().map(str::to_string)).as_deref(), Some("${{ insert }}"));
        assert_eq!(reader.allow_literal().and_then(|t| t.as_str().map(str::to_string)).as_deref(), Some("${{ matrix }}"));
        assert!(reader.allow_mapping_end());
        assert!(reader.validate_end().is_ok());
    }

    #[test]
    fn test_allow_only_consumes_matching_event() {
        let mut reader = EventObjectReader::new(vec![ObjectEvent::SequenceStart(Span::default()), ObjectEvent::SequenceEnd]);
        assert!(reader.allow_literal().is_none());
        assert!(reader.allow_mapping_start().is_none());
        assert!(reader.validate_end().is_err());
        assert!(reader.allow_sequence_start().is_some());
        assert!(reader.allow_sequence_end());
        assert!(reader.validate_end().is_ok());
    }

    #[test]
    fn test_validate_start_once() {
        let mut reader = EventObjectReader::default();
        assert!(reader.validate_start().is_ok());
        assert!(reader.validate_start().is_err());
    }

    #[test]
    fn test_yaml_tags_are_dropped() {
        let mut reader = EventObjectReader::from_yaml_str("!custom 5").unwrap();
        assert_eq!(reader.allow_literal().map(|t| t.kind), Some(TokenKind::Number(5.0)));
    }
}
