//! Template token tree

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// SOURCE POSITIONS
// ============================================================================

/// Source position of a token. Every field is optional: tokens produced by
/// expression evaluation or built in code usually carry no position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file_id: Option<usize>,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl Span {
    pub fn new(file_id: Option<usize>, line: usize, column: usize) -> Self {
        Self {
            file_id,
            line: Some(line),
            column: Some(column),
        }
    }

    /// Span with only a line and column.
    pub fn at(line: usize, column: usize) -> Self {
        Self::new(None, line, column)
    }

    pub fn is_empty(&self) -> bool {
        self.file_id.is_none() && self.line.is_none() && self.column.is_none()
    }

    /// Fill in the file id when the span does not already name one.
    pub fn or_file(self, file_id: Option<usize>) -> Self {
        Self {
            file_id: self.file_id.or(file_id),
            ..self
        }
    }
}

// ============================================================================
// TOKENS
// ============================================================================

/// Token kinds. Container payloads are reference counted, so cloning a token
/// never copies a sub-tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TokenKind {
    Null,
    Boolean(bool),
    Number(f64),
    String(Arc<str>),
    Sequence(Arc<[Token]>),
    Mapping(Arc<[(Token, Token)]>),

    /// Deferred expression text, without the `${{ }}` markers.
    BasicExpression(Arc<str>),

    // Directives
    InsertExpression,
    If(Arc<str>),
    ElseIf(Arc<str>),
    Else,
    Each {
        variable: Arc<str>,
        collection: Arc<str>,
    },
}

/// A node of the template document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Span::is_empty")]
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind) -> Self {
        Self {
            kind,
            span: Span::default(),
        }
    }

    pub fn null() -> Self {
        Self::new(TokenKind::Null)
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(TokenKind::Boolean(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(TokenKind::Number(value))
    }

    pub fn string(value: impl Into<Arc<str>>) -> Self {
        Self::new(TokenKind::String(value.into()))
    }

    pub fn sequence(items: Vec<Token>) -> Self {
        Self::new(TokenKind::Sequence(items.into()))
    }

    pub fn mapping(pairs: Vec<(Token, Token)>) -> Self {
        Self::new(TokenKind::Mapping(pairs.into()))
    }

    pub fn expression(text: impl Into<Arc<str>>) -> Self {
        Self::new(TokenKind::BasicExpression(text.into()))
    }

    pub fn insert() -> Self {
        Self::new(TokenKind::InsertExpression)
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Null, boolean, number or string.
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Null | TokenKind::Boolean(_) | TokenKind::Number(_) | TokenKind::String(_)
        )
    }

    /// Any `${{ }}` form, including directives.
    pub fn is_expression(&self) -> bool {
        matches!(self.kind, TokenKind::BasicExpression(_)) || self.is_directive()
    }

    pub fn is_directive(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::InsertExpression
                | TokenKind::If(_)
                | TokenKind::ElseIf(_)
                | TokenKind::Else
                | TokenKind::Each { .. }
        )
    }

    /// Scalars are every kind except sequences and mappings.
    pub fn is_scalar(&self) -> bool {
        !matches!(self.kind, TokenKind::Sequence(_) | TokenKind::Mapping(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            TokenKind::Null => "null",
            TokenKind::Boolean(_) => "boolean",
            TokenKind::Number(_) => "number",
            TokenKind::String(_) => "string",
            TokenKind::Sequence(_) => "sequence",
            TokenKind::Mapping(_) => "mapping",
            TokenKind::BasicExpression(_) => "expression",
            TokenKind::InsertExpression => "insert",
            TokenKind::If(_) => "if",
            TokenKind::ElseIf(_) => "elseif",
            TokenKind::Else => "else",
            TokenKind::Each { .. } => "each",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            TokenKind::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self.kind {
            TokenKind::Number(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Arc<[Token]>> {
        match &self.kind {
            TokenKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Arc<[(Token, Token)]>> {
        match &self.kind {
            TokenKind::Mapping(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Case-insensitive lookup of a mapping value by string key.
    pub fn get(&self, key: &str) -> Option<&Token> {
        self.as_mapping()?
            .iter()
            .find(|(k, _)| k.as_str().is_some_and(|k| k.eq_ignore_ascii_case(key)))
            .map(|(_, v)| v)
    }

    /// Truthiness used by conditional directives and logical operators.
    pub fn is_truthy(&self) -> bool {
        match &self.kind {
            TokenKind::Null => false,
            TokenKind::Boolean(value) => *value,
            TokenKind::Number(value) => *value != 0.0 && !value.is_nan(),
            TokenKind::String(value) => !value.is_empty(),
            _ => true,
        }
    }

    /// Pre-order walk of this token and every nested token, without recursion.
    pub fn traverse(&self) -> Traverse<'_> {
        Traverse { stack: vec![self] }
    }

    /// Convert to a JSON value. Keys are rendered with `Display`, expressions
    /// are rendered as their `${{ }}` text.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match &self.kind {
            TokenKind::Null => Value::Null,
            TokenKind::Boolean(value) => Value::Bool(*value),
            TokenKind::Number(value) => number_to_json(*value),
            TokenKind::String(value) => Value::String(value.to_string()),
            TokenKind::Sequence(items) => Value::Array(items.iter().map(Token::to_json).collect()),
            TokenKind::Mapping(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_json()))
                    .collect(),
            ),
            _ => Value::String(self.to_string()),
        }
    }

    /// Build a token tree from a JSON value. Positions are left empty.
    pub fn from_json(value: &serde_json::Value) -> Token {
        use serde_json::Value;
        match value {
            Value::Null => Token::null(),
            Value::Bool(value) => Token::boolean(*value),
            Value::Number(value) => Token::number(value.as_f64().unwrap_or(f64::NAN)),
            Value::String(value) => Token::string(value.as_str()),
            Value::Array(items) => Token::sequence(items.iter().map(Token::from_json).collect()),
            Value::Object(map) => Token::mapping(
                map.iter()
                    .map(|(key, value)| (Token::string(key.as_str()), Token::from_json(value)))
                    .collect(),
            ),
        }
    }
}

fn number_to_json(value: f64) -> serde_json::Value {
    if value.fract() == 0.0 && value.abs() < 9.007_199_254_740_992e15 {
        return serde_json::Value::from(value as i64);
    }
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Render a number the way templates display it: integral values without a
/// fractional part.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else {
        format!("{}", value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TokenKind::Null => Ok(()),
            TokenKind::Boolean(value) => write!(f, "{}", value),
            TokenKind::Number(value) => f.write_str(&format_number(*value)),
            TokenKind::String(value) => f.write_str(value),
            TokenKind::Sequence(_) => f.write_str("Array"),
            TokenKind::Mapping(_) => f.write_str("Object"),
            TokenKind::BasicExpression(expression) => write!(f, "${{{{ {} }}}}", expression),
            TokenKind::InsertExpression => f.write_str("${{ insert }}"),
            TokenKind::If(condition) => write!(f, "${{{{ if {} }}}}", condition),
            TokenKind::ElseIf(condition) => write!(f, "${{{{ elseif {} }}}}", condition),
            TokenKind::Else => f.write_str("${{ else }}"),
            TokenKind::Each {
                variable,
                collection,
            } => write!(f, "${{{{ each {} in {} }}}}", variable, collection),
        }
    }
}

/// Iterator returned by [`Token::traverse`].
pub struct Traverse<'a> {
    stack: Vec<&'a Token>,
}

impl<'a> Iterator for Traverse<'a> {
    type Item = &'a Token;

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.stack.pop()?;
        match &token.kind {
            TokenKind::Sequence(items) => self.stack.extend(items.iter().rev()),
            TokenKind::Mapping(pairs) => {
                for (key, value) in pairs.iter().rev() {
                    self.stack.push(value);
                    self.stack.push(key);
                }
            }
            _ => {}
        }
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_literals() {
        assert_eq!(Token::null().to_string(), "");
        assert_eq!(Token::boolean(true).to_string(), "true");
        assert_eq!(Token::number(3.0).to_string(), "3");
        assert_eq!(Token::number(1.5).to_string(), "1.5");
        assert_eq!(Token::number(-0.0).to_string(), "0");
        assert_eq!(Token::string("abc").to_string(), "abc");
    }

    #[test]
    fn test_display_directives() {
        assert_eq!(Token::expression("a.b").to_string(), "${{ a.b }}");
        assert_eq!(Token::insert().to_string(), "${{ insert }}");
        assert_eq!(Token::new(TokenKind::If("x".into())).to_string(), "${{ if x }}");
        let each = Token::new(TokenKind::Each {
            variable: "item".into(),
            collection: "items".into(),
        });
        assert_eq!(each.to_string(), "${{ each item in items }}");
    }

    #[test]
    fn test_traverse_is_pre_order() {
        let tree = Token::mapping(vec![
            (Token::string("a"), Token::sequence(vec![Token::number(1.0), Token::number(2.0)])),
            (Token::string("b"), Token::null()),
        ]);
        let kinds: Vec<&str> = tree.traverse().map(Token::type_name).collect();
        assert_eq!(
            kinds,
            vec!["mapping", "string", "sequence", "number", "number", "string", "null"]
        );
    }

    #[test]
    fn test_case_insensitive_get() {
        let tree = Token::mapping(vec![(Token::string("Name"), Token::string("weft"))]);
        assert_eq!(tree.get("name").and_then(Token::as_str), Some("weft"));
        assert!(tree.get("other").is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(!Token::null().is_truthy());
        assert!(!Token::string("").is_truthy());
        assert!(!Token::number(0.0).is_truthy());
        assert!(Token::number(2.0).is_truthy());
        assert!(Token::sequence(vec![]).is_truthy());
    }

    #[test]
    fn test_json_conversion_keeps_integers() {
        let tree = Token::from_json(&serde_json::json!({"a": [1, 2.5, "x", null, true]}));
        assert_eq!(
            serde_json::to_string(&tree.to_json()).unwrap(),
            r#"{"a":[1,2.5,"x",null,true]}"#
        );
    }

    #[test]
    fn test_span_or_file() {
        let span = Span::at(3, 4).or_file(Some(1));
        assert_eq!(span.file_id, Some(1));
        assert_eq!(Span::new(Some(2), 1, 1).or_file(Some(1)).file_id, Some(2));
        assert!(Span::default().is_empty());
    }
}
