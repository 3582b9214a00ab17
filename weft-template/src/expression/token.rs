//! Expression lexemes

use std::fmt;

// ============================================================================
// LEXEME TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LexemeKind {
    // Literals
    Null,
    True,
    False,
    Number(f64),
    String(String),

    Identifier(String),

    // Punctuation
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,

    // Operators
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,

    Error(String),
    Eof,
}

/// A lexeme with its 1-based character position in the expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub kind: LexemeKind,
    pub position: usize,
}

impl fmt::Display for LexemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexemeKind::Null => f.write_str("null"),
            LexemeKind::True => f.write_str("true"),
            LexemeKind::False => f.write_str("false"),
            LexemeKind::Number(n) => f.write_str(&weft_core::format_number(*n)),
            LexemeKind::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            LexemeKind::Identifier(name) => f.write_str(name),
            LexemeKind::Dot => f.write_str("."),
            LexemeKind::Comma => f.write_str(","),
            LexemeKind::LParen => f.write_str("("),
            LexemeKind::RParen => f.write_str(")"),
            LexemeKind::LBracket => f.write_str("["),
            LexemeKind::RBracket => f.write_str("]"),
            LexemeKind::Not => f.write_str("!"),
            LexemeKind::Eq => f.write_str("=="),
            LexemeKind::Ne => f.write_str("!="),
            LexemeKind::Lt => f.write_str("<"),
            LexemeKind::Le => f.write_str("<="),
            LexemeKind::Gt => f.write_str(">"),
            LexemeKind::Ge => f.write_str(">="),
            LexemeKind::And => f.write_str("&&"),
            LexemeKind::Or => f.write_str("||"),
            LexemeKind::Error(text) => f.write_str(text),
            LexemeKind::Eof => f.write_str("end of expression"),
        }
    }
}
