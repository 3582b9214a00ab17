//! Expression lexer

use super::token::*;
use std::iter::Peekable;
use std::str::CharIndices;

/// Lexer for `${{ }}` expression bodies.
pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<CharIndices<'a>>,
    /// Byte offset of the next character.
    pos: usize,
    /// 1-based character position of the next character.
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            pos: 0,
            column: 1,
        }
    }

    /// Tokenize the whole expression. The last lexeme is always `Eof`.
    pub fn tokenize(&mut self) -> Vec<Lexeme> {
        let mut lexemes = Vec::new();
        loop {
            let lexeme = self.next_lexeme();
            let is_eof = lexeme.kind == LexemeKind::Eof;
            lexemes.push(lexeme);
            if is_eof {
                break;
            }
        }
        lexemes
    }

    fn next_lexeme(&mut self) -> Lexeme {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }

        let position = self.column;
        let kind = match self.peek_char() {
            None => LexemeKind::Eof,
            Some(c) => match c {
                '.' if !self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                    self.advance();
                    LexemeKind::Dot
                }
                ',' => self.single(LexemeKind::Comma),
                '(' => self.single(LexemeKind::LParen),
                ')' => self.single(LexemeKind::RParen),
                '[' => self.single(LexemeKind::LBracket),
                ']' => self.single(LexemeKind::RBracket),

                '!' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        LexemeKind::Ne
                    } else {
                        LexemeKind::Not
                    }
                }
                '=' => self.pair('=', LexemeKind::Eq),
                '&' => self.pair('&', LexemeKind::And),
                '|' => self.pair('|', LexemeKind::Or),
                '<' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        LexemeKind::Le
                    } else {
                        LexemeKind::Lt
                    }
                }
                '>' => {
                    self.advance();
                    if self.peek_char() == Some('=') {
                        self.advance();
                        LexemeKind::Ge
                    } else {
                        LexemeKind::Gt
                    }
                }

                '\'' => self.scan_string(),

                c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => self.scan_number(),

                c if c.is_alphabetic() || c == '_' => self.scan_identifier(),

                c => {
                    self.advance();
                    LexemeKind::Error(c.to_string())
                }
            },
        };

        Lexeme { kind, position }
    }

    fn single(&mut self, kind: LexemeKind) -> LexemeKind {
        self.advance();
        kind
    }

    /// Two-character operator whose second character must be `second`.
    fn pair(&mut self, second: char, kind: LexemeKind) -> LexemeKind {
        let start = self.pos;
        self.advance();
        if self.peek_char() == Some(second) {
            self.advance();
            kind
        } else {
            LexemeKind::Error(self.source[start..self.pos].to_string())
        }
    }

    fn scan_identifier(&mut self) -> LexemeKind {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            self.advance();
        }

        match &self.source[start..self.pos] {
            "null" => LexemeKind::Null,
            "true" => LexemeKind::True,
            "false" => LexemeKind::False,
            "NaN" => LexemeKind::Number(f64::NAN),
            "Infinity" => LexemeKind::Number(f64::INFINITY),
            ident => LexemeKind::Identifier(ident.to_string()),
        }
    }

    fn scan_number(&mut self) -> LexemeKind {
        let start = self.pos;
        self.advance();
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
        {
            self.advance();
        }

        let text = &self.source[start..self.pos];
        if text == "-Infinity" {
            return LexemeKind::Number(f64::NEG_INFINITY);
        }
        match parse_number(text) {
            Some(value) => LexemeKind::Number(value),
            None => LexemeKind::Error(text.to_string()),
        }
    }

    /// Single-quoted string; `''` is an escaped quote.
    fn scan_string(&mut self) -> LexemeKind {
        let start = self.pos;
        self.advance();
        let mut value = String::new();
        loop {
            match self.advance() {
                None => return LexemeKind::Error(self.source[start..].to_string()),
                Some('\'') => {
                    if self.peek_char() == Some('\'') {
                        self.advance();
                        value.push('\'');
                    } else {
                        return LexemeKind::String(value);
                    }
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_second(&self) -> Option<char> {
        let mut rest = self.chars.clone();
        rest.next();
        rest.next().map(|(_, c)| c)
    }

    fn advance(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        self.pos += c.len_utf8();
        self.column += 1;
        Some(c)
    }
}

/// Decimal, hexadecimal (`0x`) and octal (`0o`) numbers, with an optional sign.
fn parse_number(text: &str) -> Option<f64> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let value = if let Some(hex) = digits.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()? as f64
    } else if let Some(octal) = digits.strip_prefix("0o") {
        i64::from_str_radix(octal, 8).ok()? as f64
    } else {
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E') {
            return None;
        }
        digits.parse::<f64>().ok()?
    };
    Some(if negative { -value } else { value })
}
