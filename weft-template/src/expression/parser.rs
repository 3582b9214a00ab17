//! Expression parser
//!
//! Precedence, lowest first: `||`, `&&`, equality, comparison, `!`,
//! member/index access, primary. Tree depth is capped at
//! [`MAX_EXPRESSION_DEPTH`].

use super::lexer::Lexer;
use super::token::*;
use super::{ExpressionError, MAX_EXPRESSION_DEPTH, MAX_EXPRESSION_LENGTH};
use weft_core::Token;

// ============================================================================
// AST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Token),
    NamedValue { name: String, position: usize },
    Member { target: Box<Expr>, name: String },
    Index { target: Box<Expr>, index: Box<Expr> },
    Call { name: String, args: Vec<Expr>, position: usize },
    Not(Box<Expr>),
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}

// ============================================================================
// PARSER
// ============================================================================

pub struct Parser<'a> {
    expression: &'a str,
    lexemes: Vec<Lexeme>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(expression: &'a str) -> Result<Self, ExpressionError> {
        if expression.chars().count() > MAX_EXPRESSION_LENGTH {
            return Err(ExpressionError::MaxLengthExceeded {
                max: MAX_EXPRESSION_LENGTH,
            });
        }
        Ok(Self {
            expression,
            lexemes: Lexer::new(expression).tokenize(),
            pos: 0,
            depth: 0,
        })
    }

    /// Parse the whole expression.
    pub fn parse(mut self) -> Result<Expr, ExpressionError> {
        let expr = self.parse_or()?;
        match self.peek() {
            LexemeKind::Eof => Ok(expr),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        self.enter()?;
        let expr = self.parse_binary(0)?;
        self.leave();
        Ok(expr)
    }

    /// Left-associative binary levels. Every operator applied counts toward
    /// the depth limit.
    fn parse_binary(&mut self, level: usize) -> Result<Expr, ExpressionError> {
        if level == BINARY_LEVELS.len() {
            return self.parse_unary();
        }

        let mut left = self.parse_binary(level + 1)?;
        let mut entered = 0;
        while let Some(op) = binary_op(self.peek(), BINARY_LEVELS[level]) {
            self.pos += 1;
            let right = self.parse_binary(level + 1)?;
            self.enter()?;
            entered += 1;
            left = binary(op, left, right);
        }
        for _ in 0..entered {
            self.leave();
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&LexemeKind::Not) {
            self.enter()?;
            let operand = self.parse_unary()?;
            self.leave();
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.parse_primary()?;
        let mut entered = 0;
        loop {
            match self.peek() {
                LexemeKind::Dot => {
                    self.pos += 1;
                    let name = match self.peek() {
                        LexemeKind::Identifier(name) => name.clone(),
                        _ => return Err(self.unexpected()),
                    };
                    self.pos += 1;
                    self.enter()?;
                    entered += 1;
                    expr = Expr::Member {
                        target: Box::new(expr),
                        name,
                    };
                }
                LexemeKind::LBracket => {
                    self.pos += 1;
                    self.enter()?;
                    entered += 1;
                    let index = self.parse_or()?;
                    self.expect(&LexemeKind::RBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => {
                    for _ in 0..entered {
                        self.leave();
                    }
                    return Ok(expr);
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let lexeme = self.lexemes[self.pos].clone();
        match lexeme.kind {
            LexemeKind::Null => {
                self.pos += 1;
                Ok(Expr::Literal(Token::null()))
            }
            LexemeKind::True => {
                self.pos += 1;
                Ok(Expr::Literal(Token::boolean(true)))
            }
            LexemeKind::False => {
                self.pos += 1;
                Ok(Expr::Literal(Token::boolean(false)))
            }
            LexemeKind::Number(value) => {
                self.pos += 1;
                Ok(Expr::Literal(Token::number(value)))
            }
            LexemeKind::String(value) => {
                self.pos += 1;
                Ok(Expr::Literal(Token::string(value)))
            }
            LexemeKind::LParen => {
                self.pos += 1;
                let expr = self.parse_or()?;
                self.expect(&LexemeKind::RParen)?;
                Ok(expr)
            }
            LexemeKind::Identifier(name) => {
                self.pos += 1;
                if self.eat(&LexemeKind::LParen) {
                    self.parse_call(name, lexeme.position)
                } else {
                    Ok(Expr::NamedValue {
                        name,
                        position: lexeme.position,
                    })
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    fn parse_call(&mut self, name: String, position: usize) -> Result<Expr, ExpressionError> {
        let mut args = Vec::new();
        if !self.eat(&LexemeKind::RParen) {
            loop {
                args.push(self.parse_or()?);
                if self.eat(&LexemeKind::RParen) {
                    break;
                }
                self.expect(&LexemeKind::Comma)?;
            }
        }
        Ok(Expr::Call {
            name,
            args,
            position,
        })
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(ExpressionError::MaxDepthExceeded {
                max: MAX_EXPRESSION_DEPTH,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn peek(&self) -> &LexemeKind {
        &self.lexemes[self.pos].kind
    }

    fn eat(&mut self, kind: &LexemeKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &LexemeKind) -> Result<(), ExpressionError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ExpressionError {
        let lexeme = &self.lexemes[self.pos];
        match &lexeme.kind {
            LexemeKind::Eof => ExpressionError::UnexpectedEnd {
                expression: self.expression.to_string(),
            },
            kind => ExpressionError::UnexpectedSymbol {
                symbol: kind.to_string(),
                position: lexeme.position,
                expression: self.expression.to_string(),
            },
        }
    }
}

#[derive(Clone, Copy)]
enum Level {
    Or,
    And,
    Equality,
    Comparison,
}

const BINARY_LEVELS: [Level; 4] = [Level::Or, Level::And, Level::Equality, Level::Comparison];

fn binary_op(kind: &LexemeKind, level: Level) -> Option<BinaryOp> {
    match (level, kind) {
        (Level::Or, LexemeKind::Or) => Some(BinaryOp::Or),
        (Level::And, LexemeKind::And) => Some(BinaryOp::And),
        (Level::Equality, LexemeKind::Eq) => Some(BinaryOp::Eq),
        (Level::Equality, LexemeKind::Ne) => Some(BinaryOp::Ne),
        (Level::Comparison, LexemeKind::Lt) => Some(BinaryOp::Lt),
        (Level::Comparison, LexemeKind::Le) => Some(BinaryOp::Le),
        (Level::Comparison, LexemeKind::Gt) => Some(BinaryOp::Gt),
        (Level::Comparison, LexemeKind::Ge) => Some(BinaryOp::Ge),
        _ => None,
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse an expression body.
pub fn parse(expression: &str) -> Result<Expr, ExpressionError> {
    Parser::new(expression)?.parse()
}
