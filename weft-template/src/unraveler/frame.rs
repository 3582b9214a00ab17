//! Cursor frames
//!
//! One frame per token on the unraveler's path from the root to the current
//! position. Frames own cheap `Arc` handles to their tokens, so a frame never
//! borrows from the tree it walks.

use std::fmt;
use weft_core::{Token, TokenKind};

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub token: Token,
    /// Bytes charged for an expression result, released when the frame pops.
    pub remove_bytes: usize,
    pub state: FrameState,
}

#[derive(Debug, Clone)]
pub(crate) enum FrameState {
    Literal,
    Sequence(ContainerState),
    Mapping(ContainerState),
    Expression { is_start: bool },
    Insert { is_start: bool },
    Conditional { is_start: bool, body: Option<Token> },
    Each(EachState),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ContainerState {
    pub is_start: bool,
    pub index: usize,
    /// Mappings only: the current child is the key of pair `index`.
    pub is_key: bool,
    /// Pushed as an insertion into the parent. The start event is never
    /// emitted and the end closes the insertion.
    pub spliced: bool,
    /// Index of the last conditional child and whether its chain is still open.
    pub chain: Option<(usize, bool)>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EachState {
    /// `None` until the collection has been evaluated.
    pub items: Option<Vec<Token>>,
    pub index: usize,
    pub body: Option<Token>,
}

impl EachState {
    pub fn is_end(&self) -> bool {
        self.items.as_ref().is_some_and(|items| self.index >= items.len())
    }
}

impl Frame {
    pub fn new(token: Token, remove_bytes: usize) -> Self {
        let state = match &token.kind {
            TokenKind::Sequence(_) => FrameState::Sequence(ContainerState {
                is_start: true,
                ..ContainerState::default()
            }),
            TokenKind::Mapping(_) => FrameState::Mapping(ContainerState {
                is_start: true,
                ..ContainerState::default()
            }),
            TokenKind::BasicExpression(_) => FrameState::Expression { is_start: true },
            TokenKind::InsertExpression => FrameState::Insert { is_start: true },
            TokenKind::If(_) | TokenKind::ElseIf(_) | TokenKind::Else => FrameState::Conditional {
                is_start: true,
                body: None,
            },
            TokenKind::Each { .. } => FrameState::Each(EachState::default()),
            TokenKind::Null | TokenKind::Boolean(_) | TokenKind::Number(_) | TokenKind::String(_) => {
                FrameState::Literal
            }
        };
        Self {
            token,
            remove_bytes,
            state,
        }
    }

    /// Number of children of a container frame.
    pub fn len(&self) -> usize {
        match &self.token.kind {
            TokenKind::Sequence(items) => items.len(),
            TokenKind::Mapping(pairs) => pairs.len(),
            _ => 0,
        }
    }

    pub fn container(&self) -> Option<&ContainerState> {
        match &self.state {
            FrameState::Sequence(state) | FrameState::Mapping(state) => Some(state),
            _ => None,
        }
    }

    pub fn container_mut(&mut self) -> Option<&mut ContainerState> {
        match &mut self.state {
            FrameState::Sequence(state) | FrameState::Mapping(state) => Some(state),
            _ => None,
        }
    }

    pub fn is_container_start(&self) -> bool {
        self.container().is_some_and(|state| state.is_start)
    }

    pub fn is_container_end(&self) -> bool {
        let len = self.len();
        self.container()
            .is_some_and(|state| !state.is_start && state.index >= len)
    }

    /// The frame is positioned on a scalar the caller may consume.
    pub fn is_scalar_event(&self) -> bool {
        match &self.state {
            FrameState::Literal => true,
            FrameState::Expression { is_start }
            | FrameState::Insert { is_start }
            | FrameState::Conditional { is_start, .. } => *is_start,
            FrameState::Each(each) => each.items.is_none(),
            FrameState::Sequence(_) | FrameState::Mapping(_) => false,
        }
    }

    /// Leave the start state of an expression or directive frame.
    pub fn finish(&mut self) {
        match &mut self.state {
            FrameState::Expression { is_start }
            | FrameState::Insert { is_start }
            | FrameState::Conditional { is_start, .. } => *is_start = false,
            FrameState::Each(each) => {
                each.items = Some(each.items.take().unwrap_or_default());
                each.index = each.items.as_ref().map_or(0, Vec::len);
            }
            FrameState::Literal | FrameState::Sequence(_) | FrameState::Mapping(_) => {}
        }
    }

    /// Step a container to its next child position.
    pub fn advance(&mut self) {
        match &mut self.state {
            FrameState::Sequence(state) => {
                if state.is_start {
                    state.is_start = false;
                } else {
                    state.index += 1;
                }
            }
            FrameState::Mapping(state) => {
                if state.is_start {
                    state.is_start = false;
                    state.is_key = true;
                } else if state.is_key {
                    state.is_key = false;
                } else {
                    state.index += 1;
                    state.is_key = true;
                }
            }
            _ => {}
        }
    }

    /// Child at the current container position, if not at the end.
    pub fn current_child(&self) -> Option<Token> {
        let state = self.container()?;
        if state.is_start {
            return None;
        }
        match &self.token.kind {
            TokenKind::Sequence(items) => items.get(state.index).cloned(),
            TokenKind::Mapping(pairs) => pairs
                .get(state.index)
                .map(|(key, value)| if state.is_key { key.clone() } else { value.clone() }),
            _ => None,
        }
    }

    /// Value of the pair at the current mapping position.
    pub fn current_value(&self) -> Option<Token> {
        let state = self.container()?;
        self.token
            .as_mapping()
            .and_then(|pairs| pairs.get(state.index))
            .map(|(_, value)| value.clone())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            FrameState::Literal => write!(f, "Literal"),
            FrameState::Sequence(state) => write!(
                f,
                "Sequence(start: {}, index: {}, len: {})",
                state.is_start,
                state.index,
                self.len()
            ),
            FrameState::Mapping(state) => write!(
                f,
                "Mapping(start: {}, index: {}, key: {}, len: {})",
                state.is_start,
                state.index,
                state.is_key,
                self.len()
            ),
            FrameState::Expression { is_start } => write!(f, "Expression(start: {})", is_start),
            FrameState::Insert { is_start } => write!(f, "Insert(start: {})", is_start),
            FrameState::Conditional { is_start, .. } => write!(f, "Conditional(start: {})", is_start),
            FrameState::Each(each) => write!(
                f,
                "Each(index: {}, items: {:?})",
                each.index,
                each.items.as_ref().map(Vec::len)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_frame_walks_keys_then_values() {
        let mapping = Token::mapping(vec![
            (Token::string("a"), Token::number(1.0)),
            (Token::string("b"), Token::number(2.0)),
        ]);
        let mut frame = Frame::new(mapping, 0);
        assert!(frame.is_container_start());

        let mut seen = Vec::new();
        loop {
            frame.advance();
            match frame.current_child() {
                Some(child) => seen.push(child.to_string()),
                None => break,
            }
        }
        assert_eq!(seen, vec!["a", "1", "b", "2"]);
        assert!(frame.is_container_end());
    }

    #[test]
    fn test_empty_sequence_ends_immediately() {
        let mut frame = Frame::new(Token::sequence(vec![]), 0);
        frame.advance();
        assert_eq!(frame.current_child(), None);
        assert!(frame.is_container_end());
    }

    #[test]
    fn test_finish_ends_each() {
        let each = Token::new(TokenKind::Each {
            variable: "v".into(),
            collection: "items".into(),
        });
        let mut frame = Frame::new(each, 0);
        assert!(frame.is_scalar_event());
        frame.finish();
        assert!(!frame.is_scalar_event());
        assert!(matches!(&frame.state, FrameState::Each(each) if each.is_end()));
    }
}
