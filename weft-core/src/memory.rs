//! Per-call resource accounting
//!
//! A [`MemoryBudget`] is created for every top-level read or evaluate call.
//! Byte sizes are a stable heuristic, not an exact measure of heap usage.

use crate::config::TemplateLimits;
use crate::error::{FatalError, FatalResult, Resource, ResourceExceeded};
use crate::token::{Token, TokenKind};

/// Fixed cost of any token.
pub const MIN_OBJECT_SIZE: usize = 24;

/// Extra fixed cost of any string payload.
pub const STRING_BASE_OVERHEAD: usize = 26;

/// Depth, event and byte counters checked against fixed maximums.
#[derive(Debug, Clone)]
pub struct MemoryBudget {
    max_depth: usize,
    max_events: usize,
    max_bytes: usize,
    depth: usize,
    events: usize,
    current_bytes: usize,
}

impl MemoryBudget {
    pub fn new(max_depth: usize, max_events: usize, max_bytes: usize) -> Self {
        Self {
            max_depth,
            max_events,
            max_bytes,
            depth: 0,
            events: 0,
            current_bytes: 0,
        }
    }

    pub fn from_limits(limits: &TemplateLimits) -> Self {
        Self::new(limits.max_depth, limits.max_events, limits.max_bytes)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn events(&self) -> usize {
        self.events
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    pub fn add_bytes(&mut self, bytes: usize) -> FatalResult<()> {
        let total = self
            .current_bytes
            .checked_add(bytes)
            .ok_or(self.exceeded(Resource::Bytes))?;
        if total > self.max_bytes {
            return Err(self.exceeded(Resource::Bytes));
        }
        self.current_bytes = total;
        Ok(())
    }

    pub fn add_string(&mut self, value: &str) -> FatalResult<()> {
        self.add_bytes(Self::calculate_string_bytes(value))
    }

    pub fn add_token(&mut self, token: &Token, traverse: bool) -> FatalResult<()> {
        self.add_bytes(Self::calculate_bytes(token, traverse))
    }

    pub fn subtract_bytes(&mut self, bytes: usize) -> FatalResult<()> {
        if bytes > self.current_bytes {
            return Err(FatalError::invariant(format!(
                "Bytes to subtract ({}) exceeds total bytes ({})",
                bytes, self.current_bytes
            )));
        }
        self.current_bytes -= bytes;
        Ok(())
    }

    pub fn subtract_token(&mut self, token: &Token, traverse: bool) -> FatalResult<()> {
        self.subtract_bytes(Self::calculate_bytes(token, traverse))
    }

    pub fn increment_depth(&mut self) -> FatalResult<()> {
        if self.depth >= self.max_depth {
            return Err(self.exceeded(Resource::Depth));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn decrement_depth(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn increment_events(&mut self) -> FatalResult<()> {
        if self.events >= self.max_events {
            return Err(self.exceeded(Resource::Events));
        }
        self.events += 1;
        Ok(())
    }

    fn exceeded(&self, resource: Resource) -> FatalError {
        let limit = match resource {
            Resource::Depth => self.max_depth,
            Resource::Events => self.max_events,
            Resource::Bytes => self.max_bytes,
        };
        ResourceExceeded { resource, limit }.into()
    }

    pub fn calculate_string_bytes(value: &str) -> usize {
        MIN_OBJECT_SIZE + STRING_BASE_OVERHEAD + value.chars().count() * 2
    }

    /// Byte cost of a token, optionally including every nested token.
    pub fn calculate_bytes(token: &Token, traverse: bool) -> usize {
        if traverse {
            token.traverse().map(Self::token_bytes).sum()
        } else {
            Self::token_bytes(token)
        }
    }

    fn token_bytes(token: &Token) -> usize {
        match &token.kind {
            TokenKind::String(value) | TokenKind::BasicExpression(value) => {
                Self::calculate_string_bytes(value)
            }
            TokenKind::If(condition) | TokenKind::ElseIf(condition) => {
                MIN_OBJECT_SIZE + Self::calculate_string_bytes(condition)
            }
            TokenKind::Each {
                variable,
                collection,
            } => {
                MIN_OBJECT_SIZE
                    + Self::calculate_string_bytes(variable)
                    + Self::calculate_string_bytes(collection)
            }
            _ => MIN_OBJECT_SIZE,
        }
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::from_limits(&TemplateLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_cost() {
        assert_eq!(MemoryBudget::calculate_string_bytes(""), 50);
        assert_eq!(MemoryBudget::calculate_string_bytes("abc"), 56);
    }

    #[test]
    fn test_traverse_cost() {
        let tree = Token::mapping(vec![(Token::string("a"), Token::number(1.0))]);
        assert_eq!(MemoryBudget::calculate_bytes(&tree, false), 24);
        assert_eq!(MemoryBudget::calculate_bytes(&tree, true), 24 + 52 + 24);
    }

    #[test]
    fn test_depth_limit() {
        let mut budget = MemoryBudget::new(2, 100, 100);
        budget.increment_depth().unwrap();
        budget.increment_depth().unwrap();
        let err = budget.increment_depth().unwrap_err();
        assert_eq!(err.resource(), Some(Resource::Depth));
        budget.decrement_depth();
        assert!(budget.increment_depth().is_ok());
    }

    #[test]
    fn test_event_limit() {
        let mut budget = MemoryBudget::new(2, 1, 100);
        budget.increment_events().unwrap();
        assert_eq!(budget.increment_events().unwrap_err().resource(), Some(Resource::Events));
    }

    #[test]
    fn test_byte_limit_and_subtract() {
        let mut budget = MemoryBudget::new(2, 1, 100);
        budget.add_bytes(60).unwrap();
        assert_eq!(budget.add_bytes(41).unwrap_err().resource(), Some(Resource::Bytes));
        assert_eq!(budget.current_bytes(), 60);
        budget.subtract_bytes(60).unwrap();
        assert!(matches!(budget.subtract_bytes(1), Err(FatalError::Invariant(_))));
    }

    #[test]
    fn test_byte_overflow_is_resource_error() {
        let mut budget = MemoryBudget::new(2, 1, usize::MAX);
        budget.add_bytes(10).unwrap();
        assert_eq!(budget.add_bytes(usize::MAX).unwrap_err().resource(), Some(Resource::Bytes));
    }
}
