//! WEFT Core - tokens, errors and resource accounting
//!
//! Shared by the template reader and evaluator:
//!
//! ```text
//! Token / TokenKind / Span   document tree with source positions
//! TemplateError              recoverable, accumulated in ValidationErrors
//! FatalError                 aborts a read or evaluate call
//! MemoryBudget               depth / event / byte counters per call
//! TemplateConfig             limits and directive switches
//! TraceWriter                diagnostics sink
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod token;
pub mod trace;

pub use config::*;
pub use error::*;
pub use memory::*;
pub use token::*;
pub use trace::*;
