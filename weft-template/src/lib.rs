//! WEFT Template - schema-driven reading and evaluation of pipeline templates
//!
//! Pipeline documents are read once into an immutable token tree, then
//! evaluated any number of times as more runtime context becomes available.
//!
//! Architecture:
//! ```text
//! YAML / JSON source
//!     ↓
//! ObjectReader (flat event stream)
//!     ↓
//! Reader (schema validation + ${{ }} parsing)
//!     ↓
//! Token tree (Arc-shared, immutable)
//!     ↓
//! Unraveler (expression + directive expansion)
//!     ↓
//! Evaluator (schema validation of the expanded stream)
//!     ↓
//! Token tree (evaluated)
//! ```
//!
//! Every call runs against a [`TemplateContext`] that owns its memory budget
//! and error list. Validation problems accumulate on the context; resource
//! exhaustion and internal invariant failures abort the call as
//! [`weft_core::FatalError`].

pub mod context;
pub mod engine;
pub mod evaluator;
pub mod expression;
pub mod reader;
pub mod schema;
pub mod unraveler;

// Re-export key types for convenience
pub use context::TemplateContext;
pub use engine::TemplateEngine;
pub use evaluator::evaluate_template;
pub use expression::{BasicExpressionEngine, ExpressionEngine, ExpressionError, ExpressionValues};
pub use reader::{read_template, EventObjectReader, ObjectEvent, ObjectReader, ReadResult, YamlError};
pub use schema::{SchemaBuilder, SchemaDocument, SchemaError, SchemaRegistry, SchemaResult};
pub use unraveler::Unraveler;
