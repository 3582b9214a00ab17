//! Schema registry
//!
//! Named definitions describe the legal shape of every document position and
//! the expression context available there.

pub mod definition;
pub mod document;
pub mod registry;

pub use definition::*;
pub use document::SchemaDocument;
pub use registry::{ScalarMatch, SchemaBuilder, SchemaError, SchemaRegistry, SchemaResult};
