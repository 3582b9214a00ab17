//! Reader: converts a source object model into a validated token tree
//!
//! The reader walks an [`ObjectReader`] event stream against a schema type.
//! Scalars are parsed for `${{ }}` expressions and directives, mappings are
//! matched against their candidate definitions, and every node is charged
//! to the context's memory budget. Validation problems are recorded on the
//! context; only resource and invariant failures abort the read.

mod object;
mod scalar;
mod template_reader;

pub use object::{EventObjectReader, ObjectEvent, ObjectReader, YamlError, MAX_ALIAS_EVENTS};
pub use scalar::{
    directive_name, parse_scalar, EACH_DIRECTIVE, ELSE_DIRECTIVE, ELSE_IF_DIRECTIVE, IF_DIRECTIVE,
    INSERT_DIRECTIVE,
};
pub use template_reader::{read_template, ReadResult};
pub(crate) use template_reader::{merge_context, string_key};
