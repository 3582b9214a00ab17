//! Definition types

use weft_core::{Token, TokenKind};

pub const NULL: &str = "null";
pub const BOOLEAN: &str = "boolean";
pub const NUMBER: &str = "number";
pub const STRING: &str = "string";
pub const SEQUENCE: &str = "sequence";
pub const MAPPING: &str = "mapping";
pub const ANY: &str = "any";

/// A named schema rule: the legal shape of a document position and the
/// expression context available there.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub description: Option<String>,
    /// Raw context entries, e.g. `hashFiles(1,255)`.
    pub reader_context: Vec<String>,
    /// Context entries with function signatures normalized to `name()`.
    pub evaluator_context: Vec<String>,
    pub kind: DefinitionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionKind {
    Scalar(ScalarDefinition),
    Sequence(SequenceDefinition),
    Mapping(MappingDefinition),
    OneOf(OneOfDefinition),
}

impl Definition {
    pub fn new(kind: DefinitionKind) -> Self {
        Self {
            description: None,
            reader_context: Vec::new(),
            evaluator_context: Vec::new(),
            kind,
        }
    }

    pub fn null() -> Self {
        Self::new(DefinitionKind::Scalar(ScalarDefinition::Null))
    }

    pub fn boolean() -> Self {
        Self::new(DefinitionKind::Scalar(ScalarDefinition::Boolean))
    }

    pub fn number() -> Self {
        Self::new(DefinitionKind::Scalar(ScalarDefinition::Number))
    }

    pub fn string(definition: StringDefinition) -> Self {
        Self::new(DefinitionKind::Scalar(ScalarDefinition::String(definition)))
    }

    pub fn sequence(item_type: impl Into<String>) -> Self {
        Self::new(DefinitionKind::Sequence(SequenceDefinition {
            item_type: item_type.into(),
        }))
    }

    pub fn mapping(definition: MappingDefinition) -> Self {
        Self::new(DefinitionKind::Mapping(definition))
    }

    pub fn one_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(DefinitionKind::OneOf(OneOfDefinition {
            one_of: names.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the allowed expression context from raw entries.
    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (reader, evaluator) = normalize_context(context.into_iter().map(Into::into));
        self.reader_context = reader;
        self.evaluator_context = evaluator;
        self
    }
}

/// Split raw context entries into reader and evaluator forms.
pub(crate) fn normalize_context(
    context: impl IntoIterator<Item = String>,
) -> (Vec<String>, Vec<String>) {
    let mut reader = Vec::new();
    let mut evaluator = Vec::new();
    for entry in context {
        let entry = entry.trim().to_string();
        let normalized = match entry.find('(') {
            Some(paren) => format!("{}()", &entry[..paren]),
            None => entry.clone(),
        };
        reader.push(entry);
        evaluator.push(normalized);
    }
    (reader, evaluator)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarDefinition {
    Null,
    Boolean,
    Number,
    String(StringDefinition),
}

impl ScalarDefinition {
    pub fn is_match(&self, literal: &Token) -> bool {
        match (self, &literal.kind) {
            (ScalarDefinition::Null, TokenKind::Null) => true,
            (ScalarDefinition::Boolean, TokenKind::Boolean(_)) => true,
            (ScalarDefinition::Number, TokenKind::Number(_)) => true,
            (ScalarDefinition::String(definition), TokenKind::String(value)) => {
                definition.is_match(value)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringDefinition {
    pub constant: Option<String>,
    pub ignore_case: bool,
    pub require_non_empty: bool,
    /// The value is itself expression text, checked at read time.
    pub is_expression: bool,
}

impl StringDefinition {
    pub fn constant(value: impl Into<String>) -> Self {
        Self {
            constant: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn non_empty() -> Self {
        Self {
            require_non_empty: true,
            ..Self::default()
        }
    }

    pub fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    pub fn expression(mut self) -> Self {
        self.is_expression = true;
        self
    }

    pub fn is_match(&self, value: &str) -> bool {
        if let Some(constant) = &self.constant {
            if self.ignore_case {
                constant.to_lowercase() == value.to_lowercase()
            } else {
                constant == value
            }
        } else if self.require_non_empty {
            !value.is_empty()
        } else {
            true
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceDefinition {
    pub item_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub type_name: String,
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingDefinition {
    /// Declared properties in declaration order.
    pub properties: Vec<(String, PropertyDefinition)>,
    pub loose_key_type: Option<String>,
    pub loose_value_type: Option<String>,
    pub inherits: Option<String>,
}

impl MappingDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.push((
            name.into(),
            PropertyDefinition {
                type_name: type_name.into(),
                required: false,
                description: None,
            },
        ));
        self
    }

    pub fn required(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.push((
            name.into(),
            PropertyDefinition {
                type_name: type_name.into(),
                required: true,
                description: None,
            },
        ));
        self
    }

    pub fn loose(mut self, key_type: impl Into<String>, value_type: impl Into<String>) -> Self {
        self.loose_key_type = Some(key_type.into());
        self.loose_value_type = Some(value_type.into());
        self
    }

    pub fn inherits(mut self, name: impl Into<String>) -> Self {
        self.inherits = Some(name.into());
        self
    }

    /// Case-insensitive lookup among this definition's own properties.
    pub fn own_property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties
            .iter()
            .find(|(declared, _)| declared.eq_ignore_ascii_case(name))
            .map(|(_, property)| property)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OneOfDefinition {
    pub one_of: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_normalization() {
        let definition = Definition::null().with_context(["github", "hashFiles(1,255)"]);
        assert_eq!(definition.reader_context, vec!["github", "hashFiles(1,255)"]);
        assert_eq!(definition.evaluator_context, vec!["github", "hashFiles()"]);
    }

    #[test]
    fn test_string_constant_match() {
        let exact = StringDefinition::constant("push");
        assert!(exact.is_match("push"));
        assert!(!exact.is_match("Push"));
        assert!(StringDefinition::constant("push").ignore_case().is_match("PUSH"));
        assert!(!StringDefinition::non_empty().is_match(""));
        assert!(StringDefinition::default().is_match(""));
    }

    #[test]
    fn test_scalar_kind_match() {
        assert!(ScalarDefinition::Number.is_match(&Token::number(1.0)));
        assert!(!ScalarDefinition::Number.is_match(&Token::string("1")));
        assert!(ScalarDefinition::Null.is_match(&Token::null()));
    }

    #[test]
    fn test_own_property_is_case_insensitive() {
        let mapping = MappingDefinition::new().required("Name", STRING);
        assert!(mapping.own_property("name").is_some_and(|p| p.required));
        assert!(mapping.own_property("other").is_none());
    }
}
