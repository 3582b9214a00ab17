//! Schema registry and builder

use super::definition::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use weft_core::{TemplateError, Token, TokenKind};

/// Maximum length of an `inherits` chain.
pub const MAX_INHERITANCE_DEPTH: usize = 10;

static DEFINITION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_-]*$").expect("definition name pattern is valid")
});

static BUILTIN_DEFINITIONS: Lazy<Vec<(&'static str, Definition)>> = Lazy::new(|| {
    vec![
        (NULL, Definition::null()),
        (BOOLEAN, Definition::boolean()),
        (NUMBER, Definition::number()),
        (STRING, Definition::string(StringDefinition::default())),
        (SEQUENCE, Definition::sequence(ANY)),
        (MAPPING, Definition::mapping(MappingDefinition::new().loose(STRING, ANY))),
        (
            ANY,
            Definition::one_of([NULL, BOOLEAN, NUMBER, STRING, SEQUENCE, MAPPING]),
        ),
    ]
});

// ============================================================================
// ERRORS
// ============================================================================

/// Schema build and load errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid definition name '{name}'")]
    InvalidName { name: String },

    #[error("Definition '{name}' is already defined")]
    DuplicateDefinition { name: String },

    #[error("Definition '{definition}' references unknown type '{name}'")]
    UnknownReference { definition: String, name: String },

    #[error("Definition '{definition}' must declare both loose-key-type and loose-value-type")]
    LooseTypesIncomplete { definition: String },

    #[error("Definition '{definition}' has loose-key-type '{name}', which is not a string definition")]
    LooseKeyNotString { definition: String, name: String },

    #[error("Definition '{definition}' inherits '{name}', which is not a mapping definition")]
    InheritsNonMapping { definition: String, name: String },

    #[error("Definition '{definition}' exceeds the maximum inheritance depth of {MAX_INHERITANCE_DEPTH}")]
    InheritanceTooDeep { definition: String },

    #[error("Definition '{definition}' nests the one-of definition '{name}'")]
    NestedOneOf { definition: String, name: String },

    #[error("One-of definition '{definition}' contains more than one {kind} definition")]
    OneOfDuplicateKind { definition: String, kind: String },

    #[error("Definition '{definition}' has an empty context entry")]
    EmptyContextEntry { definition: String },

    #[error("Definition '{definition}': {reason}")]
    InvalidDocument { definition: String, reason: String },

    #[error("Failed to load schema: {reason}")]
    Load { reason: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

// ============================================================================
// SCALAR MATCHING
// ============================================================================

/// Outcome of matching a literal against the scalar alternatives of a position.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarMatch<'a> {
    /// The literal matches as-is.
    Matched(&'a ScalarDefinition),
    /// The literal matches a string definition once rendered as text.
    Coerced(Token, &'a StringDefinition),
    NoMatch,
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Immutable registry of named definitions.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    definitions: HashMap<String, Definition>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Registry containing only the built-in definitions.
    pub fn builtin() -> Self {
        Self {
            definitions: BUILTIN_DEFINITIONS
                .iter()
                .map(|(name, definition)| (name.to_string(), definition.clone()))
                .collect(),
        }
    }

    pub fn get_definition(&self, name: &str) -> Result<&Definition, TemplateError> {
        self.definitions
            .get(name)
            .ok_or_else(|| TemplateError::UnknownType {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    /// Definitions with one-ofs expanded into their alternatives.
    fn expand<'a>(&'a self, definitions: &[&'a Definition]) -> Vec<&'a Definition> {
        let mut expanded = Vec::new();
        for &definition in definitions {
            match &definition.kind {
                DefinitionKind::OneOf(one_of) => {
                    expanded.extend(one_of.one_of.iter().filter_map(|name| self.definitions.get(name)))
                }
                _ => expanded.push(definition),
            }
        }
        expanded
    }

    pub fn scalars<'a>(&'a self, definitions: &[&'a Definition]) -> Vec<&'a ScalarDefinition> {
        self.expand(definitions)
            .into_iter()
            .filter_map(|definition| match &definition.kind {
                DefinitionKind::Scalar(scalar) => Some(scalar),
                _ => None,
            })
            .collect()
    }

    pub fn strings<'a>(&'a self, definitions: &[&'a Definition]) -> Vec<&'a StringDefinition> {
        self.scalars(definitions)
            .into_iter()
            .filter_map(|scalar| match scalar {
                ScalarDefinition::String(string) => Some(string),
                _ => None,
            })
            .collect()
    }

    pub fn sequence<'a>(&'a self, definitions: &[&'a Definition]) -> Option<&'a SequenceDefinition> {
        self.expand(definitions)
            .into_iter()
            .find_map(|definition| match &definition.kind {
                DefinitionKind::Sequence(sequence) => Some(sequence),
                _ => None,
            })
    }

    pub fn mappings<'a>(&'a self, definitions: &[&'a Definition]) -> Vec<&'a MappingDefinition> {
        self.expand(definitions)
            .into_iter()
            .filter_map(|definition| match &definition.kind {
                DefinitionKind::Mapping(mapping) => Some(mapping),
                _ => None,
            })
            .collect()
    }

    /// Walk a mapping definition and its `inherits` chain.
    fn lineage<'a>(&'a self, mapping: &'a MappingDefinition) -> impl Iterator<Item = &'a MappingDefinition> {
        let mut next = Some(mapping);
        let mut depth = 0;
        std::iter::from_fn(move || {
            let current = next?;
            depth += 1;
            next = match &current.inherits {
                Some(parent) if depth <= MAX_INHERITANCE_DEPTH => {
                    match self.definitions.get(parent).map(|d| &d.kind) {
                        Some(DefinitionKind::Mapping(parent)) => Some(parent),
                        _ => None,
                    }
                }
                _ => None,
            };
            Some(current)
        })
    }

    pub fn has_properties(&self, mapping: &MappingDefinition) -> bool {
        self.lineage(mapping).any(|m| !m.properties.is_empty())
    }

    pub fn property<'a>(&'a self, mapping: &'a MappingDefinition, name: &str) -> Option<&'a PropertyDefinition> {
        self.lineage(mapping).find_map(|m| m.own_property(name))
    }

    /// Find the value type for `key` among candidate mappings. Candidates that
    /// do not declare the key are dropped; the first declaring candidate wins.
    pub fn match_mapping_key<'a>(
        &'a self,
        candidates: &mut Vec<&'a MappingDefinition>,
        key: &str,
    ) -> Option<&'a str> {
        let value_type = candidates
            .iter()
            .copied()
            .find_map(|mapping| self.property(mapping, key))
            .map(|property| property.type_name.as_str())?;

        if candidates.len() > 1 {
            candidates.retain(|mapping| self.property(mapping, key).is_some());
        }
        Some(value_type)
    }

    /// Match a literal against the scalar alternatives, falling back to a
    /// string rendering of non-string literals.
    pub fn match_scalar<'a>(&'a self, definitions: &[&'a Definition], literal: &Token) -> ScalarMatch<'a> {
        if let Some(scalar) = self
            .scalars(definitions)
            .into_iter()
            .find(|scalar| scalar.is_match(literal))
        {
            return ScalarMatch::Matched(scalar);
        }

        if !matches!(literal.kind, TokenKind::String(_)) {
            let text = literal.to_string();
            if let Some(string) = self
                .strings(definitions)
                .into_iter()
                .find(|string| string.is_match(&text))
            {
                return ScalarMatch::Coerced(Token::string(text).with_span(literal.span), string);
            }
        }

        ScalarMatch::NoMatch
    }

    /// Sorted property names that only one of the remaining candidates declares.
    pub fn distinguishing_properties(&self, candidates: &[&MappingDefinition]) -> Vec<String> {
        let mut hits: BTreeMap<&str, usize> = BTreeMap::new();
        for mapping in candidates {
            for (name, _) in &mapping.properties {
                *hits.entry(name.as_str()).or_default() += 1;
            }
        }
        hits.into_iter()
            .filter(|(_, count)| *count == 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Required properties of `mapping`, inherited ones included, whose
    /// lowercased names are absent from `keys`.
    pub fn missing_required(&self, mapping: &MappingDefinition, keys: &HashSet<String>) -> Vec<String> {
        self.lineage(mapping)
            .flat_map(|m| m.properties.iter())
            .filter(|(name, property)| property.required && !keys.contains(&name.to_lowercase()))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Collects definitions and validates them together with the built-ins.
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    definitions: Vec<(String, Definition)>,
}

impl SchemaBuilder {
    pub fn definition(mut self, name: impl Into<String>, definition: Definition) -> Self {
        self.definitions.push((name.into(), definition));
        self
    }

    pub fn build(self) -> SchemaResult<SchemaRegistry> {
        let mut registry = SchemaRegistry::builtin();
        for (name, definition) in self.definitions {
            if !DEFINITION_NAME.is_match(&name) {
                return Err(SchemaError::InvalidName { name });
            }
            if registry.definitions.contains_key(&name) {
                return Err(SchemaError::DuplicateDefinition { name });
            }
            registry.definitions.insert(name, definition);
        }

        for (name, definition) in &registry.definitions {
            validate_definition(&registry, name, definition)?;
        }
        Ok(registry)
    }
}

fn validate_definition(registry: &SchemaRegistry, name: &str, definition: &Definition) -> SchemaResult<()> {
    if definition.reader_context.iter().any(|entry| entry.is_empty()) {
        return Err(SchemaError::EmptyContextEntry {
            definition: name.to_string(),
        });
    }

    let require = |reference: &str| -> SchemaResult<&Definition> {
        registry
            .definitions
            .get(reference)
            .ok_or_else(|| SchemaError::UnknownReference {
                definition: name.to_string(),
                name: reference.to_string(),
            })
    };

    match &definition.kind {
        DefinitionKind::Scalar(_) => Ok(()),
        DefinitionKind::Sequence(sequence) => require(&sequence.item_type).map(|_| ()),
        DefinitionKind::Mapping(mapping) => {
            for (_, property) in &mapping.properties {
                require(&property.type_name)?;
            }

            match (&mapping.loose_key_type, &mapping.loose_value_type) {
                (Some(key_type), Some(value_type)) => {
                    let key = require(key_type)?;
                    if !matches!(key.kind, DefinitionKind::Scalar(ScalarDefinition::String(_))) {
                        return Err(SchemaError::LooseKeyNotString {
                            definition: name.to_string(),
                            name: key_type.clone(),
                        });
                    }
                    require(value_type)?;
                }
                (None, None) => {}
                _ => {
                    return Err(SchemaError::LooseTypesIncomplete {
                        definition: name.to_string(),
                    })
                }
            }

            let mut current = mapping;
            let mut depth = 0;
            while let Some(parent) = &current.inherits {
                depth += 1;
                if depth > MAX_INHERITANCE_DEPTH {
                    return Err(SchemaError::InheritanceTooDeep {
                        definition: name.to_string(),
                    });
                }
                current = match &require(parent)?.kind {
                    DefinitionKind::Mapping(parent) => parent,
                    _ => {
                        return Err(SchemaError::InheritsNonMapping {
                            definition: name.to_string(),
                            name: parent.clone(),
                        })
                    }
                };
            }
            Ok(())
        }
        DefinitionKind::OneOf(one_of) => {
            let mut seen: HashSet<&'static str> = HashSet::new();
            for member in &one_of.one_of {
                let kind = match &require(member)?.kind {
                    DefinitionKind::OneOf(_) => {
                        return Err(SchemaError::NestedOneOf {
                            definition: name.to_string(),
                            name: member.clone(),
                        })
                    }
                    DefinitionKind::Sequence(_) => "sequence",
                    DefinitionKind::Scalar(ScalarDefinition::Null) => "null",
                    DefinitionKind::Scalar(ScalarDefinition::Boolean) => "boolean",
                    DefinitionKind::Scalar(ScalarDefinition::Number) => "number",
                    DefinitionKind::Scalar(ScalarDefinition::String(_)) | DefinitionKind::Mapping(_) => continue,
                };
                if !seen.insert(kind) {
                    return Err(SchemaError::OneOfDuplicateKind {
                        definition: name.to_string(),
                        kind: kind.to_string(),
                    });
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps_schema() -> SchemaRegistry {
        SchemaRegistry::builder()
            .definition("step", Definition::one_of(["run-step", "uses-step"]))
            .definition(
                "run-step",
                Definition::mapping(
                    MappingDefinition::new()
                        .required("run", STRING)
                        .property("name", STRING)
                        .property("shell", STRING),
                ),
            )
            .definition(
                "uses-step",
                Definition::mapping(
                    MappingDefinition::new()
                        .required("uses", STRING)
                        .property("name", STRING)
                        .property("with", MAPPING),
                ),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_builtins_present() {
        let schema = SchemaRegistry::builtin();
        for name in [NULL, BOOLEAN, NUMBER, STRING, SEQUENCE, MAPPING, ANY] {
            assert!(schema.contains(name), "missing {}", name);
        }
        let any = schema.get_definition(ANY).unwrap();
        assert_eq!(schema.scalars(&[any]).len(), 4);
        assert!(schema.sequence(&[any]).is_some());
        assert_eq!(schema.mappings(&[any]).len(), 1);
    }

    #[test]
    fn test_unknown_type() {
        let err = SchemaRegistry::builtin().get_definition("nope").unwrap_err();
        assert_eq!(err.to_string(), "Schema definition 'nope' not found");
    }

    #[test]
    fn test_match_mapping_key_narrows() {
        let schema = steps_schema();
        let step = schema.get_definition("step").unwrap();
        let mut candidates = schema.mappings(&[step]);
        assert_eq!(candidates.len(), 2);

        assert_eq!(schema.match_mapping_key(&mut candidates, "NAME"), Some(STRING));
        assert_eq!(candidates.len(), 2);

        assert_eq!(schema.match_mapping_key(&mut candidates, "uses"), Some(STRING));
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].own_property("uses").is_some());

        assert_eq!(schema.match_mapping_key(&mut candidates, "run"), None);
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_distinguishing_properties_sorted() {
        let schema = steps_schema();
        let step = schema.get_definition("step").unwrap();
        let candidates = schema.mappings(&[step]);
        assert_eq!(
            schema.distinguishing_properties(&candidates),
            vec!["run", "shell", "uses", "with"]
        );
    }

    #[test]
    fn test_inherited_property() {
        let schema = SchemaRegistry::builder()
            .definition("base", Definition::mapping(MappingDefinition::new().property("name", STRING)))
            .definition(
                "derived",
                Definition::mapping(MappingDefinition::new().property("id", NUMBER).inherits("base")),
            )
            .build()
            .unwrap();
        let derived = match &schema.get_definition("derived").unwrap().kind {
            DefinitionKind::Mapping(mapping) => mapping,
            _ => unreachable!(),
        };
        assert_eq!(schema.property(derived, "name").map(|p| p.type_name.as_str()), Some(STRING));
        assert!(schema.has_properties(derived));
    }

    #[test]
    fn test_match_scalar_coerces_to_string() {
        let schema = SchemaRegistry::builder()
            .definition("version", Definition::string(StringDefinition::non_empty()))
            .build()
            .unwrap();
        let version = schema.get_definition("version").unwrap();
        match schema.match_scalar(&[version], &Token::number(2.0)) {
            ScalarMatch::Coerced(token, _) => assert_eq!(token.as_str(), Some("2")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(schema.match_scalar(&[version], &Token::string("")), ScalarMatch::NoMatch);
    }

    #[test]
    fn test_build_rejects_invalid_name() {
        let err = SchemaRegistry::builder()
            .definition("1bad", Definition::number())
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidName { .. }));
    }

    #[test]
    fn test_build_rejects_unknown_reference() {
        let err = SchemaRegistry::builder()
            .definition("list", Definition::sequence("missing"))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownReference {
                definition: "list".to_string(),
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_build_rejects_nested_one_of_and_duplicate_kinds() {
        let nested = SchemaRegistry::builder()
            .definition("outer", Definition::one_of([ANY, STRING]))
            .build()
            .unwrap_err();
        assert!(matches!(nested, SchemaError::NestedOneOf { .. }));

        let duplicate = SchemaRegistry::builder()
            .definition("list-a", Definition::sequence(STRING))
            .definition("either", Definition::one_of([SEQUENCE, "list-a"]))
            .build()
            .unwrap_err();
        assert!(matches!(duplicate, SchemaError::OneOfDuplicateKind { .. }));
    }

    #[test]
    fn test_build_rejects_loose_key_not_string() {
        let err = SchemaRegistry::builder()
            .definition("bad", Definition::mapping(MappingDefinition::new().loose(NUMBER, ANY)))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::LooseKeyNotString { .. }));
    }

    #[test]
    fn test_build_rejects_inheritance_cycle() {
        let err = SchemaRegistry::builder()
            .definition("a", Definition::mapping(MappingDefinition::new().inherits("b")))
            .definition("b", Definition::mapping(MappingDefinition::new().inherits("a")))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::InheritanceTooDeep { .. }));
    }
}
