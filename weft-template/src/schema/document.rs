//! Schema documents
//!
//! Serde model of the YAML/JSON schema format:
//!
//! ```yaml
//! version: workflow-v1.0
//! definitions:
//!   step:
//!     one-of: [run-step, uses-step]
//!   run-step:
//!     context: [github, matrix]
//!     mapping:
//!       properties:
//!         run:
//!           type: non-empty-string
//!           required: true
//!         shell: string
//!   non-empty-string:
//!     string:
//!       require-non-empty: true
//! ```

use super::definition::*;
use super::registry::{SchemaError, SchemaRegistry, SchemaResult};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SchemaDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub definitions: BTreeMap<String, DefinitionDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DefinitionDocument {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub null: Option<EmptyDocument>,
    #[serde(default)]
    pub boolean: Option<EmptyDocument>,
    #[serde(default)]
    pub number: Option<EmptyDocument>,
    #[serde(default)]
    pub string: Option<StringDocument>,
    #[serde(default)]
    pub sequence: Option<SequenceDocument>,
    #[serde(default)]
    pub mapping: Option<MappingDocument>,
    #[serde(default)]
    pub one_of: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmptyDocument {}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StringDocument {
    #[serde(default)]
    pub constant: Option<String>,
    #[serde(default)]
    pub ignore_case: bool,
    #[serde(default)]
    pub require_non_empty: bool,
    #[serde(default)]
    pub is_expression: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SequenceDocument {
    pub item_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MappingDocument {
    /// Kept as a JSON map so declaration order survives deserialization.
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub loose_key_type: Option<String>,
    #[serde(default)]
    pub loose_value_type: Option<String>,
    #[serde(default)]
    pub inherits: Option<String>,
}

/// A property is either a bare type name or a full record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PropertyDocument {
    Type(String),
    Full {
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        description: Option<String>,
    },
}

impl DefinitionDocument {
    pub fn into_definition(self, name: &str) -> SchemaResult<Definition> {
        let invalid = |reason: &str| SchemaError::InvalidDocument {
            definition: name.to_string(),
            reason: reason.to_string(),
        };

        let set = [
            self.null.is_some(),
            self.boolean.is_some(),
            self.number.is_some(),
            self.string.is_some(),
            self.sequence.is_some(),
            self.mapping.is_some(),
            self.one_of.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count();
        if set != 1 {
            return Err(invalid(
                "exactly one of null, boolean, number, string, sequence, mapping or one-of must be set",
            ));
        }

        let definition = if self.null.is_some() {
            Definition::null()
        } else if self.boolean.is_some() {
            Definition::boolean()
        } else if self.number.is_some() {
            Definition::number()
        } else if let Some(string) = self.string {
            Definition::string(StringDefinition {
                constant: string.constant,
                ignore_case: string.ignore_case,
                require_non_empty: string.require_non_empty,
                is_expression: string.is_expression,
            })
        } else if let Some(sequence) = self.sequence {
            Definition::sequence(sequence.item_type)
        } else if let Some(mapping) = self.mapping {
            let mut definition = MappingDefinition::new();
            for (property, value) in mapping.properties {
                let document: PropertyDocument = serde_json::from_value(value)
                    .map_err(|e| invalid(&format!("property '{}': {}", property, e)))?;
                definition.properties.push((property, document.into()));
            }
            definition.loose_key_type = mapping.loose_key_type;
            definition.loose_value_type = mapping.loose_value_type;
            definition.inherits = mapping.inherits;
            Definition::mapping(definition)
        } else if let Some(one_of) = self.one_of {
            Definition::one_of(one_of)
        } else {
            return Err(invalid("missing definition kind"));
        };

        let mut definition = definition.with_context(self.context);
        definition.description = self.description;
        Ok(definition)
    }
}

impl From<PropertyDocument> for PropertyDefinition {
    fn from(document: PropertyDocument) -> Self {
        match document {
            PropertyDocument::Type(type_name) => PropertyDefinition {
                type_name,
                required: false,
                description: None,
            },
            PropertyDocument::Full {
                type_name,
                required,
                description,
            } => PropertyDefinition {
                type_name,
                required,
                description,
            },
        }
    }
}

impl SchemaDocument {
    pub fn into_registry(self) -> SchemaResult<SchemaRegistry> {
        let mut builder = SchemaRegistry::builder();
        for (name, document) in self.definitions {
            let definition = document.into_definition(&name)?;
            builder = builder.definition(name, definition);
        }
        builder.build()
    }
}

impl SchemaRegistry {
    pub fn from_yaml_str(source: &str) -> SchemaResult<Self> {
        let document: SchemaDocument = serde_yaml::from_str(source).map_err(|e| SchemaError::Load {
            reason: e.to_string(),
        })?;
        document.into_registry()
    }

    pub fn from_json_str(source: &str) -> SchemaResult<Self> {
        let document: SchemaDocument = serde_json::from_str(source).map_err(|e| SchemaError::Load {
            reason: e.to_string(),
        })?;
        document.into_registry()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKFLOW: &str = r#"
version: workflow-v1.0
definitions:
  step:
    one-of: [run-step, uses-step]
  run-step:
    description: Runs a shell command
    context: [github, "hashFiles(1,255)"]
    mapping:
      properties:
        run:
          type: non-empty-string
          required: true
        shell: string
  uses-step:
    mapping:
      properties:
        uses:
          type: non-empty-string
          required: true
        with: mapping
  non-empty-string:
    string:
      require-non-empty: true
  env:
    mapping:
      loose-key-type: string
      loose-value-type: string
"#;

    #[test]
    fn test_load_yaml_schema() {
        let schema = SchemaRegistry::from_yaml_str(WORKFLOW).unwrap();
        let run = schema.get_definition("run-step").unwrap();
        assert_eq!(run.description.as_deref(), Some("Runs a shell command"));
        assert_eq!(run.evaluator_context, vec!["github", "hashFiles()"]);

        let DefinitionKind::Mapping(mapping) = &run.kind else {
            panic!("expected mapping");
        };
        let names: Vec<&str> = mapping.properties.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["run", "shell"]);
        assert!(mapping.own_property("run").unwrap().required);
        assert_eq!(mapping.own_property("shell").unwrap().type_name, STRING);
    }

    #[test]
    fn test_load_json_schema() {
        let schema = SchemaRegistry::from_json_str(
            r#"{"definitions": {"flag": {"boolean": {}}, "flags": {"sequence": {"item-type": "flag"}}}}"#,
        )
        .unwrap();
        assert!(schema.contains("flags"));
    }

    #[test]
    fn test_reject_two_kinds() {
        let err = SchemaRegistry::from_yaml_str(
            "definitions:\n  bad:\n    boolean: {}\n    number: {}\n",
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDocument { .. }));
    }

    #[test]
    fn test_reject_unknown_field() {
        let err = SchemaRegistry::from_yaml_str("definitions:\n  bad:\n    strnig: {}\n").unwrap_err();
        assert!(matches!(err, SchemaError::Load { .. }));
    }

    #[test]
    fn test_reject_builtin_redefinition() {
        let err = SchemaRegistry::from_yaml_str("definitions:\n  string:\n    number: {}\n").unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateDefinition { .. }));
    }
}
