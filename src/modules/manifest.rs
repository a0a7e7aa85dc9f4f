//! Addon manifests (`manifest.yml`)
//!
//! ```yaml
//! name: library
//! version: 1.0.0
//! description: Books and authors
//! depends: [base]
//! models:
//!   - name: library.book
//!     fields:
//!       - { name: name, type: char, required: true }
//!       - { name: author_id, type: many2one, comodel: library.author, ondelete: restrict }
//! data:
//!   - data/books.yml
//! ```

use std::path::Path;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::odm::convert::{json_to_bson, json_to_document};
use crate::odm::{Field, FieldKind, ModelDefinition, OnDelete};
use crate::types::{OlafError, Result};

fn default_version() -> String {
    "0.1.0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub models: Vec<ModelSpec>,
    /// Data files, relative to the addon directory
    #[serde(default)]
    pub data: Vec<String>,
}

impl Manifest {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Manifest = serde_yaml::from_str(content)?;
        if manifest.name.trim().is_empty() {
            return Err(OlafError::Config("Manifest has an empty name".into()));
        }
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            OlafError::Config(format!("Failed to read manifest {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content).map_err(|e| {
            OlafError::Config(format!("Invalid manifest {}: {}", path.display(), e))
        })
    }

    /// Model definitions declared by this manifest
    pub fn model_definitions(&self) -> Result<Vec<ModelDefinition>> {
        self.models.iter().map(ModelSpec::to_definition).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

impl ModelSpec {
    pub fn to_definition(&self) -> Result<ModelDefinition> {
        let mut model = ModelDefinition::new(&self.name);
        if let Some(description) = &self.description {
            model = model.describe(description);
        }
        for spec in &self.fields {
            model = model.field(spec.to_field(&self.name)?);
        }
        Ok(model)
    }
}

/// Declarative field, as written in a manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub choices: Vec<String>,
    #[serde(default)]
    pub comodel: Option<String>,
    #[serde(default)]
    pub ondelete: Option<String>,
    #[serde(default)]
    pub inverse: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub field_a: Option<String>,
    #[serde(default)]
    pub field_b: Option<String>,
}

impl FieldSpec {
    pub fn to_field(&self, model: &str) -> Result<Field> {
        let missing = |attr: &str| {
            OlafError::Config(format!(
                "Field '{}' of model '{}' ({}) needs '{}'",
                self.name, model, self.kind, attr
            ))
        };
        let comodel = || self.comodel.clone().ok_or_else(|| missing("comodel"));

        let mut field = match self.kind.as_str() {
            "identifier" => Field::identifier(&self.name),
            "char" => Field::char(&self.name),
            "integer" => Field::integer(&self.name),
            "float" => Field::float(&self.name),
            "boolean" => Field::boolean(&self.name),
            "datetime" => Field::datetime(&self.name),
            "password" => Field::password(&self.name),
            "selection" => {
                if self.choices.is_empty() {
                    return Err(missing("choices"));
                }
                Field::selection(&self.name, self.choices.clone())
            }
            "many2one" => Field::many2one(&self.name, comodel()?),
            "one2many" => Field::one2many(
                &self.name,
                comodel()?,
                self.inverse.clone().ok_or_else(|| missing("inverse"))?,
            ),
            "many2many" => Field::many2many(
                &self.name,
                comodel()?,
                self.relation.clone().ok_or_else(|| missing("relation"))?,
                self.field_a.clone().ok_or_else(|| missing("field_a"))?,
                self.field_b.clone().ok_or_else(|| missing("field_b"))?,
            ),
            other => {
                return Err(OlafError::Config(format!(
                    "Field '{}' of model '{}' has unknown type '{}'",
                    self.name, model, other
                )))
            }
        };

        if let Some(length) = self.max_length {
            if !matches!(field.kind, FieldKind::Char { .. }) {
                return Err(OlafError::Config(format!(
                    "Field '{}' of model '{}': max_length only applies to char",
                    self.name, model
                )));
            }
            field = field.max_length(length);
        }
        if let Some(policy) = &self.ondelete {
            let policy: OnDelete = policy.parse()?;
            if !matches!(field.kind, FieldKind::Many2one { .. }) {
                return Err(OlafError::Config(format!(
                    "Field '{}' of model '{}': ondelete only applies to many2one",
                    self.name, model
                )));
            }
            field = field.ondelete(policy);
        }
        if let Some(default) = &self.default {
            field = field.default(yaml_to_bson(default)?);
        }
        if self.required {
            field = field.required();
        }
        if self.unique {
            field = field.unique();
        }
        Ok(field)
    }
}

/// One record of a data file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub model: String,
    /// External id
    pub id: String,
    #[serde(default)]
    pub values: serde_yaml::Mapping,
}

impl DataRecord {
    pub fn values(&self) -> Result<Document> {
        let value = serde_json::to_value(&self.values)?;
        json_to_document(&value).ok_or_else(|| {
            OlafError::Config(format!("Values of data record '{}' are not a mapping", self.id))
        })
    }
}

/// Parse a YAML data file: a list of records
pub fn parse_data(content: &str) -> Result<Vec<DataRecord>> {
    Ok(serde_yaml::from_str(content)?)
}

pub(crate) fn yaml_to_bson(value: &serde_yaml::Value) -> Result<Bson> {
    Ok(json_to_bson(&serde_json::to_value(value)?))
}
