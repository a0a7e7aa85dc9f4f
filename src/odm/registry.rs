//! Model registry
//!
//! Addons register model definitions into a [`RegistryBuilder`]; `build`
//! checks the relational graph and freezes it into a [`ModelRegistry`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use super::fields::{FieldKind, OnDelete};
use super::model::ModelDefinition;
use crate::types::{OlafError, Result};

/// A Many2one pointing at a model, and what to do when its target is deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionConstraint {
    /// Model holding the Many2one
    pub model: String,
    pub field: String,
    pub ondelete: OnDelete,
}

/// Relation collection and column holding ids of a model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationColumn {
    pub relation: String,
    pub column: String,
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: Vec<ModelDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model. A second registration of the same name extends it.
    pub fn add(&mut self, model: ModelDefinition) -> &mut Self {
        match self.models.iter_mut().find(|m| m.name() == model.name()) {
            Some(existing) => {
                debug!(model = model.name(), "Extending model");
                existing.extend(model);
            }
            None => {
                debug!(model = model.name(), "Registering model");
                self.models.push(model);
            }
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.name() == name)
    }

    /// Validate relations and compute deletion constraints
    pub fn build(self) -> Result<ModelRegistry> {
        let names: HashSet<&str> = self.models.iter().map(|m| m.name()).collect();

        let mut constraints: HashMap<String, Vec<DeletionConstraint>> = HashMap::new();
        let mut relation_columns: HashMap<String, Vec<RelationColumn>> = HashMap::new();

        for model in &self.models {
            for field in model.fields() {
                if let Some(comodel) = field.comodel() {
                    if !names.contains(comodel) {
                        return Err(OlafError::Config(format!(
                            "Field '{}' of model '{}' points to unknown model '{}'",
                            field.name,
                            model.name(),
                            comodel
                        )));
                    }
                }

                match &field.kind {
                    FieldKind::Many2one { comodel, ondelete } => {
                        constraints
                            .entry(comodel.clone())
                            .or_default()
                            .push(DeletionConstraint {
                                model: model.name().to_string(),
                                field: field.name.clone(),
                                ondelete: *ondelete,
                            });
                    }
                    FieldKind::One2many { comodel, inverse } => {
                        let target = self.models.iter().find(|m| m.name() == comodel);
                        let points_back = target
                            .and_then(|m| m.get_field(inverse))
                            .map(|f| matches!(&f.kind, FieldKind::Many2one { comodel, .. } if comodel == model.name()))
                            .unwrap_or(false);
                        if !points_back {
                            return Err(OlafError::Config(format!(
                                "One2many '{}.{}' needs a Many2one '{}' on '{}' pointing back",
                                model.name(),
                                field.name,
                                inverse,
                                comodel
                            )));
                        }
                    }
                    FieldKind::Many2many {
                        comodel,
                        relation,
                        field_a,
                        field_b,
                    } => {
                        for (owner, column) in [(model.name(), field_a), (comodel.as_str(), field_b)] {
                            let columns = relation_columns.entry(owner.to_string()).or_default();
                            let entry = RelationColumn {
                                relation: relation.clone(),
                                column: column.clone(),
                            };
                            if !columns.contains(&entry) {
                                columns.push(entry);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let order = self.models.iter().map(|m| m.name().to_string()).collect();
        let models = self
            .models
            .into_iter()
            .map(|m| (m.name().to_string(), Arc::new(m)))
            .collect();

        Ok(ModelRegistry {
            models,
            order,
            constraints,
            relation_columns,
        })
    }
}

/// Immutable set of models known to the running instance
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelDefinition>>,
    order: Vec<String>,
    constraints: HashMap<String, Vec<DeletionConstraint>>,
    relation_columns: HashMap<String, Vec<RelationColumn>>,
}

impl ModelRegistry {
    pub fn get(&self, name: &str) -> Result<Arc<ModelDefinition>> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| OlafError::ModelNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Model names in registration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Many2one fields anywhere in the registry that point at `model`
    pub fn constraints_on(&self, model: &str) -> &[DeletionConstraint] {
        self.constraints.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Relation columns that store ids of `model`
    pub fn relation_columns(&self, model: &str) -> &[RelationColumn] {
        self.relation_columns
            .get(model)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
