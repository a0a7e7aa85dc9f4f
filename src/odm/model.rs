//! Model definitions
//!
//! A model is a named collection plus its fields and the server-side methods
//! callable on its record sets.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use bson::Bson;
use futures::future::BoxFuture;

use super::docset::DocSet;
use super::fields::{is_magic, Field};
use crate::types::Result;

/// Name of the field used as a record's display name
pub const REC_NAME: &str = "name";

/// Server-side method bound to a model
pub type ModelMethod = Arc<dyn Fn(DocSet, Bson) -> BoxFuture<'static, Result<Bson>> + Send + Sync>;

#[derive(Clone)]
pub struct ModelDefinition {
    name: String,
    description: Option<String>,
    fields: Vec<Field>,
    methods: HashMap<String, ModelMethod>,
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<&String> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("fields", &self.fields.iter().map(|f| &f.name).collect::<Vec<_>>())
            .field("methods", &methods)
            .finish()
    }
}

impl ModelDefinition {
    /// New model carrying only the magic fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            fields: vec![
                Field::identifier("_id"),
                Field::datetime("create_date"),
                Field::datetime("write_date"),
                Field::identifier("create_uid"),
                Field::identifier("write_uid"),
            ],
            methods: HashMap::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a field, replacing any field of the same name
    pub fn field(mut self, field: Field) -> Self {
        self.put_field(field);
        self
    }

    /// Register a method callable through [`DocSet::call`] and JSON-RPC
    pub fn method<F, Fut>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(DocSet, Bson) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bson>> + Send + 'static,
    {
        let method: ModelMethod = Arc::new(move |records, args| Box::pin(method(records, args)));
        self.methods.insert(name.into(), method);
        self
    }

    fn put_field(&mut self, field: Field) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Merge another definition of the same model into this one
    pub fn extend(&mut self, other: ModelDefinition) {
        for field in other.fields.into_iter().filter(|f| !is_magic(&f.name)) {
            self.put_field(field);
        }
        self.methods.extend(other.methods);
        if other.description.is_some() {
            self.description = other.description;
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    /// Stored fields the caller may set, i.e. excluding the magic ones
    pub fn writable_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.is_stored() && !is_magic(&f.name))
    }

    pub fn x2many_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_x2many())
    }

    pub fn get_method(&self, name: &str) -> Option<&ModelMethod> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Field used as display name, when the model has one
    pub fn rec_name(&self) -> Option<&str> {
        self.has_field(REC_NAME).then_some(REC_NAME)
    }
}
