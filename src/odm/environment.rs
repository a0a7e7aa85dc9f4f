//! Execution environment: who is acting, against which registry and store

use std::fmt;
use std::sync::Arc;

use bson::oid::ObjectId;

use super::docset::DocSet;
use super::registry::ModelRegistry;
use crate::db::DocumentStore;
use crate::types::Result;

/// Id of the superuser. Root bypasses access control.
pub fn root_uid() -> ObjectId {
    ObjectId::from_bytes([0; 12])
}

#[derive(Clone)]
pub struct Environment {
    uid: ObjectId,
    registry: Arc<ModelRegistry>,
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("uid", &self.uid)
            .field("models", &self.registry.len())
            .field("store", &self.store.backend())
            .finish()
    }
}

impl Environment {
    pub fn new(uid: ObjectId, registry: Arc<ModelRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            uid,
            registry,
            store,
        }
    }

    /// Environment acting as root
    pub fn root(registry: Arc<ModelRegistry>, store: Arc<dyn DocumentStore>) -> Self {
        Self::new(root_uid(), registry, store)
    }

    pub fn uid(&self) -> ObjectId {
        self.uid
    }

    pub fn is_root(&self) -> bool {
        self.uid == root_uid()
    }

    /// Same registry and store, acting as another user
    pub fn with_uid(&self, uid: ObjectId) -> Self {
        Self {
            uid,
            ..self.clone()
        }
    }

    pub fn sudo(&self) -> Self {
        self.with_uid(root_uid())
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Empty record set of `model`
    pub fn model(&self, model: &str) -> Result<DocSet> {
        let definition = self.registry.get(model)?;
        Ok(DocSet::new(self.clone(), definition, Vec::new()))
    }
}
