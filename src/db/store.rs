//! Store abstraction shared by the MongoDB and in-memory backends

use async_trait::async_trait;
use bson::Document;

use crate::types::Result;

/// Options for [`DocumentStore::find`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    /// Sort document, e.g. `{ "name": 1 }`
    pub sort: Option<Document>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

impl FindSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort(mut self, sort: Document) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// Named collections of BSON documents.
///
/// Filters and updates use MongoDB query syntax. Updates must use `$set`
/// and/or `$unset`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and `/status`
    fn backend(&self) -> &'static str;

    /// Verify the backend is reachable
    async fn ping(&self) -> Result<()>;

    /// Insert a document. The document must carry an `_id`.
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()>;

    async fn find(&self, collection: &str, filter: Document, spec: FindSpec)
        -> Result<Vec<Document>>;

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>> {
        let mut found = self
            .find(collection, filter, FindSpec::new().with_limit(1))
            .await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64>;

    /// Apply `update` to every matching document, returning how many matched
    async fn update_many(&self, collection: &str, filter: Document, update: Document)
        -> Result<u64>;

    /// Delete every matching document, returning how many were removed
    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64>;

    async fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> Result<()>;
}
