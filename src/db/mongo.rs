//! MongoDB client and store
//!
//! Every model maps to one collection of the configured database. Records
//! are plain BSON documents, so the store works on `Collection<Document>`.

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::{
    options::{FindOptions, IndexOptions},
    Client, Collection, IndexModel,
};
use tracing::{debug, info};

use super::store::{DocumentStore, FindSpec};
use crate::types::{OlafError, Result};

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and verify the server answers within `timeout_ms`
    pub async fn new(uri: &str, db_name: &str, timeout_ms: u64) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let separator = if uri.contains('?') { '&' } else { '?' };
        let timeout_uri = format!(
            "{}{}serverSelectionTimeoutMS={}&connectTimeoutMS={}",
            uri, separator, timeout_ms, timeout_ms
        );

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| OlafError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| OlafError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Untyped handle on one collection
    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.client.database(&self.db_name).collection::<Document>(name)
    }

    /// Get the raw MongoDB client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// [`DocumentStore`] backed by a MongoDB database
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
}

impl MongoStore {
    pub fn new(client: MongoClient) -> Self {
        Self { client }
    }

    /// Connect using the configured URI, database and timeout
    pub async fn connect(uri: &str, db_name: &str, timeout_ms: u64) -> Result<Self> {
        Ok(Self::new(MongoClient::new(uri, db_name, timeout_ms).await?))
    }

    pub fn client(&self) -> &MongoClient {
        &self.client
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    fn backend(&self) -> &'static str {
        "mongodb"
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .inner()
            .database(self.client.db_name())
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| OlafError::Database(format!("MongoDB ping failed: {}", e)))?;
        Ok(())
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<()> {
        self.client
            .collection(collection)
            .insert_one(doc)
            .await
            .map_err(|e| OlafError::Database(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        let options = FindOptions::builder()
            .limit(spec.limit)
            .skip(spec.skip)
            .sort(spec.sort)
            .build();

        let cursor = self
            .client
            .collection(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| OlafError::Database(format!("Find failed: {}", e)))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| OlafError::Database(format!("Error reading documents: {}", e)))
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        self.client
            .collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| OlafError::Database(format!("Count failed: {}", e)))
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        let result = self
            .client
            .collection(collection)
            .update_many(filter, update)
            .await
            .map_err(|e| OlafError::Database(format!("Update failed: {}", e)))?;
        Ok(result.matched_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let result = self
            .client
            .collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| OlafError::Database(format!("Delete failed: {}", e)))?;
        Ok(result.deleted_count)
    }

    async fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> Result<()> {
        // Unset values are stored as null and must not collide
        let partial = unique.then(|| {
            doc! { field: { "$type": ["string", "number", "objectId", "date", "bool"] } }
        });
        let index = IndexModel::builder()
            .keys(doc! { field: 1 })
            .options(
                IndexOptions::builder()
                    .unique(unique)
                    .partial_filter_expression(partial)
                    .name(format!("{}_{}", field, if unique { "unique" } else { "idx" }))
                    .build(),
            )
            .build();

        self.client
            .collection(collection)
            .create_index(index)
            .await
            .map_err(|e| OlafError::Database(format!("Failed to create index: {}", e)))?;
        debug!(collection, field, unique, "Index ensured");
        Ok(())
    }
}
