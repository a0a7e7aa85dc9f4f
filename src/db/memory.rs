//! In-process document store
//!
//! Collections live in a `DashMap` and are lost when the process exits.
//! Queries go through [`filter::matches`], so they behave like MongoDB for
//! the operators the ODM emits.

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use dashmap::DashMap;
use tracing::debug;

use super::filter;
use super::store::{DocumentStore, FindSpec};
use crate::types::{OlafError, Result};

/// Memory-only [`DocumentStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, Vec<Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<()> {
        let id = match doc.get("_id") {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert("_id", id.clone());
                id
            }
        };

        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(OlafError::Database(format!(
                "E11000 duplicate key error collection: {} _id: {}",
                collection, id
            )));
        }
        docs.push(doc);
        Ok(())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        spec: FindSpec,
    ) -> Result<Vec<Document>> {
        let mut found = Vec::new();
        if let Some(docs) = self.collections.get(collection) {
            for doc in docs.iter() {
                if filter::matches(doc, &filter)? {
                    found.push(doc.clone());
                }
            }
        }

        if let Some(sort) = &spec.sort {
            filter::sort_documents(&mut found, sort);
        }

        let skip = spec.skip.unwrap_or(0) as usize;
        let found = found.into_iter().skip(skip);
        Ok(match spec.limit {
            Some(limit) if limit != 0 => found.take(limit.unsigned_abs() as usize).collect(),
            _ => found.collect(),
        })
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64> {
        let Some(docs) = self.collections.get(collection) else {
            return Ok(0);
        };
        let mut count = 0;
        for doc in docs.iter() {
            if filter::matches(doc, &filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> Result<u64> {
        validate_update(&update)?;
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut matched = 0;
        for doc in docs.iter_mut() {
            if filter::matches(doc, &filter)? {
                apply_update(doc, &update);
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64> {
        let Some(mut docs) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut keep = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            keep.push(!filter::matches(doc, &filter)?);
        }
        let before = docs.len();
        let mut flags = keep.into_iter();
        docs.retain(|_| flags.next().unwrap_or(true));
        Ok((before - docs.len()) as u64)
    }

    async fn ensure_index(&self, collection: &str, field: &str, unique: bool) -> Result<()> {
        debug!(collection, field, unique, "Memory store ignores index definition");
        Ok(())
    }
}

fn validate_update(update: &Document) -> Result<()> {
    if update.is_empty() {
        return Err(OlafError::BadRequest("Empty update document".into()));
    }
    for (op, fields) in update {
        if op != "$set" && op != "$unset" {
            return Err(OlafError::BadRequest(format!(
                "Unsupported update operator {}",
                op
            )));
        }
        if !matches!(fields, Bson::Document(_)) {
            return Err(OlafError::BadRequest(format!("{} expects a document", op)));
        }
    }
    Ok(())
}

fn apply_update(doc: &mut Document, update: &Document) {
    if let Ok(set) = update.get_document("$set") {
        for (path, value) in set {
            set_path(doc, path, value.clone());
        }
    }
    if let Ok(unset) = update.get_document("$unset") {
        for path in unset.keys() {
            unset_path(doc, path);
        }
    }
}

fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}
