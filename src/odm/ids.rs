//! Things that can be turned into a list of record ids

use bson::{oid::ObjectId, Bson};

use super::docset::DocSet;
use super::fields::{parse_object_id, to_object_id};
use crate::types::{OlafError, Result};

pub trait IntoIds {
    fn into_ids(self) -> Result<Vec<ObjectId>>;
}

impl IntoIds for ObjectId {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        Ok(vec![self])
    }
}

impl IntoIds for &ObjectId {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        Ok(vec![*self])
    }
}

impl IntoIds for &str {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        Ok(vec![parse_object_id(self)?])
    }
}

impl IntoIds for String {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        self.as_str().into_ids()
    }
}

impl IntoIds for &DocSet {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        Ok(self.ids().to_vec())
    }
}

impl<T: IntoIds> IntoIds for Vec<T> {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::with_capacity(self.len());
        for item in self {
            ids.extend(item.into_ids()?);
        }
        Ok(ids)
    }
}

impl<T: IntoIds + Clone> IntoIds for &[T] {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        self.to_vec().into_ids()
    }
}

impl IntoIds for &Bson {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        match self {
            Bson::Array(items) => items.iter().map(to_object_id).collect(),
            Bson::Null => Ok(Vec::new()),
            Bson::ObjectId(_) | Bson::String(_) | Bson::Document(_) => Ok(vec![to_object_id(self)?]),
            other => Err(OlafError::InvalidId(format!(
                "expected an id or a list of ids, got {}",
                other
            ))),
        }
    }
}

impl IntoIds for Bson {
    fn into_ids(self) -> Result<Vec<ObjectId>> {
        (&self).into_ids()
    }
}

/// Drop duplicates, keeping first occurrences
pub(crate) fn dedup(ids: Vec<ObjectId>) -> Vec<ObjectId> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
