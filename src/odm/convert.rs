//! JSON <-> BSON conversion for the wire, and id promotion in filters
//!
//! Clients speak plain JSON: ObjectIds travel as 24-character hex strings
//! (or `{"$oid": ..}`), datetimes as RFC 3339 strings or `{"$date": ..}`.

use bson::{oid::ObjectId, Bson, Document};
use serde_json::{Map, Number, Value};

use super::fields::FieldKind;
use super::model::ModelDefinition;
use crate::types::{OlafError, Result};

/// Convert client JSON into BSON, honouring `$oid` and `$date` wrappers
pub fn json_to_bson(value: &Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Bson::String(s.clone()),
        Value::Array(items) => Bson::Array(items.iter().map(json_to_bson).collect()),
        Value::Object(map) => {
            if let Some(special) = extended_value(map) {
                return special;
            }
            Bson::Document(json_object_to_document(map))
        }
    }
}

/// Convert a JSON object into a document. Non-objects yield `None`.
pub fn json_to_document(value: &Value) -> Option<Document> {
    match value {
        Value::Object(map) => Some(json_object_to_document(map)),
        _ => None,
    }
}

fn json_object_to_document(map: &Map<String, Value>) -> Document {
    map.iter()
        .map(|(k, v)| (k.clone(), json_to_bson(v)))
        .collect()
}

fn extended_value(map: &Map<String, Value>) -> Option<Bson> {
    if map.len() != 1 {
        return None;
    }
    match map.iter().next()? {
        (key, Value::String(hex)) if key == "$oid" => {
            ObjectId::parse_str(hex).ok().map(Bson::ObjectId)
        }
        (key, Value::String(text)) if key == "$date" => chrono::DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| Bson::DateTime(bson::DateTime::from_chrono(dt.with_timezone(&chrono::Utc)))),
        (key, Value::Number(millis)) if key == "$date" => millis
            .as_i64()
            .map(|ms| Bson::DateTime(bson::DateTime::from_millis(ms))),
        _ => None,
    }
}

/// Convert BSON into client JSON. ObjectIds become hex strings and
/// datetimes RFC 3339 strings.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(d) => Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        Bson::String(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(dt.to_chrono().to_rfc3339()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => document_to_json(doc),
        other => other.clone().into_relaxed_extjson(),
    }
}

pub fn document_to_json(doc: &Document) -> Value {
    Value::Object(
        doc.iter()
            .map(|(k, v)| (k.clone(), bson_to_json(v)))
            .collect(),
    )
}

/// Turn hex strings into ObjectIds wherever the filter targets `_id`, an
/// identifier or a Many2one field of `model`.
///
/// Password fields cannot be filtered on, and the only top level operators
/// accepted are `$and`, `$or` and `$nor`.
pub fn normalize_filter(model: &ModelDefinition, filter: &Document) -> Result<Document> {
    let mut normalized = Document::new();
    for (key, value) in filter {
        let value = match key.as_str() {
            "$and" | "$or" | "$nor" => match value {
                Bson::Array(items) => Bson::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Bson::Document(sub) => normalize_filter(model, sub).map(Bson::Document),
                            other => Ok(other.clone()),
                        })
                        .collect::<Result<_>>()?,
                ),
                other => other.clone(),
            },
            op if op.starts_with('$') => {
                return Err(OlafError::Validation(format!(
                    "Operator '{}' is not allowed at the top of a filter",
                    op
                )))
            }
            field if is_password(model, field) => {
                return Err(OlafError::Validation(format!(
                    "Field '{}' of '{}' cannot be used in a filter",
                    field,
                    model.name()
                )))
            }
            field if holds_ids(model, field) => promote_ids(value),
            _ => value.clone(),
        };
        normalized.insert(key.clone(), value);
    }
    Ok(normalized)
}

/// True when `path` (possibly dotted) starts at a Password field
pub(crate) fn is_password(model: &ModelDefinition, path: &str) -> bool {
    let head = path.split('.').next().unwrap_or(path);
    matches!(model.get_field(head).map(|f| &f.kind), Some(FieldKind::Password))
}

fn holds_ids(model: &ModelDefinition, field: &str) -> bool {
    field == "_id"
        || matches!(
            model.get_field(field).map(|f| &f.kind),
            Some(FieldKind::Identifier) | Some(FieldKind::Many2one { .. })
        )
}

fn promote_ids(value: &Bson) -> Bson {
    match value {
        Bson::String(s) => ObjectId::parse_str(s)
            .map(Bson::ObjectId)
            .unwrap_or_else(|_| value.clone()),
        Bson::Array(items) => Bson::Array(items.iter().map(promote_ids).collect()),
        Bson::Document(ops) => Bson::Document(
            ops.iter()
                .map(|(op, arg)| {
                    let arg = match op.as_str() {
                        "$eq" | "$ne" | "$in" | "$nin" | "$gt" | "$gte" | "$lt" | "$lte"
                        | "$not" => promote_ids(arg),
                        _ => arg.clone(),
                    };
                    (op.clone(), arg)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
