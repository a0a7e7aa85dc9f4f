//! Document level security rules

use bson::{doc, oid::ObjectId, Bson, Document};
use tracing::debug;

use super::{user_groups, Operation, DLS_MODEL, GROUP_DLS_REL};
use crate::db::FindSpec;
use crate::odm::convert::{json_to_document, normalize_filter};
use crate::odm::{Environment, ModelDefinition};
use crate::types::{OlafError, Result};

/// Filter restricting what the environment's user may touch in `model`
/// for `op`, or `None` when no rule applies.
///
/// Rules of every group the user belongs to are OR-combined.
pub async fn rule_filter(
    env: &Environment,
    model: &ModelDefinition,
    op: Operation,
) -> Result<Option<Document>> {
    if env.is_root() {
        return Ok(None);
    }
    let store = env.store();
    let groups = user_groups(store, env.uid()).await?;
    if groups.is_empty() {
        return Ok(None);
    }

    let rule_ids: Vec<ObjectId> = store
        .find(
            GROUP_DLS_REL,
            doc! { "group_oid": { "$in": groups } },
            FindSpec::new(),
        )
        .await?
        .iter()
        .filter_map(|row| row.get_object_id("dls_oid").ok())
        .collect();
    if rule_ids.is_empty() {
        return Ok(None);
    }

    let mut active = doc! { "_id": { "$in": rule_ids }, "model": model.name() };
    active.insert(op.rule_flag(), true);
    let rules = store
        .find(DLS_MODEL, active, FindSpec::new().with_sort(doc! { "_id": 1 }))
        .await?;

    let mut queries = Vec::with_capacity(rules.len());
    for rule in &rules {
        let name = rule.get_str("name").unwrap_or_default();
        let query = rule.get_str("query").unwrap_or("{}");
        queries.push(Bson::Document(parse_query(model, name, query)?));
    }

    debug!(model = model.name(), operation = %op, rules = queries.len(), "Document level rules apply");
    Ok(match queries.len() {
        0 => None,
        1 => queries.pop().and_then(|q| q.as_document().cloned()),
        _ => Some(doc! { "$or": queries }),
    })
}

/// Parse the JSON query of a rule into a store filter
pub(crate) fn parse_query(model: &ModelDefinition, rule: &str, query: &str) -> Result<Document> {
    let invalid = |detail: String| {
        OlafError::Validation(format!(
            "Document level rule '{}' on '{}' has an invalid query: {}",
            rule,
            model.name(),
            detail
        ))
    };
    let value: serde_json::Value =
        serde_json::from_str(query).map_err(|e| invalid(e.to_string()))?;
    let filter = json_to_document(&value).ok_or_else(|| invalid("not a JSON object".into()))?;
    normalize_filter(model, &filter)
}
