//! The `call` method: run an ODM operation on a model

use bson::{oid::ObjectId, Bson, Document};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::RpcError;
use crate::db::FindSpec;
use crate::odm::convert::{bson_to_json, document_to_json, json_to_bson, json_to_document};
use crate::odm::{DocSet, Environment, IntoIds, LoadOutcome};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallParams {
    pub model: String,
    pub method: String,
    /// One id or a list of ids
    #[serde(default)]
    pub ids: Option<Value>,
    /// MongoDB style filter in extended JSON
    #[serde(default)]
    pub query: Option<Value>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub values: Option<Value>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<u64>,
    /// e.g. `{"name": 1, "_id": -1}`
    #[serde(default)]
    pub sort: Option<Value>,
    /// Arguments of a model method
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub load_fields: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

impl CallParams {
    fn query(&self) -> Result<Document, RpcError> {
        match &self.query {
            None | Some(Value::Null) => Ok(Document::new()),
            Some(value) => json_to_document(value)
                .ok_or_else(|| RpcError::invalid_params("'query' must be an object")),
        }
    }

    fn values(&self) -> Result<Document, RpcError> {
        self.values
            .as_ref()
            .and_then(json_to_document)
            .ok_or_else(|| RpcError::invalid_params("'values' must be an object"))
    }

    fn ids(&self) -> Result<Option<Vec<ObjectId>>, RpcError> {
        match &self.ids {
            None | Some(Value::Null) => Ok(None),
            Some(value) => json_to_bson(value)
                .into_ids()
                .map(Some)
                .map_err(|e| RpcError::invalid_params(e.to_string())),
        }
    }

    fn required_ids(&self) -> Result<Vec<ObjectId>, RpcError> {
        self.ids()?
            .ok_or_else(|| RpcError::invalid_params(format!("'{}' needs 'ids'", self.method)))
    }

    fn find_spec(&self) -> Result<FindSpec, RpcError> {
        let mut spec = FindSpec::new();
        if let Some(limit) = self.limit {
            if limit < 0 {
                return Err(RpcError::invalid_params("'limit' must not be negative"));
            }
            spec = spec.with_limit(limit);
        }
        if let Some(offset) = self.offset {
            spec = spec.with_skip(offset);
        }
        match &self.sort {
            None | Some(Value::Null) => {}
            Some(value) => {
                let sort = json_to_document(value)
                    .ok_or_else(|| RpcError::invalid_params("'sort' must be an object"))?;
                spec = spec.with_sort(sort);
            }
        }
        Ok(spec)
    }

    fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(String::as_str).collect()
    }
}

fn ids_to_json(records: &DocSet) -> Value {
    Value::Array(
        records
            .ids()
            .iter()
            .map(|id| Value::String(id.to_hex()))
            .collect(),
    )
}

fn records_to_json(records: &[Document]) -> Value {
    Value::Array(records.iter().map(document_to_json).collect())
}

fn outcome_to_json(outcome: &LoadOutcome) -> Value {
    json!({
        "ids": outcome.ids.iter().map(|id| id.to_hex()).collect::<Vec<_>>(),
        "errors": outcome.errors,
    })
}

/// Run a `call` for the environment's user
pub async fn dispatch(env: &Environment, params: CallParams) -> Result<Value, RpcError> {
    let records = env.model(&params.model)?;
    debug!(model = %params.model, method = %params.method, uid = %env.uid(), "JSON-RPC call");

    let result = match params.method.as_str() {
        "search" => {
            let found = records
                .search_with(params.query()?, params.find_spec()?)
                .await?;
            ids_to_json(&found)
        }
        "count" => json!(records.search_count(params.query()?).await?),
        "read" => {
            let selected = records.browse(params.required_ids()?).await?;
            records_to_json(&selected.read(&params.field_names()).await?)
        }
        "search_read" => {
            let found = records
                .search_with(params.query()?, params.find_spec()?)
                .await?;
            records_to_json(&found.read(&params.field_names()).await?)
        }
        "create" => {
            let created = records.create(params.values()?).await?;
            Value::String(created.id()?.to_hex())
        }
        "write" => {
            let selected = records.browse(params.required_ids()?).await?;
            selected.write(params.values()?).await?;
            Value::Bool(true)
        }
        "unlink" => {
            let selected = match (params.ids()?, &params.query) {
                (Some(ids), _) => records.browse(ids).await?,
                (None, Some(_)) => records.search(params.query()?).await?,
                (None, None) => {
                    return Err(RpcError::invalid_params("'unlink' needs 'ids' or 'query'"))
                }
            };
            json!(selected.unlink().await?)
        }
        "load" => {
            let rows: Vec<Vec<Bson>> = params
                .rows
                .iter()
                .map(|row| row.iter().map(json_to_bson).collect())
                .collect();
            let fields: Vec<&str> = params.load_fields.iter().map(String::as_str).collect();
            outcome_to_json(&records.load(&fields, &rows).await?)
        }
        method => {
            if records.model().get_method(method).is_none() {
                return Err(RpcError::method_not_found(method));
            }
            let target = match params.ids()? {
                Some(ids) => records.browse(ids).await?,
                None => records,
            };
            bson_to_json(&target.call(method, json_to_bson(&params.args)).await?)
        }
    };
    Ok(result)
}
