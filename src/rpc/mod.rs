//! JSON-RPC 2.0 over `POST /jsonrpc`
//!
//! Only one method exists, `call`, which runs an ODM operation on a model:
//!
//! ```json
//! {"jsonrpc": "2.0", "id": 1, "method": "call",
//!  "params": {"model": "base.user", "method": "search_read",
//!             "query": {"email": "root"}, "fields": ["name"]}}
//! ```
//!
//! Responses are always HTTP 200; failures travel in the `error` member.

mod call;

pub use call::{dispatch, CallParams};

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::odm::Environment;
use crate::types::OlafError;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;

const ENVELOPE_KEYS: [&str; 4] = ["jsonrpc", "id", "method", "params"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            data: Some(json!({ "method": method })),
            ..Self::new(METHOD_NOT_FOUND, "Method not found")
        }
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self {
            data: Some(json!({ "detail": detail.into() })),
            ..Self::new(INVALID_PARAMS, "Invalid params")
        }
    }
}

impl From<OlafError> for RpcError {
    fn from(err: OlafError) -> Self {
        Self {
            code: SERVER_ERROR,
            message: err.to_string(),
            data: Some(json!({
                "kind": err.kind(),
                "status": err.status_code().as_u16(),
            })),
        }
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result })
}

fn failure(id: Value, error: RpcError) -> Value {
    json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "error": error })
}

/// Validate the envelope, returning the request id and the object
fn envelope(request: &Value) -> Result<(Value, &Map<String, Value>), (Value, RpcError)> {
    let Some(object) = request.as_object() else {
        return Err((Value::Null, RpcError::invalid_request()));
    };
    let id = object.get("id").cloned().unwrap_or(Value::Null);

    let valid_id = matches!(id, Value::Null | Value::Number(_) | Value::String(_));
    let valid_keys = object.keys().all(|k| ENVELOPE_KEYS.contains(&k.as_str()));
    let valid_version = object.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION);
    let valid_method = object.get("method").map(Value::is_string).unwrap_or(false);

    if !(valid_id && valid_keys && valid_version && valid_method) {
        let id = if valid_id { id } else { Value::Null };
        return Err((id, RpcError::invalid_request()));
    }
    Ok((id, object))
}

/// Handle one request body and build the response document
pub async fn handle(env: &Environment, body: &[u8]) -> Value {
    let request: Value = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "Unparseable JSON-RPC body");
            return failure(Value::Null, RpcError::parse_error());
        }
    };

    let (id, object) = match envelope(&request) {
        Ok(parts) => parts,
        Err((id, error)) => return failure(id, error),
    };

    let method = object.get("method").and_then(Value::as_str).unwrap_or_default();
    if method != "call" {
        return failure(id, RpcError::method_not_found(method));
    }

    let params: CallParams = match object.get("params") {
        Some(params) => match serde_json::from_value(params.clone()) {
            Ok(params) => params,
            Err(e) => return failure(id, RpcError::invalid_params(e.to_string())),
        },
        None => return failure(id, RpcError::invalid_params("missing params")),
    };

    match dispatch(env, params).await {
        Ok(result) => success(id, result),
        Err(error) => {
            if error.code == SERVER_ERROR {
                warn!(uid = %env.uid(), message = %error.message, "JSON-RPC call failed");
            }
            failure(id, error)
        }
    }
}
