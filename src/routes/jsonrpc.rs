//! `/jsonrpc`: authenticated JSON-RPC endpoint

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

use super::{json_response, message_response};
use crate::auth::authenticate;
use crate::rpc;
use crate::server::AppState;

pub async fn handle_jsonrpc(
    state: Arc<AppState>,
    auth_header: Option<&str>,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let uid = match authenticate(&state.jwt, state.store.as_ref(), auth_header).await {
        Ok(uid) => uid,
        Err(rejection) => {
            debug!(reason = %rejection, "JSON-RPC request rejected");
            return message_response(rejection.status_code(), &rejection.to_string());
        }
    };

    let env = state.env(uid);
    let response = rpc::handle(&env, body).await;
    json_response(StatusCode::OK, &response)
}
