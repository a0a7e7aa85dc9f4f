//! `/token`: trade email and password for an access token

use bson::doc;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{error_response, json_response, message_response};
use crate::auth::verify_password;
use crate::security::USER_MODEL;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
}

const BAD_CREDENTIALS: &str = "Bad Username or Password";

pub async fn handle_token(state: Arc<AppState>, body: &[u8]) -> Response<Full<Bytes>> {
    let request: TokenRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(_) => return message_response(StatusCode::BAD_REQUEST, "Malformed Request"),
    };

    let user = match state
        .store
        .find_one(USER_MODEL, doc! { "email": request.email.as_str() })
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!(email = %request.email, "Token refused: unknown email");
            return message_response(StatusCode::UNAUTHORIZED, BAD_CREDENTIALS);
        }
        Err(e) => return error_response(&e),
    };

    let hash = user.get_str("password").unwrap_or_default();
    if !verify_password(&request.password, hash).unwrap_or(false) {
        info!(email = %request.email, "Token refused: wrong password");
        return message_response(StatusCode::UNAUTHORIZED, BAD_CREDENTIALS);
    }

    let uid = match user.get_object_id("_id") {
        Ok(uid) => uid,
        Err(e) => {
            warn!(email = %request.email, "User without a valid _id: {}", e);
            return message_response(StatusCode::UNAUTHORIZED, BAD_CREDENTIALS);
        }
    };

    match state.jwt.generate_token(&uid, &request.email) {
        Ok(access_token) => {
            info!(uid = %uid, "Access token issued");
            json_response(StatusCode::OK, &TokenResponse { access_token })
        }
        Err(e) => error_response(&e),
    }
}
