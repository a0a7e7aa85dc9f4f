//! Bearer token guard for protected routes

use bson::{doc, oid::ObjectId};
use hyper::StatusCode;
use tracing::{debug, error};

use super::jwt::{extract_token_from_header, JwtValidator, TokenCheck};
use crate::db::DocumentStore;
use crate::security::USER_MODEL;

/// Why a request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("Missing or Invalid Authorization Header")]
    MissingHeader,
    #[error("Invalid Token")]
    InvalidToken,
    #[error("Access Token Has Expired")]
    Expired,
    #[error("Authentication backend unavailable")]
    Unavailable,
}

impl AuthRejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

/// Resolve the calling user from the `Authorization` header.
///
/// The token must verify and its subject must still be a stored user.
pub async fn authenticate(
    jwt: &JwtValidator,
    store: &dyn DocumentStore,
    auth_header: Option<&str>,
) -> Result<ObjectId, AuthRejection> {
    let token = extract_token_from_header(auth_header).ok_or(AuthRejection::MissingHeader)?;

    let claims = match jwt.verify_token(token) {
        TokenCheck::Valid(claims) => claims,
        TokenCheck::Expired => return Err(AuthRejection::Expired),
        TokenCheck::Invalid => return Err(AuthRejection::InvalidToken),
    };
    let uid = claims.uid().map_err(|_| AuthRejection::InvalidToken)?;

    match store.count(USER_MODEL, doc! { "_id": uid }).await {
        Ok(0) => {
            debug!(uid = %uid, "Token subject no longer exists");
            Err(AuthRejection::InvalidToken)
        }
        Ok(_) => Ok(uid),
        Err(e) => {
            error!("User lookup failed during authentication: {}", e);
            Err(AuthRejection::Unavailable)
        }
    }
}
