//! Access tokens
//!
//! Tokens are HS256 JWTs whose subject is the user's ObjectId in hex.
//! Lifetime comes from `JWT_EXPIRATION_TIME`.

use bson::oid::ObjectId;
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::{OlafError, Result};

/// Payload stored in the token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    /// User id (hex ObjectId)
    pub sub: String,
    /// Email the token was issued for
    pub email: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl Claims {
    /// The user id carried by the token
    pub fn uid(&self) -> Result<ObjectId> {
        ObjectId::parse_str(&self.sub)
            .map_err(|_| OlafError::Unauthorized("Token subject is not a user id".into()))
    }
}

/// Outcome of verifying a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenCheck {
    Valid(Claims),
    Expired,
    Invalid,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("expiry_seconds", &self.expiry_seconds)
            .finish_non_exhaustive()
    }
}

impl JwtValidator {
    /// Create a new validator. The secret must be at least 32 characters.
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self> {
        if secret.len() < 32 {
            return Err(OlafError::Config(
                "SECRET_KEY must be at least 32 characters".into(),
            ));
        }
        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Validator for dev mode, accepting any non-empty secret
    pub fn new_dev(secret: String, expiry_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(OlafError::Config("SECRET_KEY must not be empty".into()));
        }
        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    pub fn expiry_seconds(&self) -> u64 {
        self.expiry_seconds
    }

    /// Issue an access token for a user
    pub fn generate_token(&self, uid: &ObjectId, email: &str) -> Result<String> {
        let now = unix_now()?;
        self.encode_claims(&Claims {
            sub: uid.to_hex(),
            email: email.to_string(),
            iat: now,
            exp: now + self.expiry_seconds,
        })
    }

    fn encode_claims(&self, claims: &Claims) -> Result<String> {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| OlafError::Internal(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a token
    pub fn verify_token(&self, token: &str) -> TokenCheck {
        let mut validation = Validation::default();
        validation.leeway = 0;

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => TokenCheck::Valid(data.claims),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => TokenCheck::Expired,
            Err(_) => TokenCheck::Invalid,
        }
    }
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| OlafError::Internal(format!("System time error: {}", e)))
}

/// Extract the token from an `Authorization: Bearer <token>` header
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
