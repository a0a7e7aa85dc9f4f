//! Error types for Olaf
//!
//! Every fallible operation in the crate returns [`Result`]. The variant
//! decides the HTTP status and the `data.kind` reported over JSON-RPC.

use hyper::StatusCode;

/// Main error type for Olaf operations
#[derive(Debug, thiserror::Error)]
pub enum OlafError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Field '{field}' of model '{model}' is required")]
    RequiredField { model: String, field: String },

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Expected singleton, got {0} records")]
    SingletonExpected(usize),

    #[error("Deletion constraint: {0}")]
    DeletionConstraint(String),

    #[error("Dependency loop between modules: {}", .0.join(", "))]
    DependencyLoop(Vec<String>),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl OlafError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_)
            | Self::Validation(_)
            | Self::RequiredField { .. }
            | Self::InvalidId(_)
            | Self::SingletonExpected(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) | Self::ModelNotFound(_) => StatusCode::NOT_FOUND,
            Self::DeletionConstraint(_) => StatusCode::CONFLICT,
            Self::Database(_)
            | Self::DependencyLoop(_)
            | Self::Internal(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::AccessDenied(_) => "access_denied",
            Self::NotFound(_) => "not_found",
            Self::ModelNotFound(_) => "model_not_found",
            Self::Validation(_) => "validation",
            Self::RequiredField { .. } => "required_field",
            Self::InvalidId(_) => "invalid_id",
            Self::SingletonExpected(_) => "singleton_expected",
            Self::DeletionConstraint(_) => "deletion_constraint",
            Self::DependencyLoop(_) => "dependency_loop",
            Self::Database(_) => "database",
            Self::Internal(_) => "internal",
            Self::Config(_) => "config",
        }
    }

    /// True when the caller, not the server, is at fault
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl From<std::io::Error> for OlafError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for OlafError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for OlafError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(format!("YAML error: {}", err))
    }
}

impl From<hyper::Error> for OlafError {
    fn from(err: hyper::Error) -> Self {
        Self::Internal(format!("HTTP error: {}", err))
    }
}

impl From<mongodb::error::Error> for OlafError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::oid::Error> for OlafError {
    fn from(err: bson::oid::Error) -> Self {
        Self::InvalidId(err.to_string())
    }
}

impl From<bson::ser::Error> for OlafError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for OlafError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

impl From<argon2::password_hash::Error> for OlafError {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::Internal(format!("Password hashing error: {}", err))
    }
}

/// Result type alias for Olaf operations
pub type Result<T> = std::result::Result<T, OlafError>;
