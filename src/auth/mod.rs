//! Authentication for Olaf
//!
//! Users trade email and password for a signed access token at `/token`,
//! then present it as a bearer token on `/jsonrpc`.

pub mod guard;
pub mod jwt;
pub mod password;

pub use guard::{authenticate, AuthRejection};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenCheck};
pub use password::{hash_password, is_password_hash, verify_password};
