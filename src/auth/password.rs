//! Password hashing and verification using Argon2
//!
//! Stored passwords are PHC strings (`$argon2id$v=19$...`) carrying their
//! own salt and parameters.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2,
};
use rand::rngs::OsRng;

use crate::types::{OlafError, Result};

/// Hash a password using Argon2id with a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| OlafError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| OlafError::Validation(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// True if `value` already is an argon2 PHC string carrying a hash
pub fn is_password_hash(value: &str) -> bool {
    PasswordHash::new(value)
        .map(|parsed| Algorithm::try_from(parsed.algorithm).is_ok() && parsed.hash.is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Apple").unwrap();
        assert!(is_password_hash(&hash));
        assert!(verify_password("Apple", &hash).unwrap());
        assert!(!verify_password("Banana", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_plaintext_is_not_a_hash() {
        assert!(!is_password_hash("Apple"));
        assert!(!is_password_hash("$argon2-but-not-really"));
        assert!(!is_password_hash("$argon2id$v=19$m=19456,t=2,p=1"));
        assert!(!is_password_hash("$pbkdf2-sha256$i=1000$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo"));
        assert!(verify_password("Apple", "Apple").is_err());
    }
}
