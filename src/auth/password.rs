//! Admin password hashing and verification
//!
//! The operator password is stored as an Argon2id PHC string and verified
//! with a constant-time comparison inside the argon2 crate.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;

use crate::error::AuthError;

/// Hash a password using Argon2id with a random salt
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

/// Verify a password against a stored Argon2id hash
///
/// Returns false for a malformed hash rather than erroring; callers treat
/// both cases as a failed login.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
