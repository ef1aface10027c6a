//! Password hashing
//!
//! Passwords are pre-hashed with SHA-256 so bcrypt's 72-byte input limit
//! never truncates them. Stored form: `bcrypt_sha256$<bcrypt hash>`.

use crate::error::{ApiError, ApiResult};
use sha2::{Digest, Sha256};

const ALGORITHM_PREFIX: &str = "bcrypt_sha256$";

fn prehash(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

pub fn hash_password(password: &str, cost: u32) -> ApiResult<String> {
    let hashed = bcrypt::hash(prehash(password), cost)
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))?;
    Ok(format!("{}{}", ALGORITHM_PREFIX, hashed))
}

/// Check a password against a stored hash; unknown formats never match
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some(hashed) = stored.strip_prefix(ALGORITHM_PREFIX) else {
        return false;
    };
    bcrypt::verify(prehash(password), hashed).unwrap_or(false)
}

/// [`hash_password`] on the blocking pool
pub async fn hash_password_blocking(password: String, cost: u32) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("Password hashing task failed: {}", e)))?
}

/// [`verify_password`] on the blocking pool
pub async fn verify_password_blocking(password: String, stored: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::Internal(format!("Password check task failed: {}", e)))
}
