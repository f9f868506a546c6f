use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

use crate::error::AppError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

pub fn check_password_policy(plain: &str) -> Result<(), AppError> {
    let len = plain.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::validation("Password too long"));
    }
    if plain.trim().is_empty() {
        return Err(AppError::validation("Password must not be blank"));
    }
    Ok(())
}

pub fn hash_password(plain: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            AppError::Internal(anyhow::anyhow!("password hashing failed: {e}"))
        })
}

/// `Ok(false)` for a wrong password; `Err` only when the stored hash is unreadable.
pub fn verify_password(plain: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        AppError::Internal(anyhow::anyhow!("stored password hash is malformed: {e}"))
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
