//! Password hashing (Argon2id, PHC strings) and strength rules.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::RngCore;
use validator::ValidationError;

use crate::{EcommerceError, Result};

const SPECIAL: &str = "!@#$%^&*(),.?\":{}|<>";

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt).map_err(|e| EcommerceError::StorageError(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| EcommerceError::StorageError(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

/// At least 8 characters with an upper-case letter, a lower-case letter, a
/// digit and a special character.
pub fn validate_password_strength(password: &str) -> std::result::Result<(), ValidationError> {
    let checks = [
        (password.chars().count() >= 8, "password_too_short"),
        (password.chars().any(|c| c.is_ascii_uppercase()), "password_needs_uppercase"),
        (password.chars().any(|c| c.is_ascii_lowercase()), "password_needs_lowercase"),
        (password.chars().any(|c| c.is_ascii_digit()), "password_needs_digit"),
        (password.chars().any(|c| SPECIAL.contains(c)), "password_needs_special"),
    ];
    match checks.iter().find(|(ok, _)| !ok) {
        Some((_, code)) => Err(ValidationError::new(*code)),
        None => Ok(()),
    }
}

/// 3 to 30 characters of letters, digits, `_` and `-`.
pub fn validate_username(username: &str) -> std::result::Result<(), ValidationError> {
    let len = username.chars().count();
    if !(3..=30).contains(&len) || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(ValidationError::new("invalid_username"));
    }
    if username.contains("--") { return Err(ValidationError::new("invalid_username")); }
    Ok(())
}
