//! services/clinic/src/auth.rs
//!
//! Password hashing and verification.
//!
//! Passwords set through the application are stored as argon2 PHC strings.
//! Seed accounts and older backups carry cleartext values; those are still
//! accepted by exact comparison until the password is next changed.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

use crate::error::{AppError, AppResult};

const HASH_PREFIX: &str = "$argon2";

pub fn is_hashed(stored: &str) -> bool {
    stored.starts_with(HASH_PREFIX)
}

/// Hashes a new password for storage.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            AppError::Internal("Failed to hash password".to_string())
        })
}

/// Checks `candidate` against a stored hash or legacy cleartext value.
pub fn verify_password(stored: &str, candidate: &str) -> bool {
    if !is_hashed(stored) {
        return stored == candidate;
    }
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!("Failed to parse password hash: {:?}", e);
            false
        }
    }
}

/// Rejects passwords that are obviously unusable.
pub fn validate_new_password(password: &str) -> AppResult<()> {
    if password.trim().len() < 4 {
        return Err(AppError::Validation(
            "Password must have at least 4 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_passwords_verify() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(is_hashed(&hash));
        assert!(verify_password(&hash, "s3cret!"));
        assert!(!verify_password(&hash, "s3cret"));
    }

    #[test]
    fn legacy_cleartext_uses_exact_match() {
        assert!(verify_password("admin", "admin"));
        assert!(!verify_password("admin", "Admin"));
        assert!(!verify_password("admin", ""));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_new_password("abc").is_err());
        assert!(validate_new_password("abcd").is_ok());
    }
}
