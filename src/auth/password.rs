//! Admin panel passwords. App users sign in with OTP codes and never have one.

use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

use crate::error::{AppError, AppResult};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Enforces the admin password length policy and returns the argon2 PHC
/// string to persist.
pub fn validate_and_hash(plain: &str) -> AppResult<String> {
    let len = plain.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at most {MAX_PASSWORD_LEN} characters"
        )));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!(error = %e, "argon2 hashing failed");
            AppError::Internal(anyhow::anyhow!("hash admin password: {e}"))
        })
}

/// `Ok(false)` for a wrong password; a stored hash that cannot be parsed is
/// an internal error, not a failed login.
pub fn verify(plain: &str, stored_hash: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        error!(error = %e, "stored admin password hash is malformed");
        AppError::Internal(anyhow::anyhow!("parse admin password hash: {e}"))
    })?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(anyhow::anyhow!("verify admin password: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_is_checked_before_hashing() {
        for bad in ["", "short", "1234567"] {
            assert!(matches!(validate_and_hash(bad), Err(AppError::Validation(_))));
        }
        let too_long = "x".repeat(MAX_PASSWORD_LEN + 1);
        assert!(matches!(validate_and_hash(&too_long), Err(AppError::Validation(_))));
    }

    #[test]
    fn stored_hash_accepts_only_the_original() {
        let hash = validate_and_hash("panel-Passw0rd").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify("panel-Passw0rd", &hash).unwrap());
        assert!(!verify("panel-passw0rd", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_internal() {
        let err = verify("anything", "plaintext-in-db").unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
