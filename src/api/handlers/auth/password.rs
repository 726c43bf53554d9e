//! Password hashing and verification using Argon2id.
//!
//! Hashing is CPU-heavy, so handlers call the `_blocking` wrappers which move
//! the work onto the blocking pool and keep the request workers free.

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use std::sync::OnceLock;

pub(crate) const MIN_PASSWORD_LENGTH: usize = 8;

// Verified once against a throwaway hash when the email lookup misses, so
// response timing does not distinguish unknown emails from wrong passwords.
static DUMMY_HASH: OnceLock<String> = OnceLock::new();

/// Hash a plaintext password into a PHC-format Argon2id string.
pub(crate) fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("password hashing failed: {e}"))
}

/// Verify a plaintext password against a stored PHC-format hash.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch, or an error if the
/// stored hash is malformed.
pub(crate) fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| anyhow!("invalid hash format: {e}"))?;

    let argon2 = Argon2::default();
    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("verify error: {e}")),
    }
}

/// Burn a verification's worth of work without revealing anything.
pub(crate) fn dummy_verify(password: &str) {
    let dummy = DUMMY_HASH
        .get_or_init(|| hash_password("horizon.dummy.password").unwrap_or_default());
    if !dummy.is_empty() {
        let _ = verify_password(password, dummy);
    }
}

/// `hash_password` on the blocking pool.
pub(crate) async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("password hashing task failed")?
}

/// `verify_password` on the blocking pool.
pub(crate) async fn verify_password_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("password verification task failed")?
}

/// `dummy_verify` on the blocking pool.
pub(crate) async fn dummy_verify_blocking(password: String) {
    let _ = tokio::task::spawn_blocking(move || dummy_verify(&password)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correct_password_matches() {
        let hash = hash_password("hunter22x").unwrap();
        assert!(verify_password("hunter22x", &hash).unwrap());
    }

    #[test]
    fn wrong_password_does_not_match() {
        let hash = hash_password("hunter22x").unwrap();
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("hunter22x").unwrap();
        let second = hash_password("hunter22x").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_returns_error() {
        assert!(verify_password("pw", "not-a-hash").is_err());
    }

    #[test]
    fn dummy_verify_does_not_panic() {
        dummy_verify("anything");
        dummy_verify("");
    }
}
