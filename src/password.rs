//! Delete-password digests.
//!
//! Passwords are stored as argon2 PHC strings
//! (`$argon2id$v=19$m=..,t=..,p=..$<salt>$<hash>`), so the salt and cost
//! parameters travel with each stored value.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};

#[derive(Debug, thiserror::Error)]
#[error("failed to hash password: {0}")]
pub struct PasswordError(String);

/// Produce a fresh salted digest for `plain`.
pub fn digest(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| PasswordError(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check `candidate` against a digest produced by [`digest`].
/// Malformed stored values never verify.
pub fn verify(stored: &str, candidate: &str) -> bool {
    let hash = match PasswordHash::new(stored) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::error!("failed to parse stored password hash: {}", err);
            return false;
        }
    };

    Argon2::default()
        .verify_password(candidate.as_bytes(), &hash)
        .is_ok()
}
