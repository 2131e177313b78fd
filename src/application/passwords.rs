//! Argon2id password hashing, run off the async executor.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use thiserror::Error;
use tokio::task;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("password hashing task failed: {0}")]
    Task(#[from] task::JoinError),
}

/// PHC-formatted argon2id hash with a fresh random salt.
pub async fn hash_password(password: String) -> Result<String, PasswordError> {
    task::spawn_blocking(move || {
        let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
            .map_err(|err| PasswordError::Hash(err.to_string()))?;
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| PasswordError::Hash(err.to_string()))
    })
    .await?
}

/// `false` for a wrong password; an unparseable stored hash is an error.
pub async fn verify_password(password: String, stored: String) -> Result<bool, PasswordError> {
    task::spawn_blocking(move || {
        let parsed =
            PasswordHash::new(&stored).map_err(|err| PasswordError::Hash(err.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await?
}
