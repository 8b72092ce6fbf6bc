//! Password hashing.
//!
//! All hashing goes through [`PasswordHasher`]. Stores never hash on their
//! own; an edit path asks [`PasswordHasher::rehash_if_changed`] with the hash
//! currently stored, so an already-hashed value is never hashed again.

use tracing::{error, warn};

use crate::utils::{Result, StoreError};

/// Cost range bcrypt accepts.
pub const MIN_COST: u32 = 4;
pub const MAX_COST: u32 = 31;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hashes a plaintext password on the blocking pool.
    pub async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_owned();
        let cost = self.cost;
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| StoreError::Hashing(e.to_string()))?;

        hashed.map_err(|e| {
            error!(error = %e, "Cannot create password hash");
            StoreError::from(e)
        })
    }

    /// True when `password` verifies against `hash`. A hash that cannot be
    /// parsed never verifies.
    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| StoreError::Hashing(e.to_string()))?;

        match outcome {
            Ok(valid) => Ok(valid),
            Err(e) => {
                warn!(error = %e, "Stored password hash is unusable");
                Ok(false)
            }
        }
    }

    /// Returns a new hash only when `supplied` is a real change.
    ///
    /// An empty `supplied` or one equal to `stored` yields `None`: the stored
    /// hash must be kept as is.
    pub async fn rehash_if_changed(&self, stored: &str, supplied: &str) -> Result<Option<String>> {
        if supplied.is_empty() || supplied == stored {
            return Ok(None);
        }
        self.hash(supplied).await.map(Some)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}
