//! The `error` module defines the error taxonomy shared by the authorization
//! engine, the user stores and the transport layer.
//!
//! Every store operation returns a specific [`StoreError`] kind to its caller.
//! Storage and hashing failures are logged where they happen and still
//! returned; callers decide what the client gets to see.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed input: blank required field, trailing-slash pattern, no rights.
    #[error("validation error: {0}")]
    Validation(String),

    /// User or topic pattern absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate username, or duplicate pattern for one user.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    /// Durable read or write failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Password hash computation failed.
    #[error("hashing failure: {0}")]
    Hashing(String),
}

impl StoreError {
    /// Stable snake_case code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "validation",
            StoreError::NotFound(_) => "not_found",
            StoreError::AlreadyExists(_) => "already_exists",
            StoreError::InvalidCredentials => "invalid_credentials",
            StoreError::Storage(_) => "storage",
            StoreError::Hashing(_) => "hashing",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Storage(format!("serialization: {e}"))
    }
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Storage(format!("sled: {e}"))
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        StoreError::Storage(format!("postgres: {e}"))
    }
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Storage(format!("postgres pool: {e}"))
    }
}

impl From<bcrypt::BcryptError> for StoreError {
    fn from(e: bcrypt::BcryptError) -> Self {
        StoreError::Hashing(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
