//! The `utils` module holds what every other module leans on: the error
//! taxonomy and logging setup.

pub mod error;
pub mod logging;

pub use error::{Result, StoreError};

#[cfg(test)]
mod tests {
    use super::error::StoreError;
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("nonsense");
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(StoreError::Validation("x".into()).kind(), "validation");
        assert_eq!(StoreError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(StoreError::AlreadyExists("x".into()).kind(), "already_exists");
        assert_eq!(StoreError::InvalidCredentials.kind(), "invalid_credentials");
        assert_eq!(StoreError::Storage("x".into()).kind(), "storage");
        assert_eq!(StoreError::Hashing("x".into()).kind(), "hashing");
    }

    #[test]
    fn io_errors_become_storage_failures() {
        let err: StoreError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), "storage");
        assert!(err.to_string().contains("gone"));
    }
}
