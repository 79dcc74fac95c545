//! Error types for the viewer sync runtime

use thiserror::Error;

/// Result type alias using the runtime Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the viewer sync runtime
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // Storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Storage id not found: {storage_id}")]
    StorageNotFound { storage_id: String },

    // Validation errors
    #[error("Storage validation failed: {message}")]
    Validation { message: String },

    // Viewer process errors
    #[error("Viewer process error: {message}")]
    Process { message: String },

    // HTTP errors (readiness probe, REST backends)
    #[error("HTTP error: {message}")]
    Http { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Returns true if this error is retryable on the next poll cycle
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage { .. } | Error::Http { .. } | Error::Io(_)
        )
    }

    /// Returns true if this error indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig { .. } | Error::Validation { .. } | Error::Process { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let err = Error::Storage {
            message: "listing failed".to_string(),
        };
        assert!(err.is_retryable());

        let err = Error::Validation {
            message: "token mismatch".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_fatal() {
        let err = Error::InvalidConfig {
            message: "missing required field".to_string(),
        };
        assert!(err.is_fatal());

        let err = Error::Http {
            message: "connection refused".to_string(),
        };
        assert!(!err.is_fatal());
    }
}
