//! Error types for chunkdrive.

use thiserror::Error;

/// Common error type for chunkdrive.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Missing or invalid configuration (transport credentials, store settings).
    ///
    /// Fatal: never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A transport call still failed after every retry attempt.
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The atomic file-with-chunks save was rejected by the store.
    ///
    /// Nothing was written. Callers should regenerate identifiers before retrying.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// Validation error for caller input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for DriveError {
    fn from(e: sqlx::Error) -> Self {
        DriveError::Database(e.to_string())
    }
}

impl DriveError {
    /// Whether this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::NotFound(_))
    }
}

/// Result type alias for chunkdrive operations.
pub type Result<T> = std::result::Result<T, DriveError>;
