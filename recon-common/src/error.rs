//! Common error types for the reconciliation pipeline

use thiserror::Error;

/// Common result type for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every pipeline component
#[derive(Error, Debug)]
pub enum Error {
    /// A required sheet column is missing (fatal for the file, never for the run)
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// The document store could not be reached or rejected a call
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The verification API failed (network, non-2xx, token)
    #[error("External API error: {0}")]
    ExternalApi(String),

    /// The verification API answered with a body we cannot interpret
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Reading or writing a tabular file failed
    #[error("File I/O error: {0}")]
    FileIo(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another run already holds the pipeline
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::ColumnNotFound("cpf".to_string());
        assert_eq!(err.to_string(), "Column not found: cpf");
    }
}
