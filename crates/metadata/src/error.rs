//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No row exists after insert-then-reselect. The enclosing transaction is
    /// rolled back.
    #[error("identity resolution failed: {0}")]
    Resolution(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_message() {
        let err = MetadataError::Resolution("repository 'app' missing after insert".to_string());
        assert_eq!(
            err.to_string(),
            "identity resolution failed: repository 'app' missing after insert"
        );
    }

    #[test]
    fn test_sqlx_errors_convert() {
        let err = MetadataError::from(sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("database error"));
    }
}
