//! Error types for the butterfly-osm toolkit
//!
//! Build-phase failures (bad containers, unreadable files, bad inputs) are
//! errors. A query that finds no matching OD pair is not one: it is reported
//! as `None` by the query engine.

use thiserror::Error;

/// Main error type for butterfly-osm operations
#[derive(Debug, Error)]
pub enum Error {
    /// A container or input table is malformed or truncated.
    /// Fatal: the dataset must be regenerated.
    #[error("Format error: {0}")]
    FormatError(String),

    /// Underlying storage could not be read or written. May be retried.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid parameters or data (empty point set, non-finite coordinates, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A long-running build step was cancelled or ran past its deadline
    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Shorthand for a [`Error::FormatError`]
    pub fn format(msg: impl Into<String>) -> Self {
        Error::FormatError(msg.into())
    }

    /// Shorthand for an [`Error::InvalidInput`]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Only storage failures are transient; everything else points at the
    /// dataset or the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::IoError(_))
    }
}

/// Convenience result type for butterfly-osm operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_category() {
        assert_eq!(
            Error::format("bad magic").to_string(),
            "Format error: bad magic"
        );
        assert_eq!(
            Error::invalid("empty point set").to_string(),
            "Invalid input: empty point set"
        );
    }

    #[test]
    fn test_io_error_converts_and_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: Error = io.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(err.is_retryable());
        assert!(!Error::format("truncated").is_retryable());
        assert!(!Error::Cancelled("deadline".into()).is_retryable());
    }
}
