//! # Error Handling
//!
//! Error types for stdfdb operations.
//!
//! ## Recoverability
//!
//! Errors fall into two groups:
//!
//! 1. **Per-record**: a truncated record is skipped during a scan and decodes
//!    to a missing marker during a query. The surrounding operation continues.
//! 2. **Per-file**: format and structure errors abort indexing of the whole
//!    file with a single summary error.

use thiserror::Error;

/// Result type alias for stdfdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for stdfdb
#[derive(Error, Debug)]
pub enum Error {
    // Format errors
    #[error("Format error: {message}")]
    Format { message: String },

    #[error("Truncated record at byte {at}: needed {needed} bytes, {remaining} remaining")]
    TruncatedRecord { at: u64, needed: usize, remaining: usize },

    #[error("STDF structure error: {message}")]
    Structure { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    // Index errors
    #[error("Index error: {message}")]
    Index { message: String, source: Option<Box<dyn std::error::Error + Send + Sync>> },

    // Scan errors
    #[error("Scan cancelled")]
    Cancelled,

    #[error("Scan worker failed: {message}")]
    Worker { message: String },

    // Query errors
    #[error("Query error: {message}")]
    Query { message: String },

    // System errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::TruncatedRecord { .. } => true,
            Error::Decode { .. } => true,
            Error::Query { .. } => true,
            Error::Cancelled => true,
            Error::Format { .. } => false,
            Error::Structure { .. } => false,
            Error::Index { .. } => false,
            Error::Io { .. } => false,
            _ => false,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Format { .. } => "FORMAT_ERROR",
            Error::TruncatedRecord { .. } => "TRUNCATED_RECORD",
            Error::Structure { .. } => "STRUCTURE_ERROR",
            Error::Decode { .. } => "DECODE_ERROR",
            Error::Index { .. } => "INDEX_ERROR",
            Error::Cancelled => "CANCELLED",
            Error::Worker { .. } => "WORKER_ERROR",
            Error::Query { .. } => "QUERY_ERROR",
            Error::Io { .. } => "IO_ERROR",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Error::Format { message: message.into() }
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Error::Structure { message: message.into() }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Error::Index { message: message.into(), source: None }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Extension trait for adding context to results
pub trait ResultExt<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e {
            // Keep the variant so callers can still match on cancellation.
            Error::Cancelled => Error::Cancelled,
            Error::Io { message, source } => Error::Io {
                message: format!("{}: {}", f(), message),
                source,
            },
            other => Error::Internal {
                message: format!("{}: {}", f(), other),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_record_is_recoverable() {
        let err = Error::TruncatedRecord { at: 10, needed: 4, remaining: 1 };
        assert!(err.is_recoverable());
        assert_eq!(err.error_code(), "TRUNCATED_RECORD");
        assert!(!Error::format("not a FAR").is_recoverable());
    }

    #[test]
    fn test_with_context_preserves_io_and_cancel() {
        let io: Result<()> = Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into());
        let err = io.with_context(|| "opening lot.stdf".to_string()).unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
        assert!(err.to_string().contains("opening lot.stdf"));

        let cancelled: Result<()> = Err(Error::Cancelled);
        let err = cancelled.with_context(|| "scan".to_string()).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
