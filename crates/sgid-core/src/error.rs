//! Error types for record identifier allocation.
//!
//! Every failure the allocator can report to its caller is a typed variant
//! here; storage errors from SQLite are wrapped rather than flattened so the
//! caller can still tell a busy database from a constraint violation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the sgid library.
#[derive(Debug, Error)]
pub enum SgidError {
    // Allocation errors
    #[error("Record already has an identifier: {record_key}")]
    DuplicateAllocation { record_key: String },

    #[error("Sequence {sequence} is already taken in category {first:02}.{second:02}")]
    SequenceConflict {
        first: u32,
        second: u32,
        sequence: u64,
    },

    #[error("No identifier allocated for record: {record_key}")]
    NotFound { record_key: String },

    #[error("Record {record_key} has {rows} identifier rows, expected exactly one")]
    Integrity { record_key: String, rows: usize },

    // Formatting and parsing errors
    #[error("{field} value {value} does not fit in {width} digits")]
    FormatOverflow {
        field: &'static str,
        value: u64,
        width: usize,
    },

    #[error("Invalid category '{value}': {reason}")]
    InvalidCategory { value: String, reason: String },

    #[error("Invalid record identifier '{value}': {reason}")]
    InvalidIdentifier { value: String, reason: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for sgid operations.
pub type Result<T> = std::result::Result<T, SgidError>;

impl From<std::io::Error> for SgidError {
    fn from(err: std::io::Error) -> Self {
        SgidError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for SgidError {
    fn from(err: rusqlite::Error) -> Self {
        SgidError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SgidError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SgidError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a named input field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SgidError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check if this error is a transient lock contention on the database.
    ///
    /// Constraint violations are never retryable: they always surface as
    /// `DuplicateAllocation` or `SequenceConflict`.
    pub fn is_retryable(&self) -> bool {
        match self {
            SgidError::Database {
                source: Some(rusqlite::Error::SqliteFailure(err, _)),
                ..
            } => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }

    /// Convert to a process exit code for the CLI.
    ///
    /// - 2: bad input (validation, category, identifier, overflow)
    /// - 3: no identifier allocated
    /// - 4: uniqueness or integrity violation
    /// - 1: everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            SgidError::Validation { .. }
            | SgidError::InvalidCategory { .. }
            | SgidError::InvalidIdentifier { .. }
            | SgidError::FormatOverflow { .. } => 2,

            SgidError::NotFound { .. } => 3,

            SgidError::DuplicateAllocation { .. }
            | SgidError::SequenceConflict { .. }
            | SgidError::Integrity { .. } => 4,

            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SgidError::SequenceConflict {
            first: 1,
            second: 2,
            sequence: 7,
        };
        assert_eq!(err.to_string(), "Sequence 7 is already taken in category 01.02");

        let err = SgidError::FormatOverflow {
            field: "sequence",
            value: 1_000_000_000_000_000,
            width: 15,
        };
        assert_eq!(
            err.to_string(),
            "sequence value 1000000000000000 does not fit in 15 digits"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            SgidError::NotFound {
                record_key: "abc".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            SgidError::DuplicateAllocation {
                record_key: "abc".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(SgidError::validation("record_key", "empty").exit_code(), 2);
        assert_eq!(
            SgidError::Config {
                message: "x".into()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_retryable_errors() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(SgidError::from(busy).is_retryable());

        let constraint = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        assert!(!SgidError::from(constraint).is_retryable());
        assert!(!SgidError::NotFound {
            record_key: "abc".into()
        }
        .is_retryable());
    }
}
