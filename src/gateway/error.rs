//! Gateway error types
//!
//! Errors raised while talking to the column store. Connectivity and
//! authentication failures get their own variants so callers can tell a
//! cluster problem apart from a bad statement.

use thiserror::Error;

/// Errors that can occur while executing statements against the store
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No node of the cluster could be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The supplied credentials were rejected
    #[error("Authentication failed for user '{0}'")]
    Authentication(String),

    /// The store rejected or failed to run a statement
    #[error("Query error: {0}")]
    Query(String),

    /// A column was read with an accessor that does not match its type
    #[error("Column {index} is not a {expected}")]
    ColumnType { index: usize, expected: &'static str },

    /// A column ordinal outside the row
    #[error("Column {index} out of range (row has {len} columns)")]
    ColumnIndex { index: usize, len: usize },

    /// `next_row` was called on a drained row stream
    #[error("Row stream exhausted")]
    Exhausted,

    /// A row stream was read again after one of its statements failed
    #[error("Row stream aborted by an earlier failure")]
    Aborted,

    /// I/O failure opening the backing files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Query(format!("set column encoding: {err}"))
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GatewayError::Authentication("strata_admin".to_string());
        assert_eq!(err.to_string(), "Authentication failed for user 'strata_admin'");

        let err = GatewayError::ColumnType {
            index: 6,
            expected: "set<int>",
        };
        assert_eq!(err.to_string(), "Column 6 is not a set<int>");
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let err: GatewayError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, GatewayError::Query(_)));
    }
}
