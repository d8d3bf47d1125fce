//! Index error types

use crate::gateway::GatewayError;
use thiserror::Error;

/// Errors raised while reading, writing or decoding index entries
#[derive(Error, Debug)]
pub enum IndexError {
    /// A stored bucket name that no [`Bucket`](super::Bucket) maps to
    #[error("Unknown bucket: {0}")]
    UnknownBucket(String),

    /// Row access or statement failure in the store
    #[error("Store error: {0}")]
    Store(#[from] GatewayError),

    /// An entry that breaks the index invariants
    #[error("Invalid index entry: {0}")]
    InvalidEntry(String),

    /// Page sizes must be positive
    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    /// Loading index entries failed; `context` names the slice being processed
    #[error("{context}")]
    QueryFailure {
        context: String,
        #[source]
        source: Box<IndexError>,
    },
}

impl IndexError {
    pub fn query_failure(context: impl Into<String>, source: IndexError) -> Self {
        IndexError::QueryFailure {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_query_failure_keeps_cause() {
        let err = IndexError::query_failure(
            "Failed to load index entries for current time slice 2024-05-01 10:00:00 UTC",
            IndexError::Store(GatewayError::Unavailable("down".to_string())),
        );

        assert!(err.to_string().contains("current time slice"));
        let cause = err.source().unwrap();
        assert_eq!(cause.to_string(), "Store error: Store unavailable: down");
    }

    #[test]
    fn test_error_display() {
        let err = IndexError::UnknownBucket("five_minute".to_string());
        assert_eq!(err.to_string(), "Unknown bucket: five_minute");
    }
}
