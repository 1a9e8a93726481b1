//! Store error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The partition has written too recently; carries the partition key
    #[error("write limit reached for key {0}")]
    WriteLimitReached(String),

    #[error("store write cancelled: {0}")]
    Cancelled(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_limit_display_contains_key() {
        let err = StoreError::WriteLimitReached("cluster-a".to_string());
        assert_eq!(err.to_string(), "write limit reached for key cluster-a");
    }

    #[test]
    fn test_backend_error_display() {
        let err = StoreError::Backend("disk full".to_string());
        assert_eq!(err.to_string(), "store backend error: disk full");
    }
}
