//! Error types for the grid cache
//!
//! `Error` is `Clone` so that every caller waiting on one coalesced fetch can
//! receive the same outcome.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a backing store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or the query failed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store did not answer in time
    #[error("store query timed out")]
    Timeout,

    /// The store refused the request (e.g. an update referencing a missing row)
    #[error("store rejected request: {0}")]
    Rejected(String),
}

/// Errors that can occur in the cache and pagination engine
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Bad filter or sort specification (caller bug, never retried)
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Window bounds are inverted
    #[error("Invalid window: start index {start} is after end index {end}")]
    InvalidWindow { start: u64, end: u64 },

    /// Backing store failed; safe to retry at the caller's discretion
    #[error("Store unavailable for block {block_id}: {source}")]
    StoreUnavailable {
        block_id: String,
        #[source]
        source: StoreError,
    },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Shared (L2) tier I/O failure
    #[error("Shared cache error: {0}")]
    SharedCache(String),

    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// Request was cancelled by the caller
    #[error("Request cancelled")]
    Cancelled,

    /// Request deadline elapsed before the store answered
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Internal error (binary-level I/O, server setup)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an adapter failure for the given block.
    pub fn store(block_id: impl Into<String>, source: StoreError) -> Self {
        Error::StoreUnavailable {
            block_id: block_id.into(),
            source,
        }
    }

    /// True for failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable { .. } | Error::DeadlineExceeded | Error::SharedCache(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(e: prometheus::Error) -> Self {
        Error::Metrics(e.to_string())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = Error::store("orders", StoreError::Timeout);
        assert_eq!(
            err.to_string(),
            "Store unavailable for block orders: store query timed out"
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_filter_not_retryable() {
        let err = Error::InvalidFilter("missing value".into());
        assert!(!err.is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn test_json_error_maps_to_serialization() {
        let bad = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: Error = bad.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
