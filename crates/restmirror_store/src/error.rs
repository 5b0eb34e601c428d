//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A patch targeted a key with no record.
    #[error("record not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// A persisted record carries a sync state this version does not know.
    #[error("record {key} has unknown sync state {method:?}")]
    InvalidState {
        /// The record key.
        key: String,
        /// The unrecognized method tag.
        method: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The store is closed.
    #[error("store is closed: {0}")]
    Closed(String),
}
