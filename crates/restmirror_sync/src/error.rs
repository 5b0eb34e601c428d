//! Error types for the mirror and the synchronizer.

use restmirror_store::{Method, StoreError};
use std::time::Duration;
use thiserror::Error;

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by a remote REST client.
///
/// Network failures and application errors are kept apart so callers can
/// tell "the server said no" from "the server was never reached".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// No response arrived within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error status.
    #[error("HTTP {status}: {body}")]
    Application {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("cannot decode response: {0}")]
    Decode(String),

    /// The request could not be built (bad header, content type or body).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RemoteError {
    /// Returns true if the same request might succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Network(_) | RemoteError::Timeout(_) => true,
            RemoteError::Application { status, .. } => *status >= 500 || *status == 429,
            RemoteError::Decode(_) | RemoteError::InvalidRequest(_) => false,
        }
    }

    /// Returns the HTTP status of an application error.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors that can occur in the mirror, overlay or synchronizer.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A mutation targeted a record that does not exist locally.
    #[error("no local record for {key}")]
    LocalNotFound {
        /// The record key.
        key: String,
    },

    /// The operation is not defined for the record's current state.
    #[error("cannot {operation} record {key} in state {method}")]
    InvalidTransition {
        /// The record key.
        key: String,
        /// The state the record was in.
        method: Method,
        /// The rejected operation.
        operation: &'static str,
    },

    /// Replaying a dirty record failed. The record keeps its state.
    #[error("replay of {key} failed: {source}")]
    Remote {
        /// The record key.
        key: String,
        /// The remote failure.
        #[source]
        source: RemoteError,
    },

    /// A read-through fetch failed and nothing was cached locally.
    #[error("remote read of {url} failed: {source}")]
    RemoteRead {
        /// The requested URL.
        url: String,
        /// The remote failure.
        #[source]
        source: RemoteError,
    },

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns the remote failure behind this error, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            SyncError::Remote { source, .. } | SyncError::RemoteRead { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(RemoteError::Network("reset".into()).is_retryable());
        assert!(RemoteError::Timeout(Duration::from_secs(10)).is_retryable());
        assert!(RemoteError::Application {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!RemoteError::Application {
            status: 400,
            body: "bad".into()
        }
        .is_retryable());
        assert!(!RemoteError::Decode("eof".into()).is_retryable());
        assert!(!RemoteError::InvalidRequest("bad mime".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::InvalidTransition {
            key: "t____/items/1/".into(),
            method: Method::Get,
            operation: "create_new",
        };
        assert_eq!(
            err.to_string(),
            "cannot create_new record t____/items/1/ in state GET"
        );

        let err = SyncError::Remote {
            key: "k".into(),
            source: RemoteError::Application {
                status: 409,
                body: "conflict".into(),
            },
        };
        assert!(err.to_string().contains("HTTP 409"));
        assert_eq!(err.remote().and_then(RemoteError::status), Some(409));
    }
}
