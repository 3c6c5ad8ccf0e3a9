//! # Engine Errors
//!
//! One error type for the whole engine. Only [`SyncError::Precondition`] is ever
//! returned to presentation code; every other variant is produced and absorbed
//! on a fetch path, where it is logged and dropped.

use thiserror::Error;

/// Shorthand result used across the crate.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// No cache file, no storage, or a cache file that failed to parse.
    #[error("cache miss for {resource} of conference {conference}")]
    CacheMiss { conference: String, resource: String },

    /// Network error or a non-success HTTP status.
    #[error("remote fetch of {path} failed: {reason}")]
    RemoteFailure { path: String, reason: String },

    /// A day link failed or the fan-in wait expired.
    #[error("aggregate discarded: {processed}/{total} day links processed (timed out: {timed_out})")]
    AggregatePartialFailure {
        processed: usize,
        total: usize,
        timed_out: bool,
    },

    /// A cloud function call did not succeed.
    #[error("cloud function {function} failed: {reason}")]
    RemoteFunctionFailure { function: String, reason: String },

    /// The operation needs state the caller has not established (usually a signed-in user).
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("illegal retrieval transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("the UI context has shut down")]
    UiContextClosed,

    #[error("invalid conference: {0}")]
    InvalidConference(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl SyncError {
    pub fn remote(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::RemoteFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn not_signed_in(operation: &str) -> Self {
        Self::Precondition(format!("{operation} requires an authenticated user"))
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::Precondition(_))
    }
}

#[cfg(test)]
mod tests {
    use super::SyncError;

    #[test]
    fn not_signed_in_is_a_precondition() {
        let err = SyncError::not_signed_in("favorites");
        assert!(err.is_precondition());
        assert!(err.to_string().contains("favorites"));
    }

    #[test]
    fn aggregate_failure_reports_counts() {
        let err = SyncError::AggregatePartialFailure {
            processed: 2,
            total: 3,
            timed_out: true,
        };
        assert_eq!(
            err.to_string(),
            "aggregate discarded: 2/3 day links processed (timed out: true)"
        );
    }
}
