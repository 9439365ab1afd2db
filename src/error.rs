//! Error types for chartmill.
//!
//! A small closed set of tagged variants so callers can branch on kind
//! without string matching. Item-scoped failures (transport, validation,
//! single-item writes) are recovered inside the worker pool; job-scoped
//! failures (config, backlog read, sweep commit) surface from the entry
//! points.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid settings. Deterministic; never retried.
    #[error("config error: {0}")]
    Config(String),

    /// Backlog read or result write failed. Aborts the whole job for a
    /// backlog read, only the current item for a write.
    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),

    /// Network failure, timeout, or non-success status from the
    /// enrichment service. Retried up to the configured ceiling.
    #[error("transport error: {message}")]
    Transport {
        /// HTTP status, when the service answered at all.
        status: Option<u16>,
        message: String,
    },

    /// The enrichment service answered, but the response shape or content
    /// did not match expectations. Deterministic; never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// A sweep transaction could not commit. All partial writes from the
    /// run are rolled back.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The run's cancellation token fired while an operation was waiting.
    /// Operator-initiated; never retried.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Whether the enrichment client may retry after this error.
    /// Only transport failures are transient; everything else would fail
    /// the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
