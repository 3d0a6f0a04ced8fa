//! Error types for the Cadence scheduling pipeline.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while scheduling, persisting, or publishing posts.
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed pre-flight validation (caption length, image count,
    /// missing credential). Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The publisher API returned 429. Carries the server's Retry-After
    /// hint when one was supplied.
    #[error("rate limited by publisher API")]
    RateLimited {
        /// Server-supplied delay hint, if any.
        retry_after: Option<Duration>,
    },

    /// Non-2xx response from the publisher API.
    /// 5xx is retried; other statuses abort the retry loop.
    #[error("publisher API error (status {status}): {message}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Error body or reason phrase, credential-redacted.
        message: String,
    },

    /// Transport-level failure or timeout talking to the publisher API.
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx response that is missing expected fields. Retrying will not
    /// fix a schema mismatch, so this is terminal.
    #[error("malformed publisher API response: {0}")]
    MalformedResponse(String),

    /// Store constraint violation (duplicate content hash, lost
    /// conditional status update). Callers treat this as an expected
    /// idempotent skip, not a failure.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An illegal status transition was requested.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status of the post.
        from: crate::PostStatus,
        /// Requested target status.
        to: crate::PostStatus,
    },

    /// SQLite error.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True when the error is an expected idempotent no-op rather than a
    /// real failure (duplicate hash on re-run, lost transition race).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
