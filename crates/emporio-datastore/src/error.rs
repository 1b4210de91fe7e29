//! Datastore error types.

use emporio_core::AppError;
use thiserror::Error;

/// Result type for datastore operations.
pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Errors raised by the pool, sessions and backends.
#[derive(Debug, Error)]
pub enum DatastoreError {
    /// Every connection stayed checked out for the whole acquire deadline.
    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted {
        /// How long the caller waited.
        waited_ms: u64,
    },

    /// The pool has been disposed.
    #[error("connection pool is closed")]
    PoolClosed,

    /// No pool was installed at startup.
    #[error("no database connection pool is configured")]
    NotInitialized,

    /// The database could not be reached or the connection broke.
    #[error("database connection failed: {0}")]
    Connection(String),

    /// A statement failed.
    #[error("query failed: {0}")]
    Query(String),

    /// COMMIT failed; the transaction's writes are not durable.
    #[error("commit failed: {0}")]
    Commit(String),

    /// ROLLBACK failed.
    #[error("rollback failed: {0}")]
    Rollback(String),

    /// The session was already committed, rolled back or released.
    #[error("session is no longer active")]
    SessionFinished,

    /// Invalid DSN or pool options.
    #[error("invalid datastore configuration: {0}")]
    Configuration(String),
}

impl DatastoreError {
    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::Connection(_))
    }
}

/// Seconds advertised in `Retry-After` when the pool is exhausted.
pub const POOL_EXHAUSTED_RETRY_AFTER_SECS: u64 = 1;

impl From<DatastoreError> for AppError {
    fn from(err: DatastoreError) -> Self {
        match err {
            DatastoreError::PoolExhausted { .. } => AppError::unavailable(
                "The service is busy, please retry shortly",
                Some(POOL_EXHAUSTED_RETRY_AFTER_SECS),
            ),
            DatastoreError::NotInitialized | DatastoreError::Configuration(_) => {
                AppError::configuration(err.to_string())
            }
            other => AppError::data_with_source("datastore operation failed", other),
        }
    }
}
