//! Backplane error types.

use thiserror::Error;

/// Errors raised by history and fan-out backends.
#[derive(Debug, Error)]
pub enum BackplaneError {
    /// Redis command or connection failure.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    /// The backend has been shut down.
    #[error("backplane closed")]
    Closed,
}

/// Result type for backplane operations.
pub type Result<T> = std::result::Result<T, BackplaneError>;
