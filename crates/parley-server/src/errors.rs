//! Server error types.

use thiserror::Error;

/// Errors returned by [`RoomHandle`](crate::room::RoomHandle) operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    /// The room's hub loop has stopped.
    #[error("room hub is closed")]
    Closed,
}

/// Result type for room operations.
pub type Result<T> = std::result::Result<T, RoomError>;
