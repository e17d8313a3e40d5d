//! Core error types.

use thiserror::Error;

/// Errors raised while constructing core values from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The room code was empty after trimming.
    #[error("room code is required")]
    EmptyRoomCode,
    /// The room code exceeded the maximum length.
    #[error("room code is {len} characters, maximum is {max}")]
    RoomCodeTooLong {
        /// Length of the rejected code.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },
    /// The room code contained a character outside `[A-Z0-9_-]`.
    #[error("invalid character {0:?} in room code")]
    InvalidRoomCodeChar(char),
    /// The display name was empty after trimming.
    #[error("display name is required")]
    EmptyDisplayName,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
