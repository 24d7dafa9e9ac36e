//! Error types for the room core.

use thiserror::Error;

/// Result type alias for room operations
pub type RoomResult<T> = Result<T, RoomError>;

/// Main error type for the room core
#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room already exists: {id}")]
    AlreadyExists { id: String },

    #[error("Room not found: {id}")]
    NotFound { id: String },

    #[error("Invalid room capacity: {capacity}")]
    InvalidCapacity { capacity: u32 },

    #[error("Room is full: {id}")]
    RoomFull { id: String },

    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Response generation error: {message}")]
    Generation { message: String },
}

impl RoomError {
    /// Create an already-exists error
    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    /// Create a not-found error for rooms
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid-capacity error
    pub fn invalid_capacity(capacity: u32) -> Self {
        Self::InvalidCapacity { capacity }
    }

    /// Create a room-full rejection
    pub fn room_full(id: impl Into<String>) -> Self {
        Self::RoomFull { id: id.into() }
    }

    /// Create a not-found error for connections
    pub fn connection_not_found(id: impl Into<String>) -> Self {
        Self::ConnectionNotFound { id: id.into() }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create a response generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            message: message.into(),
        }
    }

    /// Whether the caller can recover by retrying or picking another room.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RoomError::InvalidCapacity { .. })
    }
}
