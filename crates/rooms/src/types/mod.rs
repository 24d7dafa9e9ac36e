//! Shared types for the room core.

mod errors;
mod events;

pub use errors::{RoomError, RoomResult};
pub use events::RoomEvent;
