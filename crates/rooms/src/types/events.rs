//! Event types for real-time room updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::RoomMessage;

/// Transient envelope fanned out to every connection bound to a room.
///
/// Events are derived at broadcast time and never persisted; the underlying
/// [`RoomMessage`] is what the durable store records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoomEvent {
    /// A message was published to the room
    Message {
        room_id: String,
        message: RoomMessage,
        delivered_at: DateTime<Utc>,
    },

    /// A member joined the room
    MemberJoined { room_id: String, user_id: String },

    /// A member left the room
    MemberLeft { room_id: String, user_id: String },

    /// The room is closing; no further events will follow
    RoomClosing { room_id: String },
}

impl RoomEvent {
    pub fn message(message: RoomMessage) -> Self {
        Self::Message {
            room_id: message.room_id.clone(),
            delivered_at: Utc::now(),
            message,
        }
    }

    /// Get the room ID associated with this event
    pub fn room_id(&self) -> &str {
        match self {
            RoomEvent::Message { room_id, .. }
            | RoomEvent::MemberJoined { room_id, .. }
            | RoomEvent::MemberLeft { room_id, .. }
            | RoomEvent::RoomClosing { room_id } => room_id,
        }
    }

    /// Get event type name for logging/metrics
    pub fn event_type_name(&self) -> &'static str {
        match self {
            RoomEvent::Message { .. } => "message",
            RoomEvent::MemberJoined { .. } => "member_joined",
            RoomEvent::MemberLeft { .. } => "member_left",
            RoomEvent::RoomClosing { .. } => "room_closing",
        }
    }
}
