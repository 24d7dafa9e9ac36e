//! Member entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A (room, user) association representing participation.
///
/// Members are deactivated on release rather than deleted, so historical
/// membership stays visible to the durable store for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMember {
    pub room_id: String,
    pub user_id: String,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

impl RoomMember {
    pub fn new(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            user_id: user_id.into(),
            is_active: true,
            joined_at: Utc::now(),
        }
    }
}
