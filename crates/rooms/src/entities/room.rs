//! Room entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Admission state of a room.
///
/// A room is created `Open` and moves to `Closing` when teardown starts;
/// `Closing` rooms admit no new members. Fully closed rooms are removed
/// from the registry rather than kept around in a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomPhase {
    Open,
    Closing,
}

impl RoomPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomPhase::Open => "open",
            RoomPhase::Closing => "closing",
        }
    }
}

/// A named, capacity-bounded broadcast group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub capacity: u32,
    pub active_members: u32,
    pub phase: RoomPhase,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: impl Into<String>, capacity: u32) -> Self {
        Self {
            id: id.into(),
            capacity,
            active_members: 0,
            phase: RoomPhase::Open,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.phase == RoomPhase::Open
    }

    pub fn is_full(&self) -> bool {
        self.active_members >= self.capacity
    }
}
