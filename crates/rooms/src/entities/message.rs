//! Message entity definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Originator of a message: a named user or the automated assistant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User(String),
    Assistant,
}

impl Sender {
    pub fn is_assistant(&self) -> bool {
        matches!(self, Sender::Assistant)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Sender::User(name) => name,
            Sender::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message recorded in a room's history.
///
/// `seq` is strictly increasing per room and never reused, even after the
/// message ages out of the in-memory buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub room_id: String,
    pub sender: Sender,
    pub content: String,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
}

impl RoomMessage {
    pub fn new(
        room_id: impl Into<String>,
        sender: Sender,
        content: impl Into<String>,
        seq: u64,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            sender,
            content: content.into(),
            seq,
            created_at: Utc::now(),
        }
    }
}
