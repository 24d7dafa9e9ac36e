//! Trait seams for the external collaborators the core consumes.
//!
//! Authentication, the AI model, and the storage engine live behind these
//! interfaces; the core only ever sees the contracts below.

use async_trait::async_trait;

use crate::entities::{Room, RoomMessage};

/// Produces an automated response for a room given recent context.
///
/// Calls may take non-trivial time; the core snapshots context first and
/// never holds a room lock across `generate`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, room_id: &str, context: &[RoomMessage]) -> anyhow::Result<String>;
}

/// Durable persistence for rooms and messages.
///
/// Best-effort from the core's point of view: failures are logged and
/// retried with bounded backoff, and the in-memory path proceeds regardless.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn persist_message(&self, message: &RoomMessage) -> anyhow::Result<()>;

    async fn load_recent(&self, room_id: &str, limit: usize) -> anyhow::Result<Vec<RoomMessage>>;

    async fn persist_room(&self, room: &Room) -> anyhow::Result<()>;

    async fn mark_room_inactive(&self, room_id: &str) -> anyhow::Result<()>;
}

/// Store that drops everything. Useful for wiring and tests where no
/// persistence collaborator is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl DurableStore for NullStore {
    async fn persist_message(&self, _message: &RoomMessage) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load_recent(&self, _room_id: &str, _limit: usize) -> anyhow::Result<Vec<RoomMessage>> {
        Ok(Vec::new())
    }

    async fn persist_room(&self, _room: &Room) -> anyhow::Result<()> {
        Ok(())
    }

    async fn mark_room_inactive(&self, _room_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
