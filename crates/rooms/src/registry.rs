//! Room registry: owns the set of live rooms and their membership.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::entities::{Room, RoomMember, RoomPhase};
use crate::types::{RoomError, RoomResult};

/// Outcome of a successful admission check.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// A slot was reserved and a member record created.
    Admitted(RoomMember),
    /// The user already holds an active slot; treated as idempotent success.
    AlreadyActive(RoomMember),
}

impl Admission {
    pub fn member(&self) -> &RoomMember {
        match self {
            Admission::Admitted(member) | Admission::AlreadyActive(member) => member,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Admission::Admitted(_))
    }
}

struct RoomSlot {
    room: Room,
    members: HashMap<String, RoomMember>,
    last_activity: DateTime<Utc>,
}

impl RoomSlot {
    fn new(room: Room) -> Self {
        Self {
            room,
            members: HashMap::new(),
            last_activity: Utc::now(),
        }
    }
}

/// Owned registry of live rooms.
///
/// Each room sits behind its own lock so the capacity check-and-increment in
/// [`RoomRegistry::try_admit`] is a single critical section, while unrelated
/// rooms never contend with each other.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Mutex<RoomSlot>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, room_id: &str) -> Option<Arc<Mutex<RoomSlot>>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    /// Create a room with the given identifier and capacity.
    pub async fn create(&self, room_id: &str, capacity: u32) -> RoomResult<Room> {
        if capacity == 0 {
            return Err(RoomError::invalid_capacity(capacity));
        }

        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(room_id) {
            return Err(RoomError::already_exists(room_id));
        }

        let room = Room::new(room_id, capacity);
        rooms.insert(room_id.to_string(), Arc::new(Mutex::new(RoomSlot::new(room.clone()))));
        info!(room_id, capacity, "room created");
        Ok(room)
    }

    /// Fetch a snapshot of a room's current state.
    pub async fn get(&self, room_id: &str) -> RoomResult<Room> {
        let slot = self
            .slot(room_id)
            .await
            .ok_or_else(|| RoomError::not_found(room_id))?;
        let slot = slot.lock().await;
        Ok(slot.room.clone())
    }

    /// Atomically check capacity and reserve a member slot.
    ///
    /// Closing rooms behave like unknown rooms: joins are rejected with
    /// `NotFound` rather than queued.
    pub async fn try_admit(&self, room_id: &str, user_id: &str) -> RoomResult<Admission> {
        let slot = self
            .slot(room_id)
            .await
            .ok_or_else(|| RoomError::not_found(room_id))?;
        let mut slot = slot.lock().await;

        if !slot.room.is_open() {
            return Err(RoomError::not_found(room_id));
        }

        if let Some(existing) = slot.members.get(user_id) {
            if existing.is_active {
                debug!(room_id, user_id, "re-join of active member");
                return Ok(Admission::AlreadyActive(existing.clone()));
            }
        }

        if slot.room.is_full() {
            return Err(RoomError::room_full(room_id));
        }

        let member = RoomMember::new(room_id, user_id);
        slot.members.insert(user_id.to_string(), member.clone());
        slot.room.active_members += 1;
        slot.last_activity = Utc::now();
        debug!(
            room_id,
            user_id,
            active = slot.room.active_members,
            "member admitted"
        );
        Ok(Admission::Admitted(member))
    }

    /// Mark a member inactive and free their slot. Idempotent: releasing an
    /// already-inactive member, or a member of a vanished room, is a no-op.
    pub async fn release(&self, room_id: &str, user_id: &str) {
        let Some(slot) = self.slot(room_id).await else {
            return;
        };
        let mut slot = slot.lock().await;

        if let Some(member) = slot.members.get_mut(user_id) {
            if member.is_active {
                member.is_active = false;
                slot.room.active_members = slot.room.active_members.saturating_sub(1);
                slot.last_activity = Utc::now();
                debug!(
                    room_id,
                    user_id,
                    active = slot.room.active_members,
                    "member released"
                );
            }
        }
    }

    /// Move a room from Open to Closing. New admissions stop immediately;
    /// bound connections are untouched. Idempotent.
    pub async fn close(&self, room_id: &str) -> RoomResult<Room> {
        let slot = self
            .slot(room_id)
            .await
            .ok_or_else(|| RoomError::not_found(room_id))?;
        let mut slot = slot.lock().await;
        if slot.room.phase != RoomPhase::Closing {
            slot.room.phase = RoomPhase::Closing;
            info!(room_id, "room closing");
        }
        Ok(slot.room.clone())
    }

    /// Drop a room's in-memory state entirely.
    pub async fn remove(&self, room_id: &str) {
        if self.rooms.write().await.remove(room_id).is_some() {
            info!(room_id, "room removed from registry");
        }
    }

    /// Record activity for idle tracking.
    pub async fn touch(&self, room_id: &str) {
        if let Some(slot) = self.slot(room_id).await {
            slot.lock().await.last_activity = Utc::now();
        }
    }

    /// Open rooms with no activity inside the window.
    pub async fn idle_rooms(&self, window: Duration) -> Vec<String> {
        let cutoff = Utc::now() - window;
        let rooms = self.rooms.read().await;
        let mut idle = Vec::new();
        for (id, slot) in rooms.iter() {
            let slot = slot.lock().await;
            if slot.room.is_open() && slot.last_activity < cutoff {
                idle.push(id.clone());
            }
        }
        idle
    }

    /// Snapshot of all live rooms.
    pub async fn rooms(&self) -> Vec<Room> {
        let rooms = self.rooms.read().await;
        let mut out = Vec::with_capacity(rooms.len());
        for slot in rooms.values() {
            out.push(slot.lock().await.room.clone());
        }
        out
    }

    /// Snapshot of a room's member records, active and historical.
    pub async fn members(&self, room_id: &str) -> Vec<RoomMember> {
        match self.slot(room_id).await {
            Some(slot) => slot.lock().await.members.values().cloned().collect(),
            None => Vec::new(),
        }
    }
}
