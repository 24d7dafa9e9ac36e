//! Connection manager: live transport bindings and per-room fan-out sets.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::registry::RoomRegistry;
use crate::types::RoomEvent;

/// Snapshot of one live connection bound to a room.
///
/// The sink is the bounded delivery queue owned by the transport side;
/// connections are ephemeral and never persisted.
#[derive(Debug, Clone)]
pub struct BoundConnection {
    pub id: Uuid,
    pub room_id: String,
    pub user_id: String,
    pub sink: mpsc::Sender<RoomEvent>,
    pub attached_at: DateTime<Utc>,
}

#[derive(Default)]
struct ConnState {
    by_connection: HashMap<Uuid, BoundConnection>,
    by_room: HashMap<String, HashSet<Uuid>>,
}

/// Owns every live connection and binds each to exactly one room.
///
/// Both indexes mutate under a single lock, so a concurrent broadcast either
/// sees a connection fully bound or not at all; there is no half-removed
/// state, and a connection can never appear under two rooms.
pub struct ConnectionManager {
    registry: Arc<RoomRegistry>,
    state: RwLock<ConnState>,
}

impl ConnectionManager {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(ConnState::default()),
        }
    }

    /// Bind a connection to a room. The caller must have passed admission
    /// through [`RoomRegistry::try_admit`] first.
    pub async fn attach(
        &self,
        room_id: &str,
        user_id: &str,
        sink: mpsc::Sender<RoomEvent>,
    ) -> Uuid {
        let connection = BoundConnection {
            id: Uuid::new_v4(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            sink,
            attached_at: Utc::now(),
        };
        let id = connection.id;

        let mut state = self.state.write().await;
        state
            .by_room
            .entry(room_id.to_string())
            .or_default()
            .insert(id);
        state.by_connection.insert(id, connection);
        debug!(%id, room_id, user_id, "connection attached");
        id
    }

    /// Unbind a connection and release its membership slot once the user's
    /// last connection in the room is gone. Idempotent and safe to race with
    /// in-flight broadcasts and other detach calls.
    pub async fn detach(&self, connection_id: Uuid) -> Option<(String, String)> {
        let (connection, release_member) = {
            let mut state = self.state.write().await;
            let connection = state.by_connection.remove(&connection_id)?;

            if let Some(set) = state.by_room.get_mut(&connection.room_id) {
                set.remove(&connection_id);
                if set.is_empty() {
                    state.by_room.remove(&connection.room_id);
                }
            }

            let still_bound = state.by_connection.values().any(|other| {
                other.room_id == connection.room_id && other.user_id == connection.user_id
            });
            (connection, !still_bound)
        };

        if release_member {
            self.registry
                .release(&connection.room_id, &connection.user_id)
                .await;
        }
        debug!(id = %connection_id, room_id = %connection.room_id, "connection detached");
        Some((connection.room_id, connection.user_id))
    }

    /// Snapshot of the connections currently bound to a room.
    pub async fn members_of(&self, room_id: &str) -> Vec<BoundConnection> {
        let state = self.state.read().await;
        let Some(ids) = state.by_room.get(room_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| state.by_connection.get(id).cloned())
            .collect()
    }

    /// Number of connections bound to a room.
    pub async fn connection_count(&self, room_id: &str) -> usize {
        self.state
            .read()
            .await
            .by_room
            .get(room_id)
            .map_or(0, HashSet::len)
    }

    /// Force-detach every connection bound to a room. Used when a closing
    /// room's grace period expires.
    pub async fn drain_room(&self, room_id: &str) -> Vec<Uuid> {
        let ids: Vec<Uuid> = {
            let state = self.state.read().await;
            state
                .by_room
                .get(room_id)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default()
        };

        for id in &ids {
            self.detach(*id).await;
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup() -> (Arc<RoomRegistry>, ConnectionManager) {
        let registry = Arc::new(RoomRegistry::new());
        registry.create("r1", 4).await.unwrap();
        let manager = ConnectionManager::new(Arc::clone(&registry));
        (registry, manager)
    }

    fn sink() -> (mpsc::Sender<RoomEvent>, mpsc::Receiver<RoomEvent>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn attach_and_detach_round_trip_releases_membership() {
        let (registry, manager) = setup().await;
        registry.try_admit("r1", "u1").await.unwrap();

        let (tx, _rx) = sink();
        let id = manager.attach("r1", "u1", tx).await;
        assert_eq!(manager.connection_count("r1").await, 1);

        let unbound = manager.detach(id).await;
        assert_eq!(unbound, Some(("r1".to_string(), "u1".to_string())));
        assert_eq!(manager.connection_count("r1").await, 0);
        assert_eq!(registry.get("r1").await.unwrap().active_members, 0);
    }

    #[tokio::test]
    async fn detach_is_idempotent() {
        let (_registry, manager) = setup().await;
        let (tx, _rx) = sink();
        let id = manager.attach("r1", "u1", tx).await;

        assert!(manager.detach(id).await.is_some());
        assert!(manager.detach(id).await.is_none());
        assert!(manager.detach(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn membership_survives_while_user_has_other_connections() {
        let (registry, manager) = setup().await;
        registry.try_admit("r1", "u1").await.unwrap();

        let (tx_a, _rx_a) = sink();
        let (tx_b, _rx_b) = sink();
        let first = manager.attach("r1", "u1", tx_a).await;
        let _second = manager.attach("r1", "u1", tx_b).await;

        manager.detach(first).await;
        // one connection remains, so the member slot stays reserved
        assert_eq!(registry.get("r1").await.unwrap().active_members, 1);
    }

    #[tokio::test]
    async fn connection_is_never_listed_under_two_rooms() {
        let (registry, manager) = setup().await;
        registry.create("r2", 4).await.unwrap();

        let (tx, _rx) = sink();
        let id = manager.attach("r1", "u1", tx).await;
        let listed_r1 = manager
            .members_of("r1")
            .await
            .iter()
            .any(|conn| conn.id == id);
        let listed_r2 = manager
            .members_of("r2")
            .await
            .iter()
            .any(|conn| conn.id == id);
        assert!(listed_r1);
        assert!(!listed_r2);
    }

    #[tokio::test]
    async fn drain_room_detaches_everything() {
        let (registry, manager) = setup().await;
        registry.try_admit("r1", "u1").await.unwrap();
        registry.try_admit("r1", "u2").await.unwrap();

        let (tx_a, _rx_a) = sink();
        let (tx_b, _rx_b) = sink();
        manager.attach("r1", "u1", tx_a).await;
        manager.attach("r1", "u2", tx_b).await;

        let drained = manager.drain_room("r1").await;
        assert_eq!(drained.len(), 2);
        assert_eq!(manager.connection_count("r1").await, 0);
        assert_eq!(registry.get("r1").await.unwrap().active_members, 0);
    }
}
