//! Broadcast router: sequenced fan-out of events to a room's connections.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::connections::ConnectionManager;
use crate::entities::{RoomMessage, Sender};
use crate::history::HistoryBuffer;
use crate::types::{RoomEvent, RoomResult};

/// Fans published messages out to every connection bound to a room.
///
/// A per-room guard serialises publishes so that message N is never observed
/// by any connection after message N+1. The guard is held only across
/// non-blocking sends; a slow consumer fails fast instead of stalling the
/// room.
pub struct BroadcastRouter {
    connections: Arc<ConnectionManager>,
    history: Arc<HistoryBuffer>,
    guards: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl BroadcastRouter {
    pub fn new(connections: Arc<ConnectionManager>, history: Arc<HistoryBuffer>) -> Self {
        Self {
            connections,
            history,
            guards: RwLock::new(HashMap::new()),
        }
    }

    async fn guard(&self, room_id: &str) -> Arc<Mutex<()>> {
        if let Some(guard) = self.guards.read().await.get(room_id) {
            return Arc::clone(guard);
        }
        let mut guards = self.guards.write().await;
        Arc::clone(
            guards
                .entry(room_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    pub(crate) async fn remove_guard(&self, room_id: &str) {
        self.guards.write().await.remove(room_id);
    }

    /// Sequence a message through the history buffer and deliver the derived
    /// event to the room's current member snapshot.
    ///
    /// Returns the recorded message and the number of connections reached.
    /// Individual delivery failures detach the offending connection and never
    /// abort delivery to the rest.
    pub async fn publish(
        &self,
        room_id: &str,
        sender: Sender,
        content: &str,
    ) -> RoomResult<(RoomMessage, usize)> {
        let guard = self.guard(room_id).await;
        let (message, delivered, failed) = {
            let _serialised = guard.lock().await;

            let message = self.history.append(room_id, sender, content).await;
            let event = RoomEvent::message(message.clone());
            let (delivered, failed) = self.fan_out(room_id, &event).await;
            (message, delivered, failed)
        };

        debug!(
            room_id,
            seq = message.seq,
            delivered,
            failed = failed.len(),
            "message broadcast"
        );
        self.reap(failed).await;
        Ok((message, delivered))
    }

    /// Deliver a lifecycle event (join/leave/closing) without touching
    /// history, under the same ordering guard as messages.
    pub async fn notify(&self, room_id: &str, event: RoomEvent) -> usize {
        let guard = self.guard(room_id).await;
        let (delivered, failed) = {
            let _serialised = guard.lock().await;
            self.fan_out(room_id, &event).await
        };
        self.reap(failed).await;
        delivered
    }

    async fn fan_out(&self, room_id: &str, event: &RoomEvent) -> (usize, Vec<Uuid>) {
        let members = self.connections.members_of(room_id).await;
        let mut delivered = 0;
        let mut failed = Vec::new();

        for connection in members {
            match connection.sink.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(id = %connection.id, room_id, "delivery queue full, dropping connection");
                    failed.push(connection.id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(id = %connection.id, room_id, "delivery sink closed");
                    failed.push(connection.id);
                }
            }
        }
        (delivered, failed)
    }

    async fn reap(&self, failed: Vec<Uuid>) {
        for id in failed {
            self.connections.detach(id).await;
        }
    }
}
