//! History buffer: bounded per-room message log and sequence allocation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::entities::{RoomMessage, Sender};

struct RoomLog {
    next_seq: u64,
    entries: VecDeque<RoomMessage>,
}

impl RoomLog {
    fn new() -> Self {
        Self {
            next_seq: 1,
            entries: VecDeque::new(),
        }
    }

    fn allocate(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

/// In-memory cache of each room's recent messages.
///
/// The buffer is not the system of record: evicted messages are assumed
/// already persisted by the durable store. Sequence numbers keep advancing
/// across eviction and are never reused.
pub struct HistoryBuffer {
    retention: usize,
    logs: RwLock<HashMap<String, Arc<Mutex<RoomLog>>>>,
}

impl HistoryBuffer {
    pub fn new(retention: usize) -> Self {
        Self {
            retention: retention.max(1),
            logs: RwLock::new(HashMap::new()),
        }
    }

    async fn log(&self, room_id: &str) -> Arc<Mutex<RoomLog>> {
        if let Some(log) = self.logs.read().await.get(room_id) {
            return Arc::clone(log);
        }
        let mut logs = self.logs.write().await;
        Arc::clone(
            logs.entry(room_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RoomLog::new()))),
        )
    }

    /// Record a message, assigning it the room's next sequence number.
    pub async fn append(&self, room_id: &str, sender: Sender, content: &str) -> RoomMessage {
        let log = self.log(room_id).await;
        let mut log = log.lock().await;

        let seq = log.allocate();
        let message = RoomMessage::new(room_id, sender, content, seq);
        log.entries.push_back(message.clone());
        while log.entries.len() > self.retention {
            let evicted = log.entries.pop_front();
            if let Some(evicted) = evicted {
                debug!(room_id, seq = evicted.seq, "evicted message from buffer");
            }
        }
        message
    }

    /// Advance and return the next sequence number for a room.
    ///
    /// Safe under concurrent callers: no two callers ever receive the same
    /// number. The number is consumed whether or not a message follows.
    pub async fn next_seq(&self, room_id: &str) -> u64 {
        let log = self.log(room_id).await;
        let mut log = log.lock().await;
        log.allocate()
    }

    /// The most recent `limit` messages in increasing sequence order.
    /// Empty if the room is unknown or has no messages.
    pub async fn recent(&self, room_id: &str, limit: usize) -> Vec<RoomMessage> {
        let Some(log) = self.logs.read().await.get(room_id).cloned() else {
            return Vec::new();
        };
        let log = log.lock().await;
        let skip = log.entries.len().saturating_sub(limit);
        log.entries.iter().skip(skip).cloned().collect()
    }

    /// Seed an empty room log with store-recovered history.
    ///
    /// Sequence allocation resumes past the highest seeded number so replayed
    /// and fresh messages never collide. Non-empty logs are left untouched.
    pub async fn seed(&self, room_id: &str, mut messages: Vec<RoomMessage>) {
        if messages.is_empty() {
            return;
        }
        let log = self.log(room_id).await;
        let mut log = log.lock().await;

        if !log.entries.is_empty() || log.next_seq > 1 {
            warn!(room_id, "refusing to seed a room log that is already live");
            return;
        }

        messages.sort_by_key(|message| message.seq);
        let highest = messages.last().map(|message| message.seq).unwrap_or(0);
        let skip = messages.len().saturating_sub(self.retention);
        log.entries = messages.into_iter().skip(skip).collect();
        log.next_seq = highest + 1;
        debug!(room_id, next_seq = log.next_seq, "seeded room history");
    }

    /// Drop a room's log entirely.
    pub async fn clear(&self, room_id: &str) {
        self.logs.write().await.remove(room_id);
    }
}
