//! Outward-facing room service composing the core components.
//!
//! These are the operations an HTTP/RPC layer would call: create, join,
//! leave, publish, request an assistant turn, read history, close.

use std::sync::Arc;
use std::time::Duration;

use convoroom_config::AppConfig;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::BroadcastRouter;
use crate::collaborators::{DurableStore, ResponseGenerator};
use crate::connections::ConnectionManager;
use crate::entities::{Room, RoomMessage, Sender};
use crate::history::HistoryBuffer;
use crate::lifecycle::LifecycleController;
use crate::registry::RoomRegistry;
use crate::retry;
use crate::types::{RoomError, RoomEvent, RoomResult};

/// Result of joining a room: the connection handle, the replayed backlog,
/// and the receiving half of the bounded delivery queue.
pub struct JoinedRoom {
    pub connection_id: Uuid,
    pub backlog: Vec<RoomMessage>,
    pub events: mpsc::Receiver<RoomEvent>,
}

/// Outcome of a publish: the recorded message and how many connections were
/// actually reached.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub message: RoomMessage,
    pub delivered: usize,
}

/// Facade over the room broadcast core.
pub struct RoomService {
    registry: Arc<RoomRegistry>,
    connections: Arc<ConnectionManager>,
    history: Arc<HistoryBuffer>,
    router: Arc<BroadcastRouter>,
    lifecycle: Arc<LifecycleController>,
    store: Arc<dyn DurableStore>,
    generator: Arc<dyn ResponseGenerator>,
    config: AppConfig,
}

impl RoomService {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn DurableStore>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Arc<Self> {
        let registry = Arc::new(RoomRegistry::new());
        let connections = Arc::new(ConnectionManager::new(Arc::clone(&registry)));
        let history = Arc::new(HistoryBuffer::new(config.rooms.history_retention));
        let router = Arc::new(BroadcastRouter::new(
            Arc::clone(&connections),
            Arc::clone(&history),
        ));
        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&registry),
            Arc::clone(&connections),
            Arc::clone(&router),
            Arc::clone(&history),
            Arc::clone(&store),
            config.rooms.clone(),
            config.persistence.clone(),
        ));

        Arc::new(Self {
            registry,
            connections,
            history,
            router,
            lifecycle,
            store,
            generator,
            config: config.clone(),
        })
    }

    /// Create a room. An omitted identifier gets a generated one; an omitted
    /// capacity falls back to the configured default.
    pub async fn create_room(
        &self,
        room_id: Option<String>,
        capacity: Option<u32>,
    ) -> RoomResult<Room> {
        let id = room_id.unwrap_or_else(cuid2::create_id);
        let capacity = capacity.unwrap_or(self.config.rooms.default_capacity);

        let room = self.registry.create(&id, capacity).await?;
        self.persist_room_best_effort(room.clone());
        Ok(room)
    }

    /// Admit a user, bind a fresh connection, and replay the recent backlog.
    ///
    /// With `rooms.create_on_join` enabled an unknown room is created on the
    /// fly with the default capacity, matching how the original groups sprang
    /// into being on first subscribe.
    pub async fn join_room(&self, room_id: &str, user_id: &str) -> RoomResult<JoinedRoom> {
        let admission = match self.registry.try_admit(room_id, user_id).await {
            Ok(admission) => admission,
            Err(RoomError::NotFound { .. }) if self.config.rooms.create_on_join => {
                match self
                    .registry
                    .create(room_id, self.config.rooms.default_capacity)
                    .await
                {
                    Ok(room) => self.persist_room_best_effort(room),
                    // another join won the race; admission below settles it
                    Err(RoomError::AlreadyExists { .. }) => {}
                    Err(error) => return Err(error),
                }
                self.registry.try_admit(room_id, user_id).await?
            }
            Err(error) => return Err(error),
        };

        let (sink, events) = mpsc::channel(self.config.rooms.delivery_buffer);
        let connection_id = self.connections.attach(room_id, user_id, sink).await;

        let backlog = self.backlog(room_id).await;

        if admission.is_new() {
            self.router
                .notify(
                    room_id,
                    RoomEvent::MemberJoined {
                        room_id: room_id.to_string(),
                        user_id: user_id.to_string(),
                    },
                )
                .await;
        }

        info!(room_id, user_id, %connection_id, replayed = backlog.len(), "user joined room");
        Ok(JoinedRoom {
            connection_id,
            backlog,
            events,
        })
    }

    /// Detach a connection and announce the departure once the user's
    /// membership is actually released.
    pub async fn leave_room(&self, connection_id: Uuid) -> RoomResult<()> {
        let Some((room_id, user_id)) = self.connections.detach(connection_id).await else {
            return Err(RoomError::connection_not_found(connection_id.to_string()));
        };

        self.router
            .notify(
                &room_id,
                RoomEvent::MemberLeft {
                    room_id: room_id.clone(),
                    user_id: user_id.clone(),
                },
            )
            .await;
        info!(%room_id, %user_id, %connection_id, "user left room");
        Ok(())
    }

    /// Publish a user message to a room and fan it out to every bound
    /// connection.
    pub async fn publish_message(
        &self,
        room_id: &str,
        user_id: &str,
        content: &str,
    ) -> RoomResult<PublishReceipt> {
        self.registry.get(room_id).await?;

        let (message, delivered) = self
            .router
            .publish(room_id, Sender::User(user_id.to_string()), content)
            .await?;
        self.registry.touch(room_id).await;
        self.persist_message_best_effort(message.clone());

        Ok(PublishReceipt { message, delivered })
    }

    /// Generate an assistant response from recent context and publish it.
    ///
    /// The context is snapshotted up front; no room state is locked while
    /// the generator runs.
    pub async fn request_response(&self, room_id: &str) -> RoomResult<PublishReceipt> {
        self.registry.get(room_id).await?;

        let context = self
            .history
            .recent(room_id, self.config.generator.context_messages)
            .await;

        let wait = Duration::from_secs(self.config.generator.request_timeout_seconds);
        let content = match timeout(wait, self.generator.generate(room_id, &context)).await {
            Ok(Ok(content)) => content,
            Ok(Err(error)) => return Err(RoomError::generation(error.to_string())),
            Err(_) => return Err(RoomError::generation("response generation timed out")),
        };

        // the room may have closed while we were generating
        self.registry.get(room_id).await?;

        let (message, delivered) = self
            .router
            .publish(room_id, Sender::Assistant, &content)
            .await?;
        self.registry.touch(room_id).await;
        self.persist_message_best_effort(message.clone());

        Ok(PublishReceipt { message, delivered })
    }

    /// The most recent `limit` messages for a room, oldest first.
    ///
    /// Falls back to the durable store when the in-memory buffer has nothing,
    /// so history of reopened or evicted rooms is still readable.
    pub async fn get_recent_history(
        &self,
        room_id: &str,
        limit: usize,
    ) -> RoomResult<Vec<RoomMessage>> {
        let cached = self.history.recent(room_id, limit).await;
        if !cached.is_empty() {
            return Ok(cached);
        }

        match self.store.load_recent(room_id, limit).await {
            Ok(stored) => Ok(stored),
            Err(error) => {
                warn!(room_id, %error, "failed to load history from store");
                Ok(Vec::new())
            }
        }
    }

    /// Close a room, detaching all members within the grace period.
    pub async fn close_room(&self, room_id: &str) -> RoomResult<()> {
        self.lifecycle.close_room(room_id).await
    }

    /// Snapshot of all live rooms.
    pub async fn rooms(&self) -> Vec<Room> {
        self.registry.rooms().await
    }

    /// Start the background idle reaper for this service.
    pub fn spawn_idle_reaper(&self) -> tokio::task::JoinHandle<()> {
        self.lifecycle.spawn_idle_reaper()
    }

    async fn backlog(&self, room_id: &str) -> Vec<RoomMessage> {
        let retention = self.config.rooms.history_retention;
        let cached = self.history.recent(room_id, retention).await;
        if !cached.is_empty() {
            return cached;
        }

        let stored = retry::with_backoff(&self.config.persistence, "load recent history", || {
            self.store.load_recent(room_id, retention)
        })
        .await
        .unwrap_or_default();

        if !stored.is_empty() {
            self.history.seed(room_id, stored.clone()).await;
            debug!(room_id, count = stored.len(), "seeded history from store");
        }
        stored
    }

    fn persist_message_best_effort(&self, message: RoomMessage) {
        let store = Arc::clone(&self.store);
        let policy = self.config.persistence.clone();
        tokio::spawn(async move {
            retry::with_backoff(&policy, "persist message", || {
                store.persist_message(&message)
            })
            .await;
        });
    }

    fn persist_room_best_effort(&self, room: Room) {
        let store = Arc::clone(&self.store);
        let policy = self.config.persistence.clone();
        tokio::spawn(async move {
            retry::with_backoff(&policy, "persist room", || store.persist_room(&room)).await;
        });
    }
}
