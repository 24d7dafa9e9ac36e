//! Room lifecycle controller: Open → Closing → Closed orchestration.

use std::sync::Arc;
use std::time::Duration;

use convoroom_config::{PersistenceConfig, RoomsConfig};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::broadcast::BroadcastRouter;
use crate::collaborators::DurableStore;
use crate::connections::ConnectionManager;
use crate::history::HistoryBuffer;
use crate::registry::RoomRegistry;
use crate::retry;
use crate::types::{RoomEvent, RoomResult};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Orchestrates room teardown and idle reaping over the registry,
/// connection manager, router, and history buffer.
pub struct LifecycleController {
    registry: Arc<RoomRegistry>,
    connections: Arc<ConnectionManager>,
    router: Arc<BroadcastRouter>,
    history: Arc<HistoryBuffer>,
    store: Arc<dyn DurableStore>,
    rooms_config: RoomsConfig,
    persistence: PersistenceConfig,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<RoomRegistry>,
        connections: Arc<ConnectionManager>,
        router: Arc<BroadcastRouter>,
        history: Arc<HistoryBuffer>,
        store: Arc<dyn DurableStore>,
        rooms_config: RoomsConfig,
        persistence: PersistenceConfig,
    ) -> Self {
        Self {
            registry,
            connections,
            router,
            history,
            store,
            rooms_config,
            persistence,
        }
    }

    /// Close a room: stop admissions, broadcast the terminal event, wait out
    /// the grace period, force-detach stragglers, then release all in-memory
    /// state.
    ///
    /// Store failures are retried with bounded backoff and then abandoned;
    /// a persistence outage never leaves a room stuck un-closeable.
    pub async fn close_room(&self, room_id: &str) -> RoomResult<()> {
        self.registry.close(room_id).await?;

        self.router
            .notify(
                room_id,
                RoomEvent::RoomClosing {
                    room_id: room_id.to_string(),
                },
            )
            .await;

        let grace = Duration::from_secs(self.rooms_config.close_grace_seconds);
        let deadline = Instant::now() + grace;
        while self.connections.connection_count(room_id).await > 0 && Instant::now() < deadline {
            sleep(DRAIN_POLL_INTERVAL).await;
        }

        let remaining = self.connections.drain_room(room_id).await;
        if !remaining.is_empty() {
            warn!(
                room_id,
                count = remaining.len(),
                "grace period elapsed, connections force-detached"
            );
        }

        retry::with_backoff(&self.persistence, "mark room inactive", || {
            self.store.mark_room_inactive(room_id)
        })
        .await;

        self.history.clear(room_id).await;
        self.router.remove_guard(room_id).await;
        self.registry.remove(room_id).await;
        info!(room_id, "room closed");
        Ok(())
    }

    /// Spawn the idle reaper: a background task that closes rooms whose last
    /// activity is older than the configured idle window. Decoupled from the
    /// admission path; failures only affect the room being reaped.
    pub fn spawn_idle_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let idle = Duration::from_secs(controller.rooms_config.idle_timeout_seconds.max(1));
        let sweep = idle.checked_div(4).unwrap_or(idle).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let window = chrono::Duration::from_std(idle)
                .unwrap_or_else(|_| chrono::Duration::seconds(i64::MAX / 1_000));
            loop {
                sleep(sweep).await;
                for room_id in controller.registry.idle_rooms(window).await {
                    info!(%room_id, "closing idle room");
                    if let Err(error) = controller.close_room(&room_id).await {
                        warn!(%room_id, %error, "failed to close idle room");
                    }
                }
            }
        })
    }
}
