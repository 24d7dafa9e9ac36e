use std::sync::Arc;

use convoroom_config::AppConfig;
use convoroom_rooms::{DurableStore, ResponseGenerator, RoomService};
use tokio::task::JoinHandle;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

/// The wired room core plus its background tasks.
pub struct CoreServices {
    pub config: AppConfig,
    pub rooms: Arc<RoomService>,
    reaper: JoinHandle<()>,
}

impl CoreServices {
    /// Build the room service against the supplied collaborators and start
    /// the idle reaper.
    pub fn initialise(
        config: &AppConfig,
        store: Arc<dyn DurableStore>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let rooms = RoomService::new(config, store, generator);
        let reaper = rooms.spawn_idle_reaper();

        info!(
            default_capacity = config.rooms.default_capacity,
            history_retention = config.rooms.history_retention,
            idle_timeout_seconds = config.rooms.idle_timeout_seconds,
            "room core ready"
        );

        Self {
            config: config.clone(),
            rooms,
            reaper,
        }
    }
}

impl Drop for CoreServices {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
