use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "convoroom.toml",
    "config/convoroom.toml",
    "crates/config/convoroom.toml",
    "../convoroom.toml",
    "../config/convoroom.toml",
    "../crates/config/convoroom.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub rooms: RoomsConfig,
    pub persistence: PersistenceConfig,
    pub generator: GeneratorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rooms: RoomsConfig::default(),
            persistence: PersistenceConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

/// Knobs governing room admission, history retention, and teardown pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsConfig {
    /// Member cap applied when a room is created without an explicit capacity.
    #[serde(default = "RoomsConfig::default_capacity")]
    pub default_capacity: u32,
    /// Number of recent messages kept in memory per room.
    #[serde(default = "RoomsConfig::default_history_retention")]
    pub history_retention: usize,
    /// Bounded size of each connection's delivery queue.
    #[serde(default = "RoomsConfig::default_delivery_buffer")]
    pub delivery_buffer: usize,
    /// Create a room on first join instead of rejecting the attach.
    #[serde(default = "RoomsConfig::default_create_on_join")]
    pub create_on_join: bool,
    /// Rooms with no activity for this long are closed by the reaper.
    #[serde(default = "RoomsConfig::default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// How long a closing room waits for connections to detach voluntarily.
    #[serde(default = "RoomsConfig::default_close_grace")]
    pub close_grace_seconds: u64,
}

impl RoomsConfig {
    const fn default_capacity() -> u32 {
        4
    }

    const fn default_history_retention() -> usize {
        200
    }

    const fn default_delivery_buffer() -> usize {
        64
    }

    const fn default_create_on_join() -> bool {
        true
    }

    const fn default_idle_timeout() -> u64 {
        1_800
    }

    const fn default_close_grace() -> u64 {
        30
    }
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            default_capacity: Self::default_capacity(),
            history_retention: Self::default_history_retention(),
            delivery_buffer: Self::default_delivery_buffer(),
            create_on_join: Self::default_create_on_join(),
            idle_timeout_seconds: Self::default_idle_timeout(),
            close_grace_seconds: Self::default_close_grace(),
        }
    }
}

/// Retry policy for the durable store collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "PersistenceConfig::default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "PersistenceConfig::default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
}

impl PersistenceConfig {
    const fn default_retry_attempts() -> u32 {
        3
    }

    const fn default_retry_base_delay() -> u64 {
        250
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            retry_attempts: Self::default_retry_attempts(),
            retry_base_delay_ms: Self::default_retry_base_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// How many recent messages are handed to the response generator.
    #[serde(default = "GeneratorConfig::default_context_messages")]
    pub context_messages: usize,
    #[serde(default = "GeneratorConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl GeneratorConfig {
    const fn default_context_messages() -> usize {
        25
    }

    const fn default_request_timeout() -> u64 {
        30
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            context_messages: Self::default_context_messages(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use convoroom_config::load;
///
/// std::env::remove_var("CONVOROOM_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(config.rooms.default_capacity > 0);
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder();
    builder = builder
        .set_default(
            "rooms.default_capacity",
            i64::from(defaults.rooms.default_capacity),
        )
        .unwrap()
        .set_default(
            "rooms.history_retention",
            defaults.rooms.history_retention as i64,
        )
        .unwrap()
        .set_default(
            "rooms.delivery_buffer",
            defaults.rooms.delivery_buffer as i64,
        )
        .unwrap()
        .set_default("rooms.create_on_join", defaults.rooms.create_on_join)
        .unwrap()
        .set_default(
            "rooms.idle_timeout_seconds",
            i64::try_from(defaults.rooms.idle_timeout_seconds).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "rooms.close_grace_seconds",
            i64::try_from(defaults.rooms.close_grace_seconds).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "persistence.retry_attempts",
            i64::from(defaults.persistence.retry_attempts),
        )
        .unwrap()
        .set_default(
            "persistence.retry_base_delay_ms",
            i64::try_from(defaults.persistence.retry_base_delay_ms).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "generator.context_messages",
            defaults.generator.context_messages as i64,
        )
        .unwrap()
        .set_default(
            "generator.request_timeout_seconds",
            i64::try_from(defaults.generator.request_timeout_seconds).unwrap_or(i64::MAX),
        )
        .unwrap();

    let environment_overrides = config::Environment::with_prefix("CONVOROOM").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("CONVOROOM_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via CONVOROOM_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.rooms.default_capacity == 0 {
        config.rooms.default_capacity = AppConfig::default().rooms.default_capacity;
    }
    if config.rooms.history_retention == 0 {
        config.rooms.history_retention = 1;
    }
    if config.rooms.delivery_buffer == 0 {
        config.rooms.delivery_buffer = 1;
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
