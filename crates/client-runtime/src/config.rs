//! # Runtime Configuration
//!
//! Loaded from the JSON file named by `CLIENT_CONFIG_PATH` when it is set,
//! otherwise from environment variables on top of the defaults.
//!
//! ```json
//! {
//!   "frame_interval_ms": 16,
//!   "max_frames": 600,
//!   "account": "player",
//!   "ping_every_frames": 60,
//!   "bus": { "request_timeout_ms": 2000 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use shared_bus::BusConfig;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid runtime configuration: {0}")]
    Invalid(String),
}

/// Complete client runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Time between frames.
    pub frame_interval_ms: u64,
    /// Stop after this many frames. `None` runs until interrupted.
    pub max_frames: Option<u64>,
    /// Account the client session logs in with.
    pub account: String,
    /// Frames between liveness pings once logged in.
    pub ping_every_frames: u64,
    /// Message bus settings.
    pub bus: BusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
            max_frames: Some(600),
            account: "player".to_string(),
            ping_every_frames: 60,
            bus: BusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load from `CLIENT_CONFIG_PATH` if set, otherwise from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match env::var("CLIENT_CONFIG_PATH") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "Loaded runtime configuration from file");
        Ok(config)
    }

    /// Read overrides from the environment on top of the defaults.
    ///
    /// # Environment Variables
    ///
    /// - `CLIENT_FRAME_INTERVAL_MS`: frame interval (default: 16)
    /// - `CLIENT_MAX_FRAMES`: frame limit, `0` for unlimited (default: 600)
    /// - `CLIENT_ACCOUNT`: account name (default: player)
    /// - `CLIENT_PING_EVERY_FRAMES`: ping cadence (default: 60)
    /// - `BUS_*`: see [`BusConfig::from_env`]
    pub fn from_env() -> Self {
        let mut config = Self {
            bus: BusConfig::from_env(),
            ..Self::default()
        };

        if let Some(ms) = parse_env("CLIENT_FRAME_INTERVAL_MS") {
            config.frame_interval_ms = ms;
        }
        if let Some(frames) = parse_env::<u64>("CLIENT_MAX_FRAMES") {
            config.max_frames = (frames > 0).then_some(frames);
        }
        if let Ok(account) = env::var("CLIENT_ACCOUNT") {
            config.account = account;
        }
        if let Some(frames) = parse_env("CLIENT_PING_EVERY_FRAMES") {
            config.ping_every_frames = frames;
        }

        config
    }

    /// Frame interval as a `Duration`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "frame_interval_ms cannot be 0".into(),
            ));
        }
        if self.ping_every_frames == 0 {
            return Err(ConfigError::Invalid(
                "ping_every_frames cannot be 0".into(),
            ));
        }
        self.bus
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
