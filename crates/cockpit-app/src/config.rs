//! Application configuration.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration for local development. Environment variables prefixed
//! `COCKPIT_` override file values; nested keys use `__`
//! (`COCKPIT_CONTROL__BASE_URL`).

use crate::error::{AppError, AppResult};
use cockpit_control::{SynchronizerConfig, DEFAULT_CONTROL_URL};
use cockpit_dashboard::DashboardConfig;
use cockpit_ws::{ConnectionConfig, DEFAULT_WS_URL};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Config file used when neither `--config` nor `COCKPIT_CONFIG` is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "COCKPIT_CONFIG";

const ENV_PREFIX: &str = "COCKPIT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Market event stream endpoint.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Instrument selected at startup.
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default)]
    pub websocket: WsConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_instrument() -> String {
    "EURUSD".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            instrument: default_instrument(),
            websocket: WsConfig::default(),
            control: ControlConfig::default(),
            feed: FeedConfig::default(),
            dashboard: DashboardConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// WebSocket configuration subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WsConfig {
    /// Maximum consecutive reconnection attempts (0 = never reconnect).
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// Silence before a ping is sent (0 = no heartbeat).
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Permit plain `ws://` endpoints.
    pub allow_insecure: bool,
    /// Buffered connection events before the connection task waits.
    pub channel_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        let base = ConnectionConfig::default();
        Self {
            max_reconnect_attempts: base.max_reconnect_attempts,
            reconnect_base_delay_ms: base.reconnect_base_delay_ms,
            reconnect_max_delay_ms: base.reconnect_max_delay_ms,
            heartbeat_interval_ms: base.heartbeat_interval_ms,
            heartbeat_timeout_ms: base.heartbeat_timeout_ms,
            connect_timeout_ms: base.connect_timeout_ms,
            allow_insecure: base.allow_insecure,
            channel_capacity: 1024,
        }
    }
}

impl WsConfig {
    pub fn connection_config(&self, url: &str) -> ConnectionConfig {
        ConnectionConfig {
            url: url.to_string(),
            max_reconnect_attempts: self.max_reconnect_attempts,
            reconnect_base_delay_ms: self.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.reconnect_max_delay_ms,
            heartbeat_interval_ms: self.heartbeat_interval_ms,
            heartbeat_timeout_ms: self.heartbeat_timeout_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            allow_insecure: self.allow_insecure,
        }
    }
}

/// Control-plane configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub base_url: String,
    pub poll_interval_ms: u64,
    /// A command without confirmation for this long is reported as timed out.
    pub ack_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CONTROL_URL.to_string(),
            poll_interval_ms: 3000,
            ack_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl ControlConfig {
    pub fn synchronizer_config(&self) -> SynchronizerConfig {
        SynchronizerConfig {
            // A zero interval would make tokio's interval panic.
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Operator log retention (0 = unbounded).
    pub max_log_entries: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_log_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    /// JSON log output.
    pub json: bool,
}

impl AppConfig {
    /// Resolve the config path: explicit argument, then `COCKPIT_CONFIG`, then the default.
    pub fn resolve_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load the optional file at `path` layered with `COCKPIT_*` environment variables.
    pub fn load(path: &str) -> AppResult<Self> {
        Self::load_with(path, environment())
    }

    /// Same as [`load`](Self::load) with an explicit environment source.
    pub fn load_with(path: &str, env: Environment) -> AppResult<Self> {
        let settings = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(env)
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load from a specific file, without environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}

/// `COCKPIT_*` environment source.
pub fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
