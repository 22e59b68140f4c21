//! Application configuration.
//!
//! Settings come from a TOML file; broker credentials come only from the
//! `LS_APP_KEY` / `LS_SECRET_KEY` environment variables and are never
//! written to the file.

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vimon_auth::AuthConfig;
use vimon_core::Market;
use vimon_ws::ConnConfig;

/// Environment variable holding the broker app key.
pub const APP_KEY_ENV: &str = "LS_APP_KEY";
/// Environment variable holding the broker app secret.
pub const SECRET_KEY_ENV: &str = "LS_SECRET_KEY";

/// Token endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    /// OAuth2 token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Refresh when the token is within this margin of expiry.
    #[serde(default = "default_refresh_margin_secs")]
    pub refresh_margin_secs: u64,
    /// How often the refresh timer checks token validity.
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Bounded retries for token fetches.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay for token retry backoff.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_token_url() -> String {
    "https://openapi.ls-sec.co.kr:8080/oauth2/token".to_string()
}

fn default_refresh_margin_secs() -> u64 {
    300
}

fn default_check_interval_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            refresh_margin_secs: default_refresh_margin_secs(),
            check_interval_secs: default_check_interval_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Realtime gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSection {
    #[serde(default = "default_ws_url")]
    pub url: String,
    /// Markets whose VI channel is monitored.
    #[serde(default = "default_markets")]
    pub markets: Vec<Market>,
    /// Connection is dead after this long without any inbound frame.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// Maximum consecutive reconnection attempts (0 = infinite).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_ws_url() -> String {
    "wss://openapi.ls-sec.co.kr:9443/websocket".to_string()
}

fn default_markets() -> Vec<Market> {
    Market::ALL.to_vec()
}

fn default_idle_timeout_ms() -> u64 {
    60_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

impl Default for WsSection {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            markets: default_markets(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

/// Post-trigger trade watch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSection {
    /// How long a triggered symbol's trade channel stays subscribed.
    #[serde(default = "default_trade_watch_secs")]
    pub trade_watch_secs: u64,
}

fn default_trade_watch_secs() -> u64 {
    180
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            trade_watch_secs: default_trade_watch_secs(),
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Buffered records before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_data_dir() -> String {
    "./data/vi_events".to_string()
}

fn default_buffer_size() -> usize {
    100
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Telemetry settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetrySection {
    /// Optional directory for daily-rotated log files.
    #[serde(default)]
    pub log_dir: Option<String>,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub websocket: WsSection,
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub persistence: PersistenceSection,
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl AppConfig {
    /// Load configuration, falling back to defaults if the file is absent.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(%path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Broker credentials from the environment.
    pub fn auth_config(&self) -> AppResult<AuthConfig> {
        let app_key = std::env::var(APP_KEY_ENV)
            .map_err(|_| AppError::Config(format!("{APP_KEY_ENV} is not set")))?;
        let app_secret = std::env::var(SECRET_KEY_ENV)
            .map_err(|_| AppError::Config(format!("{SECRET_KEY_ENV} is not set")))?;

        Ok(AuthConfig {
            token_url: self.auth.token_url.clone(),
            app_key,
            app_secret,
        })
    }

    pub fn conn_config(&self) -> ConnConfig {
        ConnConfig {
            url: self.websocket.url.clone(),
            markets: self.websocket.markets.clone(),
            max_reconnect_attempts: self.websocket.max_reconnect_attempts,
            reconnect_base_delay_ms: self.websocket.reconnect_base_delay_ms,
            reconnect_max_delay_ms: self.websocket.reconnect_max_delay_ms,
            idle_timeout_ms: self.websocket.idle_timeout_ms,
            token_refresh_margin_secs: self.auth.refresh_margin_secs,
        }
    }
}
