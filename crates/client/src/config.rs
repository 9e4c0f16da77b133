//! Client configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use banter_shared::ChatError;
use url::Url;

use crate::ws::ReconnectConfig;

const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_WS_PATH: &str = "/ws";

/// Timings used by the reconciler's deferred actions.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Idle window after the last keystroke before `stop-typing` is sent.
    pub typing_idle: Duration,
    /// How long a new-message notification stays visible.
    pub notification_ttl: Duration,
    /// Delay before marking an open chat read after a push lands in it.
    pub mark_read_delay: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            typing_idle: Duration::from_millis(3000),
            notification_ttl: Duration::from_millis(5000),
            mark_read_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API, e.g. `https://chat.example.com`.
    pub api_url: String,
    /// Path of the event-stream endpoint on the same host.
    pub ws_path: String,
    pub reconnect: ReconnectConfig,
    pub sync: SyncConfig,
    /// Directory for persisted session data. `None` uses the platform config dir.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_path: DEFAULT_WS_PATH.to_string(),
            reconnect: ReconnectConfig::default(),
            sync: SyncConfig::default(),
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment.
    ///
    /// Environment variables:
    /// - `BANTER_API_URL`: REST base URL (default: "http://localhost:5000")
    /// - `BANTER_WS_PATH`: event-stream path (default: "/ws")
    /// - `BANTER_RECONNECT_ATTEMPTS`: reconnect attempts before giving up (default: 5)
    /// - `BANTER_RECONNECT_DELAY_MS`: fixed delay between attempts (default: 1000)
    /// - `BANTER_TYPING_IDLE_MS`: typing idle window (default: 3000)
    /// - `BANTER_NOTIFICATION_TTL_MS`: notification lifetime (default: 5000)
    /// - `BANTER_MARK_READ_DELAY_MS`: mark-read delay for pushes (default: 500)
    /// - `BANTER_DATA_DIR`: session storage directory
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let reconnect = ReconnectConfig {
            max_attempts: env_parse("BANTER_RECONNECT_ATTEMPTS")
                .unwrap_or(defaults.reconnect.max_attempts),
            delay: env_millis("BANTER_RECONNECT_DELAY_MS").unwrap_or(defaults.reconnect.delay),
        };
        let sync = SyncConfig {
            typing_idle: env_millis("BANTER_TYPING_IDLE_MS").unwrap_or(defaults.sync.typing_idle),
            notification_ttl: env_millis("BANTER_NOTIFICATION_TTL_MS")
                .unwrap_or(defaults.sync.notification_ttl),
            mark_read_delay: env_millis("BANTER_MARK_READ_DELAY_MS")
                .unwrap_or(defaults.sync.mark_read_delay),
        };

        Self {
            api_url: std::env::var("BANTER_API_URL").unwrap_or(defaults.api_url),
            ws_path: std::env::var("BANTER_WS_PATH").unwrap_or(defaults.ws_path),
            reconnect,
            sync,
            data_dir: std::env::var("BANTER_DATA_DIR").ok().map(PathBuf::from),
        }
    }

    /// WebSocket URL derived from the API URL (`http→ws`, `https→wss`).
    pub fn ws_url(&self) -> Result<String, ChatError> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| ChatError::Network(format!("invalid api url {}: {e}", self.api_url)))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| ChatError::Network(format!("cannot derive ws url from {}", self.api_url)))?;
        url.set_path(&self.ws_path);
        Ok(url.to_string())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}
