//! Server, upstream, and logging settings.

use std::time::Duration;

use bridge_core::ApiKey;
use bridge_core::constants::{DEFAULT_PROBE_URL, DEFAULT_UPSTREAM_URL};
use serde::{Deserialize, Serialize};

/// Listener and client keep-alive settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (0 for auto-assign).
    pub port: u16,
    /// Client WebSocket path.
    pub ws_path: String,
    /// Interval between pings sent to the client, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close the client if nothing was heard for this long, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Maximum client frame size in bytes.
    pub max_message_size: usize,
    /// How long shutdown waits for sessions to persist and close.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10_000,
            ws_path: "/ws".to_string(),
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 16 * 1024 * 1024,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl ServerSettings {
    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// Upstream generation service settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// WebSocket endpoint. The API key is appended as the `key` query parameter.
    pub url: String,
    /// HTTPS origin probed by `/health`.
    pub probe_url: String,
    /// Opening handshake timeout in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Fixed delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
    /// `User-Agent` sent on the handshake.
    pub user_agent: String,
    /// Log a warning each time the pre-readiness queue grows by this many frames.
    pub queue_warn_threshold: usize,
    /// Connection-scoped credential. Read from the environment, never written back.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            probe_url: DEFAULT_PROBE_URL.to_string(),
            handshake_timeout_ms: 30_000,
            reconnect_delay_ms: 1_000,
            user_agent: format!("live-bridge/{}", env!("CARGO_PKG_VERSION")),
            queue_warn_threshold: 256,
            api_key: None,
        }
    }
}

impl UpstreamSettings {
    /// The credential, if configured and non-empty.
    pub fn api_key(&self) -> Option<ApiKey> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(ApiKey::new)
    }

    /// Handshake timeout as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl std::fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("url", &self.url)
            .field("probe_url", &self.probe_url)
            .field("handshake_timeout_ms", &self.handshake_timeout_ms)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .field("user_agent", &self.user_agent)
            .field("queue_warn_threshold", &self.queue_warn_threshold)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
