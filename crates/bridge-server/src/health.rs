//! `/health` endpoint.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

/// Timeout for the upstream reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of probing the upstream HTTPS origin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UpstreamProbe {
    /// Any HTTP response counts, 404 included.
    pub reachable: bool,
    /// HTTP status, when a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Transport error, when none did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health check response body.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"`, or `"degraded"` when no upstream credential is configured.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Sessions currently running.
    pub active_sessions: usize,
    /// Whether an upstream credential is present.
    pub api_key_configured: bool,
    /// Whether a memory store is attached.
    pub memory_enabled: bool,
    /// Upstream reachability.
    pub upstream: UpstreamProbe,
}

/// Build a health response from live state.
pub fn health_check(
    start_time: Instant,
    active_sessions: usize,
    api_key_configured: bool,
    memory_enabled: bool,
    upstream: UpstreamProbe,
) -> HealthResponse {
    HealthResponse {
        status: if api_key_configured { "ok" } else { "degraded" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        active_sessions,
        api_key_configured,
        memory_enabled,
        upstream,
    }
}

/// `HEAD` the upstream origin.
pub async fn probe_upstream(client: &reqwest::Client, url: &str) -> UpstreamProbe {
    match client.head(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => UpstreamProbe {
            reachable: true,
            status: Some(response.status().as_u16()),
            error: None,
        },
        Err(error) => {
            debug!(%error, "upstream probe failed");
            UpstreamProbe {
                reachable: false,
                status: None,
                error: Some(error.to_string()),
            }
        }
    }
}
