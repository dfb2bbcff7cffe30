//! Close codes and well-known names shared between the server and its tests.

/// Key of the single global memory record.
pub const DEFAULT_MEMORY_KEY: &str = "global_context";

/// Client text starting with this prefix is a synthesized trigger, never user speech.
pub const SYSTEM_TRIGGER_PREFIX: &str = "[SYSTEM]";

/// Default upstream endpoint (the credential is appended as `key`).
pub const DEFAULT_UPSTREAM_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Origin probed by the status endpoint.
pub const DEFAULT_PROBE_URL: &str = "https://generativelanguage.googleapis.com";

/// Server refused the session because it is misconfigured (missing credential).
pub const CLOSE_CONFIG_ERROR: u16 = 1011;
/// Reason sent with [`CLOSE_CONFIG_ERROR`].
pub const CLOSE_CONFIG_ERROR_REASON: &str = "Server configuration error";

/// The initial upstream connection could not be established.
pub const CLOSE_UPSTREAM_UNAVAILABLE: u16 = 1014;
/// Reason sent with [`CLOSE_UPSTREAM_UNAVAILABLE`].
pub const CLOSE_UPSTREAM_UNAVAILABLE_REASON: &str = "Upstream unavailable";

/// The server is shutting down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// The client stopped answering keep-alive pings.
pub const CLOSE_KEEPALIVE_TIMEOUT_REASON: &str = "Keep-alive timeout";

/// Reason sent with [`CLOSE_GOING_AWAY`] during shutdown.
pub const CLOSE_SHUTDOWN_REASON: &str = "Server shutting down";
