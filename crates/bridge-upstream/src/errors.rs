//! Upstream connection errors.

use std::time::Duration;

/// Errors opening or using an upstream connection.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// No API key is configured.
    #[error("upstream credential is not configured")]
    MissingCredential,

    /// The endpoint or a handshake header is malformed.
    #[error("invalid upstream endpoint: {0}")]
    InvalidEndpoint(String),

    /// The WebSocket handshake failed.
    #[error("upstream handshake failed: {0}")]
    Handshake(String),

    /// The handshake did not finish in time.
    #[error("upstream handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The connection's writer has already shut down.
    #[error("upstream connection closed")]
    Closed,
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, UpstreamError>;
