//! Protocol-level errors.

/// Errors raised while inspecting or rewriting wire frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Setup frame carries no `systemInstruction.parts[0]` to extend.
    #[error("setup frame has no system instruction part")]
    MissingInstruction,
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ProtocolError>;
