//! Settings type definitions.
//!
//! Every struct uses `#[serde(rename_all = "camelCase", default)]` so a
//! partial user file deserializes cleanly over the compiled defaults.

mod memory;
mod server;

pub use memory::{MemoryBackend, MemorySettings, TranscriptSettings};
pub use server::{LoggingSettings, ServerSettings, UpstreamSettings};

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Listener and client keep-alive.
    pub server: ServerSettings,
    /// Upstream generation service.
    pub upstream: UpstreamSettings,
    /// Memory persistence.
    pub memory: MemorySettings,
    /// Transcript heuristics.
    pub transcript: TranscriptSettings,
    /// Log output.
    pub logging: LoggingSettings,
}
