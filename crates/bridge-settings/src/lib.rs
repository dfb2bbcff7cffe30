//! # bridge-settings
//!
//! Configuration for the live session bridge, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`BridgeSettings::default()`]
//! 2. **User file**: `~/.bridge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `API_KEY`, `PORT` and `BRIDGE_*` overrides
//!
//! The binary applies CLI flags on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, bridge_home, deep_merge, load_settings_from_path, settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = BridgeSettings::default();
        let path = settings_path();
        assert!(path.ends_with("settings.json"));
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.server.port, 10_000);
        assert_eq!(settings.server.ws_path, "/ws");
        assert_eq!(settings.server.heartbeat_interval_ms, 30_000);
        assert_eq!(settings.upstream.handshake_timeout_ms, 30_000);
        assert_eq!(settings.upstream.reconnect_delay_ms, 1_000);
        assert_eq!(settings.memory.record_key, "global_context");
        assert_eq!(settings.transcript.trailing_window_chars, 300);
        assert_eq!(settings.transcript.autosave_interval_ms, 10_000);
        assert!(settings.upstream.api_key.is_none());
    }
}
