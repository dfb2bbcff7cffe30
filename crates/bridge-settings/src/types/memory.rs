//! Memory persistence and transcript heuristic settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bridge_core::constants::DEFAULT_MEMORY_KEY;
use serde::{Deserialize, Serialize};

/// Storage backend for the memory record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// `SQLite` file under `~/.bridge`.
    #[default]
    Sqlite,
    /// Process-local map, lost on restart.
    Memory,
}

/// Memory persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySettings {
    /// When false the bridge runs in no-memory mode.
    pub enabled: bool,
    /// Which store to open.
    pub backend: MemoryBackend,
    /// Database path (relative paths resolve against `~/.bridge`).
    pub db_path: String,
    /// Key of the single global record.
    pub record_key: String,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: MemoryBackend::default(),
            db_path: "memory.db".to_string(),
            record_key: DEFAULT_MEMORY_KEY.to_string(),
        }
    }
}

impl MemorySettings {
    /// Database path, with relative paths resolved against `home`.
    pub fn resolved_db_path(&self, home: &Path) -> PathBuf {
        let path = PathBuf::from(&self.db_path);
        if path.is_absolute() {
            path
        } else {
            home.join(path)
        }
    }
}

/// Transcript heuristic settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptSettings {
    /// Label written before assistant lines in the conversation log.
    pub assistant_label: String,
    /// Label written before user lines in the conversation log.
    pub user_label: String,
    /// Characters at the end of the log scanned for name and rule phrases.
    pub trailing_window_chars: usize,
    /// Minimum time between autosaves, in milliseconds.
    pub autosave_interval_ms: u64,
    /// Characters of log kept as the autosaved summary.
    pub autosave_summary_chars: usize,
    /// Characters of log kept as the summary at session end.
    pub final_summary_chars: usize,
    /// Session-end persistence is skipped for logs this short or shorter.
    pub min_log_chars: usize,
    /// Names shorter than this are ignored at session end.
    pub min_name_chars: usize,
}

impl Default for TranscriptSettings {
    fn default() -> Self {
        Self {
            assistant_label: "Джун".to_string(),
            user_label: "Напарник".to_string(),
            trailing_window_chars: 300,
            autosave_interval_ms: 10_000,
            autosave_summary_chars: 2_000,
            final_summary_chars: 1_500,
            min_log_chars: 20,
            min_name_chars: 3,
        }
    }
}

impl TranscriptSettings {
    /// Autosave interval as a [`Duration`].
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MemoryBackend::Memory).unwrap(),
            "\"memory\""
        );
        let parsed: MemoryBackend = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(parsed, MemoryBackend::Sqlite);
    }

    #[test]
    fn memory_enabled_by_default() {
        let settings = MemorySettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.backend, MemoryBackend::Sqlite);
    }

    #[test]
    fn relative_db_path_resolves_against_home() {
        let settings = MemorySettings::default();
        assert_eq!(
            settings.resolved_db_path(Path::new("/home/u/.bridge")),
            PathBuf::from("/home/u/.bridge/memory.db")
        );
        let absolute = MemorySettings {
            db_path: "/var/lib/bridge.db".into(),
            ..MemorySettings::default()
        };
        assert_eq!(
            absolute.resolved_db_path(Path::new("/ignored")),
            PathBuf::from("/var/lib/bridge.db")
        );
    }

    #[test]
    fn autosave_interval_duration() {
        assert_eq!(
            TranscriptSettings::default().autosave_interval(),
            Duration::from_secs(10)
        );
    }
}
