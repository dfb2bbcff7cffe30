//! # bridge-agent
//!
//! Bridge server binary. Loads settings, opens the memory store and serves
//! the relay until Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bridge_logging::LogFormat;
use bridge_memory::{InMemoryStore, MemoryStore, SqliteMemoryStore};
use bridge_server::BridgeServer;
use bridge_settings::{BridgeSettings, MemoryBackend, MemorySettings};
use clap::Parser;
use tracing::{info, warn};

/// Live session bridge server.
#[derive(Parser, Debug)]
#[command(name = "bridge-agent", about = "Live session bridge server")]
struct Cli {
    /// Host to bind (overrides settings if specified).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings if specified).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file. Defaults to `~/.bridge/settings.json`.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Path to the `SQLite` memory database.
    #[arg(long)]
    memory_db: Option<PathBuf>,

    /// Run every session without memory.
    #[arg(long)]
    no_memory: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut BridgeSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.memory_db {
            settings.memory.db_path = path.to_string_lossy().into_owned();
        }
        if self.no_memory {
            settings.memory.enabled = false;
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

/// Open the configured memory backend.
///
/// A store that fails to open is logged and the server runs without memory.
fn open_store(memory: &MemorySettings, home: &Path) -> Option<Arc<dyn MemoryStore>> {
    if !memory.enabled {
        info!("memory disabled");
        return None;
    }
    match memory.backend {
        MemoryBackend::Memory => {
            info!("memory kept in process, lost on restart");
            Some(Arc::new(InMemoryStore::new()))
        }
        MemoryBackend::Sqlite => {
            let path = memory.resolved_db_path(home);
            match SqliteMemoryStore::open(&path) {
                Ok(store) => {
                    info!(path = %path.display(), "memory store opened");
                    Some(Arc::new(store))
                }
                Err(error) => {
                    warn!(%error, path = %path.display(), "memory store unavailable, running without memory");
                    None
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(bridge_settings::settings_path);
    let mut settings = bridge_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    cli.apply(&mut settings);

    bridge_logging::init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );
    info!(path = %settings_path.display(), "settings loaded");

    let store = open_store(&settings.memory, &bridge_settings::bridge_home());
    let shutdown_timeout = Duration::from_millis(settings.server.shutdown_timeout_ms);

    let mut server = BridgeServer::new(settings, store);
    match bridge_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(error) => warn!(%error, "metrics recorder not installed"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!("bridge listening on ws://{addr}{}", server.settings().server.ws_path);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("shutting down");

    server.shutdown().graceful_shutdown(shutdown_timeout).await;
    handle.await.context("Server task failed")?;
    info!("shutdown complete");
    Ok(())
}
