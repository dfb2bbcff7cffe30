//! Per-client session relay.
//!
//! One task per client runs [`run_session`]. It owns every piece of session
//! state and is the only code that mutates it; the client socket, the
//! upstream connection, memory recovery and the reconnect loop all talk to it
//! over channels.
//!
//! Client → upstream ordering: the configuration frame first, then content
//! frames in arrival order, and nothing but the configuration frame before the
//! current connection acknowledged readiness.

pub mod keepalive;
pub mod persist;
pub mod queue;
mod session;

use std::sync::Arc;
use std::time::Duration;

use bridge_core::{Frame, SessionId};
use bridge_memory::MemoryStore;
use bridge_settings::{BridgeSettings, TranscriptSettings};
use bridge_upstream::UpstreamDialer;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::metrics::{SESSIONS_ACTIVE, SESSIONS_TOTAL};

/// Something the client transport observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A data frame.
    Frame(Frame),
    /// A pong (or ping) control frame.
    Pong,
    /// The socket closed or failed.
    Closed,
}

/// Instruction for the client transport's writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    /// Write a data frame.
    Frame(Frame),
    /// Send a keep-alive ping.
    Ping,
    /// Send a close frame and stop.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

/// Session tunables, derived once from settings.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Transcript heuristics.
    pub transcript: TranscriptSettings,
    /// Key of the memory record.
    pub memory_key: String,
    /// Fixed delay between upstream reconnect attempts.
    pub reconnect_delay: Duration,
    /// Warn each time the outbound queue grows by this many frames.
    pub queue_warn_threshold: usize,
    /// Interval between client pings.
    pub heartbeat_interval: Duration,
    /// Tear down when nothing was heard from the client for this long.
    pub heartbeat_timeout: Duration,
}

impl RelayConfig {
    /// Extract the relay's view of the settings.
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            transcript: settings.transcript.clone(),
            memory_key: settings.memory.record_key.clone(),
            reconnect_delay: settings.upstream.reconnect_delay(),
            queue_warn_threshold: settings.upstream.queue_warn_threshold,
            heartbeat_interval: settings.server.heartbeat_interval(),
            heartbeat_timeout: settings.server.heartbeat_timeout(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_settings(&BridgeSettings::default())
    }
}

/// Shared collaborators every session needs.
#[derive(Clone)]
pub struct RelayDeps {
    /// Opens upstream connections.
    pub dialer: Arc<dyn UpstreamDialer>,
    /// Memory store; `None` runs the session without memory.
    pub store: Option<Arc<dyn MemoryStore>>,
    /// Tunables.
    pub config: Arc<RelayConfig>,
}

/// The relay's end of the client transport.
#[derive(Debug)]
pub struct ClientChannel {
    /// Inbound events from the client.
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
    /// Outbound commands to the client.
    pub commands: mpsc::UnboundedSender<ClientCommand>,
}

impl ClientChannel {
    /// A channel pair: the relay's end, plus the transport's sender and receiver.
    pub fn pair() -> (
        Self,
        mpsc::UnboundedSender<ClientEvent>,
        mpsc::UnboundedReceiver<ClientCommand>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (
            Self {
                events: event_rx,
                commands: command_tx,
            },
            event_tx,
            command_rx,
        )
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away.
    ClientClosed,
    /// The client stopped answering pings.
    KeepAliveTimeout,
    /// The first upstream connection could not be opened.
    UpstreamUnavailable,
    /// The server is shutting down.
    Shutdown,
}

impl SessionEnd {
    /// Short name for logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::KeepAliveTimeout => "keepalive_timeout",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Run one client session to completion.
///
/// Returns after final persistence has been written and the upstream
/// connection closed. `shutdown` is the server's root token; the session
/// works under a child of it.
#[instrument(skip_all, fields(session_id = %id))]
pub async fn run_session(
    id: SessionId,
    client: ClientChannel,
    deps: RelayDeps,
    shutdown: CancellationToken,
) -> SessionEnd {
    counter!(SESSIONS_TOTAL).increment(1);
    gauge!(SESSIONS_ACTIVE).increment(1.0);
    info!("session started");

    let end = session::drive(client, deps, shutdown.child_token()).await;

    gauge!(SESSIONS_ACTIVE).decrement(1.0);
    info!(reason = end.as_str(), "session ended");
    end
}
