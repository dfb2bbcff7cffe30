//! # bridge-server
//!
//! Axum server that relays browser WebSocket sessions to the upstream
//! generation service.
//!
//! - **Relay**: one task per client owning queueing, handshake ordering,
//!   reconnect-and-replay, transcript extraction and teardown
//! - **Transport**: axum WebSocket split into reader and writer tasks
//! - **Health**: `GET /health` with credential, memory and upstream status
//! - **Metrics**: Prometheus recorder behind `GET /metrics`
//! - **Shutdown**: root cancellation token and a tracker for live sessions

#![deny(unsafe_code)]

pub mod health;
pub mod metrics;
pub mod registry;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use relay::{RelayConfig, RelayDeps, SessionEnd, run_session};
pub use server::BridgeServer;
pub use shutdown::ShutdownCoordinator;
