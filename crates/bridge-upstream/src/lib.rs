//! # bridge-upstream
//!
//! The session's outbound connection to the generation service.
//!
//! - [`UpstreamDialer`]: opens one connection. [`WebSocketDialer`] is the
//!   production implementation over `tokio-tungstenite`.
//! - [`UpstreamHandle`]: the write side of an open connection, tagged with its
//!   epoch. Inbound frames and the final close arrive as [`UpstreamEvent`]s on
//!   the channel passed to the dialer.
//! - [`Connector`]: epoch allocation, the single initial attempt, and the
//!   fixed-delay reconnect loop.

#![deny(unsafe_code)]

pub mod connector;
pub mod dialer;
pub mod errors;
pub mod link;

pub use connector::Connector;
pub use dialer::{UpstreamDialer, WebSocketDialer};
pub use errors::{Result, UpstreamError};
pub use link::{UpstreamCommand, UpstreamEvent, UpstreamHandle};
