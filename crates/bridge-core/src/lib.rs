//! # bridge-core
//!
//! Foundation types shared by every bridge crate.
//!
//! - **Ids**: [`SessionId`] newtype for one client session
//! - **Protocol**: classification of client frames, normalization of upstream
//!   messages (camelCase and `snake_case` variants map to one schema), and the
//!   setup-frame instruction splice
//! - **Security**: [`ApiKey`] wrapper that never prints its secret
//! - **Constants**: close codes and well-known keys

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod ids;
pub mod protocol;
pub mod security;

pub use errors::ProtocolError;
pub use ids::SessionId;
pub use protocol::{ClientFrameKind, Frame, UpstreamMessage};
pub use security::ApiKey;
