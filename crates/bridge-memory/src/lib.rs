//! # bridge-memory
//!
//! Cross-session memory for the live session bridge: one global record
//! (`summary`, `userName`, `rules`, `updatedAt`) read at session setup and
//! updated as the conversation goes.
//!
//! - [`MemoryStore`]: async, fallible `get` / `set` / `append_to_set`
//! - [`SqliteMemoryStore`]: file-backed store with atomic per-key merge/append
//! - [`InMemoryStore`]: process-local store
//! - [`recall`]: turns a record into the instruction clause spliced into the
//!   session's setup frame
//!
//! Memory is fail-silent from the relay's point of view: every error is
//! returned to the caller, which logs it and carries on without memory.

#![deny(unsafe_code)]

pub mod database;
pub mod errors;
pub mod recall;
pub mod schema;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{MemoryError, Result};
pub use recall::{Recovered, recall_clause, recover};
pub use sqlite::SqliteMemoryStore;
pub use store::{InMemoryStore, MemoryStore};
pub use types::{MemoryPatch, MemoryRecord, SetField};
