//! # bridge-transcript
//!
//! Turns the text flowing through a session into memory updates.
//!
//! The [`TranscriptExtractor`] keeps the session's conversation log and, for
//! each piece of assistant text, returns the [`MemoryMutation`]s it implies:
//! a newly confirmed name, a newly confirmed correction rule, a periodic
//! summary autosave, or a full wipe. At session end it produces one final
//! merge. Applying mutations to a store is the caller's job.

#![deny(unsafe_code)]

pub mod extractor;
pub mod log;
pub mod mutation;
pub mod patterns;

pub use extractor::TranscriptExtractor;
pub use log::ConversationLog;
pub use mutation::MemoryMutation;
