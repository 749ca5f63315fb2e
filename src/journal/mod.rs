//! File-backed journal core: durable, append-oriented chunk buffering.
//!
//! This module provides the complete chunk lifecycle — per-key
//! journals of size-bounded chunk files, crash-safe naming and
//! roll-over, listener notification, startup recovery, and the
//! cascading refcount protocol that ties chunk reclamation to age.
//!
//! # Types
//!
//! - [`Journal`] — trait implemented by per-key journals
//! - [`FileJournal`] — the file-backed implementation
//! - [`JournalGroup`] / [`JournalGroupFactory`] — directory binding and
//!   startup recovery
//! - [`ChunkHandle`] — refcount-holding chunk reference with
//!   ownership-transfer semantics
//! - [`ChunkRole`] — head (appending) vs. rest (sealed)
//! - [`JournalError`] — error type for all journal operations
//! - [`Clock`] / [`NonceSource`] — injectable providers for the
//!   timestamp and nonce embedded in chunk filenames

pub mod error;
pub mod file_journal;
pub mod group;
pub mod handle;
#[allow(clippy::module_inception)]
pub mod journal;
pub mod path;
pub mod providers;

mod chunk;
mod scanner;
mod tests;

pub use error::JournalError;
pub use file_journal::FileJournal;
pub use group::{
    DEFAULT_FILE_MODE, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_PATH_SUFFIX, JournalGroup,
    JournalGroupFactory,
};
pub use handle::ChunkHandle;
pub use journal::{ChunkListener, ChunkVisitor, Journal};
pub use path::{ChunkRole, DecodeError, PathInfo};
pub use providers::{Clock, NonceSource, RandomNonceSource, SystemClock};
