//! Append-oriented journal trait and listener types.
//!
//! The [`Journal`] trait defines the contract between record producers,
//! chunk consumers, and a per-key journal. Producers append opaque
//! record bytes with [`write`](Journal::write); consumers start at
//! [`tail_chunk`](Journal::tail_chunk) (the oldest chunk) and walk
//! handles toward the newest end, taking ownership of chunk files as
//! they ship them downstream.
//!
//! See `FileJournal` (in the `file_journal` module) for the file-backed
//! implementation.

use std::sync::Arc;

use super::error::JournalError;
use super::handle::ChunkHandle;

/// Callback invoked with a fresh [`ChunkHandle`] when a chunk event
/// fires (a new head chunk appears, or a head chunk is sealed).
///
/// The listener owns the handle it receives and must dispose it or
/// hand it on. Listener identity is the `Arc` allocation: registering
/// a clone of an already-registered listener collapses into a single
/// subscription, while two separately created `Arc`s of the same
/// closure count as distinct listeners.
pub type ChunkListener = Arc<dyn Fn(ChunkHandle) -> Result<(), JournalError> + Send + Sync>;

/// Visitor invoked by [`Journal::flush`] for every chunk, oldest first.
///
/// Each invocation owns the handle it receives. The first error aborts
/// the flush and propagates to the caller.
pub type ChunkVisitor<'a> = dyn FnMut(ChunkHandle) -> Result<(), JournalError> + 'a;

/// A per-key, append-oriented journal of size-bounded chunks.
///
/// # Ordering
///
/// Within one journal, `write` calls are strictly serialized; the byte
/// order on disk equals the order in which writes acquired the journal
/// mutex. Flush listeners observe sealed chunks in seal order,
/// new-chunk listeners observe heads in creation order.
///
/// # Back-pressure
///
/// Listeners run while the journal mutex is held: a slow listener
/// deliberately stalls producers on the same journal.
pub trait Journal: Send + Sync {
    /// The logical stream key this journal stores.
    fn key(&self) -> &str;

    /// Append one record to the current head chunk, rolling over to a
    /// fresh chunk first when the configured size budget would be
    /// exceeded. A single record is never split across chunks; a
    /// record larger than the budget still lands alone in a fresh
    /// chunk.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] on I/O failure, short write, or when
    /// the journal has been disposed.
    fn write(&self, data: &[u8]) -> Result<(), JournalError>;

    /// A handle on the oldest chunk — the consumer's starting point —
    /// or `None` when the journal has no chunks.
    #[must_use]
    fn tail_chunk(&self) -> Option<ChunkHandle>;

    /// Register a listener notified for every new head chunk.
    /// Duplicate registrations of the same listener collapse.
    fn add_new_chunk_listener(&self, listener: ChunkListener);

    /// Register a listener notified whenever a head chunk is sealed.
    /// Duplicate registrations of the same listener collapse.
    fn add_flush_listener(&self, listener: ChunkListener);

    /// Visit every chunk oldest-first (when a visitor is given), then
    /// purge chunks no consumer holds on to.
    ///
    /// # Errors
    ///
    /// The first visitor error aborts the flush (skipping the purge)
    /// and propagates.
    fn flush(&self, visitor: Option<&mut ChunkVisitor<'_>>) -> Result<(), JournalError>;

    /// Close the journal's writer. Chunks remain on disk for the next
    /// startup scan.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if internal state is unavailable.
    fn dispose(&self) -> Result<(), JournalError>;
}
