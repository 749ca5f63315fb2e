//! Outward-facing, refcount-holding chunk references.
//!
//! A [`ChunkHandle`] is the only way code outside the journal touches a
//! chunk. It owns exactly one reference on the chunk for as long as its
//! internal slot is populated; [`dispose`](ChunkHandle::dispose) empties
//! the slot exactly once and releases the reference, running the
//! cascading reclamation when it was the last one.
//!
//! Ownership transfer: a consumer that calls
//! [`take_ownership`](ChunkHandle::take_ownership) becomes responsible
//! for the chunk file itself (typically after shipping its contents
//! downstream). The handle's reference is transferred to that
//! responsibility immediately; the later `dispose` only clears the
//! slot and re-anchors the surviving list when the owned chunk was the
//! oldest.

use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

use super::chunk::{Chunk, ChunkList, lock};
use super::error::JournalError;

/// An externally held reference to one chunk of a journal.
///
/// Handles are created by the journal (`tail_chunk`, listener
/// notification, `flush`) or by walking [`next_chunk`] toward the
/// newest end. Every handle must eventually be disposed; dropping a
/// handle without disposing it leaks the chunk reference and pins the
/// chunk (and every newer chunk) on disk.
///
/// # Thread safety
///
/// `dispose` swaps the internal slot exactly once; every other
/// operation reads the slot and fails (or returns `None`) after the
/// swap, so use-after-dispose yields the documented error rather than
/// a race.
///
/// [`next_chunk`]: ChunkHandle::next_chunk
#[derive(Debug)]
pub struct ChunkHandle {
    list: Arc<ChunkList>,
    /// Once-swappable owned reference slot; `None` after dispose.
    slot: Mutex<Option<Arc<Chunk>>>,
    ownership_taken: AtomicBool,
}

impl ChunkHandle {
    /// Wrap a chunk whose reference has already been taken by the
    /// caller (under the list mutex where racing the cascade matters).
    pub(crate) fn from_acquired(list: Arc<ChunkList>, chunk: Arc<Chunk>) -> Self {
        ChunkHandle {
            list,
            slot: Mutex::new(Some(chunk)),
            ownership_taken: AtomicBool::new(false),
        }
    }

    fn chunk(&self) -> Option<Arc<Chunk>> {
        lock(&self.slot).clone()
    }

    /// The chunk's current filename.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::AlreadyDisposed`] after `dispose`.
    pub fn path(&self) -> Result<PathBuf, JournalError> {
        let chunk = self.chunk().ok_or(JournalError::AlreadyDisposed)?;
        Ok(chunk.path())
    }

    /// Open the chunk file read-only.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::AlreadyDisposed`] after `dispose`, or an
    /// I/O error if the file cannot be opened.
    pub fn reader(&self) -> Result<File, JournalError> {
        let chunk = self.chunk().ok_or(JournalError::AlreadyDisposed)?;
        let path = chunk.path();
        File::open(&path).map_err(|err| JournalError::Io {
            message: err.to_string(),
            path: Some(path),
        })
    }

    /// A new handle on the neighbor toward the newest end, or `None`
    /// when this handle is disposed or already at the newest chunk.
    ///
    /// Consumers start at the journal's tail (oldest) chunk and walk
    /// `next_chunk` forward in time.
    #[must_use]
    pub fn next_chunk(&self) -> Option<ChunkHandle> {
        let chunk = self.chunk()?;
        let newer = self.list.acquire_newer_of(&chunk)?;
        Some(ChunkHandle::from_acquired(Arc::clone(&self.list), newer))
    }

    /// Transfer responsibility for the chunk file to the caller.
    ///
    /// Returns `true` exactly once, on the first successful call on a
    /// live handle; the handle's reference is released immediately,
    /// re-homed in the caller's ownership of the file. Later calls, and
    /// calls on a disposed handle, return `false`.
    pub fn take_ownership(&self) -> bool {
        let Some(chunk) = self.chunk() else {
            return false;
        };
        if self
            .ownership_taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Err(err) = self.list.release_ref(&chunk) {
            error!(
                "failed to release chunk reference during ownership transfer: {err}"
            );
        }
        true
    }

    /// Dispose the handle, releasing its chunk reference.
    ///
    /// When ownership had been taken and the chunk is currently the
    /// oldest, the list anchor is re-held on the neighbor toward the
    /// newest end before the final release, so the surviving list keeps
    /// a reference even though ownership transfer consumed the one this
    /// handle held.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::AlreadyDisposed`] on the second and
    /// later calls, or the I/O error of a failed cascade.
    pub fn dispose(&self) -> Result<(), JournalError> {
        let chunk = lock(&self.slot)
            .take()
            .ok_or(JournalError::AlreadyDisposed)?;

        let anchor = if self.ownership_taken.load(Ordering::Acquire) {
            self.list.newer_of_if_oldest(&chunk)
        } else {
            None
        };
        if let Some(anchor) = &anchor {
            ChunkList::add_ref(anchor);
        }

        match self.list.release_ref(&chunk) {
            Ok(destroyed) => {
                if let Some(anchor) = anchor {
                    if !destroyed {
                        // The chunk survived; drop the speculative anchor.
                        self.list.release_ref(&anchor)?;
                    }
                }
                Ok(())
            }
            Err(err) => {
                if let Some(anchor) = anchor {
                    if let Err(undo) = self.list.release_ref(&anchor) {
                        error!("failed to undo anchor reference after dispose error: {undo}");
                    }
                }
                Err(err)
            }
        }
    }
}
