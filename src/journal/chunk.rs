//! Chunk records and the per-journal chunk list.
//!
//! A [`Chunk`] is a passive record of one on-disk file. Chunks are
//! threaded into a doubly linked, newest-to-oldest [`ChunkList`] whose
//! structure is guarded by the list mutex. Reclamation runs through
//! [`ChunkList::release_ref`], the cascading refcount protocol that
//! ties deletion order to age: a chunk whose refcount reaches zero
//! first releases its claim on the neighbor toward the newest end, so
//! reclamation always proceeds oldest-first and a live handle on any
//! chunk protects every newer chunk from the cascade.
//!
//! # Refcount accounting
//!
//! A linked chunk always carries at least one reference:
//!
//! - it is born with one — the claim held by its older neighbor, or
//!   the list anchor when it is the oldest;
//! - the journal writer holds one more while the chunk is the head;
//! - every live [`ChunkHandle`](super::handle::ChunkHandle) holds one.
//!
//! `purge` restores the anchor on the surviving oldest chunk after a
//! cascade; handle dispose re-holds it when ownership of the oldest
//! chunk was transferred to a consumer.
//!
//! # Lock order
//!
//! Journal mutex → list mutex → per-chunk link/meta mutex. The
//! per-chunk mutexes are leaves: they are never held across I/O or
//! other lock acquisitions.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::error::JournalError;
use super::path::ChunkRole;

/// Lock a leaf mutex, recovering from poisoning.
///
/// The fine-grained chunk and list mutexes guard only plain pointer
/// and metadata updates; a panic while one is held cannot leave a
/// torn value behind, so the poison flag is cleared rather than
/// propagated.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One on-disk chunk file in a journal's history.
#[derive(Debug)]
pub(crate) struct Chunk {
    t_suffix: String,
    timestamp: u64,
    unique_id: [u8; 8],
    /// Path and role change together on the roll-over rename.
    meta: Mutex<ChunkMeta>,
    /// Protocol refcount; crossing zero triggers the cascade.
    refcount: AtomicI32,
    /// Neighbor links, structure guarded by the owning list's mutex.
    links: Mutex<ChunkLinks>,
}

#[derive(Debug)]
struct ChunkMeta {
    path: PathBuf,
    role: ChunkRole,
}

#[derive(Debug, Default)]
struct ChunkLinks {
    /// Neighbor toward the newest end; weak to keep the ownership
    /// chain acyclic.
    newer: Option<Weak<Chunk>>,
    /// Neighbor toward the oldest end; the owning direction.
    older: Option<Arc<Chunk>>,
}

impl Chunk {
    /// A freshly created or freshly scanned chunk starts with refcount
    /// one: the claim of its older neighbor, or the list anchor when it
    /// is the oldest.
    pub(crate) fn new(
        path: PathBuf,
        role: ChunkRole,
        t_suffix: String,
        timestamp: u64,
        unique_id: [u8; 8],
    ) -> Arc<Self> {
        Arc::new(Chunk {
            t_suffix,
            timestamp,
            unique_id,
            meta: Mutex::new(ChunkMeta { path, role }),
            refcount: AtomicI32::new(1),
            links: Mutex::new(ChunkLinks::default()),
        })
    }

    pub(crate) fn path(&self) -> PathBuf {
        lock(&self.meta).path.clone()
    }

    pub(crate) fn role(&self) -> ChunkRole {
        lock(&self.meta).role
    }

    pub(crate) fn t_suffix(&self) -> &str {
        &self.t_suffix
    }

    pub(crate) fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[allow(dead_code)]
    pub(crate) fn unique_id(&self) -> [u8; 8] {
        self.unique_id
    }

    pub(crate) fn refcount(&self) -> i32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Atomically update path and role after the roll-over rename.
    pub(crate) fn seal(&self, new_path: PathBuf) {
        let mut meta = lock(&self.meta);
        meta.path = new_path;
        meta.role = ChunkRole::Rest;
    }

    fn older_link(&self) -> Option<Arc<Chunk>> {
        lock(&self.links).older.clone()
    }

    fn newer_link(&self) -> Option<Arc<Chunk>> {
        lock(&self.links).newer.as_ref().and_then(Weak::upgrade)
    }

    fn set_older(&self, older: Option<Arc<Chunk>>) {
        lock(&self.links).older = older;
    }

    fn set_newer(&self, newer: Option<Weak<Chunk>>) {
        lock(&self.links).newer = newer;
    }
}

/// Doubly linked, newest-to-oldest list of a journal's chunks.
///
/// All structural mutation happens under the list mutex. The mutex is
/// never held across I/O; file removal in [`release_ref`] happens
/// before the unlink re-acquires it.
///
/// [`release_ref`]: ChunkList::release_ref
#[derive(Debug, Default)]
pub(crate) struct ChunkList {
    ends: Mutex<ListEnds>,
}

#[derive(Debug, Default)]
struct ListEnds {
    newest: Option<Arc<Chunk>>,
    oldest: Option<Arc<Chunk>>,
    count: usize,
}

impl ChunkList {
    pub(crate) fn new() -> Self {
        ChunkList::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        lock(&self.ends).count == 0
    }

    pub(crate) fn count(&self) -> usize {
        lock(&self.ends).count
    }

    /// Take one more reference on a chunk known to be alive.
    pub(crate) fn add_ref(chunk: &Arc<Chunk>) {
        chunk.refcount.fetch_add(1, Ordering::AcqRel);
    }

    /// Snapshot the newest chunk.
    pub(crate) fn newest(&self) -> Option<Arc<Chunk>> {
        lock(&self.ends).newest.clone()
    }

    /// Snapshot the oldest chunk.
    pub(crate) fn oldest(&self) -> Option<Arc<Chunk>> {
        lock(&self.ends).oldest.clone()
    }

    /// Snapshot the oldest chunk with a reference already taken, so the
    /// caller can build a handle without racing the cascade.
    pub(crate) fn acquire_oldest(&self) -> Option<Arc<Chunk>> {
        let ends = lock(&self.ends);
        let oldest = ends.oldest.clone()?;
        Self::add_ref(&oldest);
        Some(oldest)
    }

    /// Snapshot the neighbor toward the newest end with a reference
    /// already taken. `None` at the newest end.
    pub(crate) fn acquire_newer_of(&self, chunk: &Arc<Chunk>) -> Option<Arc<Chunk>> {
        let _ends = lock(&self.ends);
        let newer = chunk.newer_link()?;
        Self::add_ref(&newer);
        Some(newer)
    }

    /// The neighbor toward the newest end, but only when `chunk` is
    /// currently the oldest. Used by handle dispose to re-hold the
    /// list anchor before releasing an ownership-taken oldest chunk.
    pub(crate) fn newer_of_if_oldest(&self, chunk: &Arc<Chunk>) -> Option<Arc<Chunk>> {
        let ends = lock(&self.ends);
        match &ends.oldest {
            Some(oldest) if Arc::ptr_eq(oldest, chunk) => chunk.newer_link(),
            _ => None,
        }
    }

    /// Snapshot every chunk oldest-first without touching refcounts.
    /// Startup-only: used for validation before the list is shared.
    pub(crate) fn snapshot_oldest_first(&self) -> Vec<Arc<Chunk>> {
        let ends = lock(&self.ends);
        let mut chunks = Vec::with_capacity(ends.count);
        let mut cursor = ends.oldest.clone();
        while let Some(chunk) = cursor {
            cursor = chunk.newer_link();
            chunks.push(chunk);
        }
        chunks
    }

    /// Snapshot every chunk oldest-first, each with a reference already
    /// taken. Used by `flush` to hand the visitor a stable sequence.
    pub(crate) fn acquire_all_oldest_first(&self) -> Vec<Arc<Chunk>> {
        let ends = lock(&self.ends);
        let mut chunks = Vec::with_capacity(ends.count);
        let mut cursor = ends.oldest.clone();
        while let Some(chunk) = cursor {
            Self::add_ref(&chunk);
            cursor = chunk.newer_link();
            chunks.push(chunk);
        }
        chunks
    }

    /// Link a chunk at the newest end, returning the previous newest
    /// (the head being rolled over, if any).
    pub(crate) fn push_newest(&self, chunk: &Arc<Chunk>) -> Option<Arc<Chunk>> {
        let mut ends = lock(&self.ends);
        let prior = ends.newest.take();
        chunk.set_older(prior.clone());
        chunk.set_newer(None);
        if let Some(prior) = &prior {
            prior.set_newer(Some(Arc::downgrade(chunk)));
        } else {
            ends.oldest = Some(Arc::clone(chunk));
        }
        ends.newest = Some(Arc::clone(chunk));
        ends.count += 1;
        prior
    }

    /// Link a chunk at the oldest end. Scan order is arbitrary; the
    /// startup sort establishes the real order afterwards.
    pub(crate) fn push_oldest(&self, chunk: &Arc<Chunk>) {
        let mut ends = lock(&self.ends);
        let prior = ends.oldest.take();
        chunk.set_newer(prior.as_ref().map(Arc::downgrade));
        chunk.set_older(None);
        if let Some(prior) = &prior {
            prior.set_older(Some(Arc::clone(chunk)));
        } else {
            ends.newest = Some(Arc::clone(chunk));
        }
        ends.oldest = Some(Arc::clone(chunk));
        ends.count += 1;
    }

    /// Release one reference on `chunk`, running the cascading
    /// reclamation protocol when the count reaches zero.
    ///
    /// Returns `Ok(true)` when the chunk was destroyed: its claim on
    /// the newer neighbor released (possibly destroying that neighbor
    /// in turn), its file removed from disk, and the chunk unlinked.
    ///
    /// # Errors
    ///
    /// I/O failures unwind the decrement they made and propagate.
    ///
    /// # Panics
    ///
    /// Panics if the refcount would go negative; that is a logic bug,
    /// not a runtime condition.
    pub(crate) fn release_ref(&self, chunk: &Arc<Chunk>) -> Result<bool, JournalError> {
        let remaining = chunk.refcount.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining > 0 {
            return Ok(false);
        }
        assert!(
            remaining == 0,
            "chunk refcount went negative: {} ({})",
            remaining,
            chunk.path().display()
        );

        // Release this chunk's claim on the surviving chain first.
        if let Some(newer) = chunk.newer_link() {
            if let Err(err) = self.release_ref(&newer) {
                chunk.refcount.fetch_add(1, Ordering::AcqRel);
                return Err(err);
            }
        }

        let path = chunk.path();
        if let Err(err) = fs::remove_file(&path) {
            chunk.refcount.fetch_add(1, Ordering::AcqRel);
            return Err(JournalError::Io {
                message: err.to_string(),
                path: Some(path),
            });
        }

        self.unlink(chunk);
        Ok(true)
    }

    fn unlink(&self, chunk: &Arc<Chunk>) {
        let mut ends = lock(&self.ends);
        let (newer, older) = {
            let mut links = lock(&chunk.links);
            (
                links.newer.take().and_then(|w| w.upgrade()),
                links.older.take(),
            )
        };
        match &newer {
            Some(newer) => newer.set_older(older.clone()),
            None => ends.newest = older.clone(),
        }
        match &older {
            Some(older) => older.set_newer(newer.as_ref().map(Arc::downgrade)),
            None => ends.oldest = newer.clone(),
        }
        ends.count = ends.count.saturating_sub(1);
    }

    /// Stable bottom-up merge sort of the list by timestamp, newest
    /// (largest) first. Runs over the links themselves with doubling
    /// run length; no auxiliary array.
    ///
    /// Startup-only: the list must not be shared yet.
    pub(crate) fn sort_by_timestamp(&self) {
        let mut ends = lock(&self.ends);
        if ends.count < 2 {
            return;
        }

        // Work on a singly linked chain threaded through the `older`
        // links; `newer` backlinks and the ends are rebuilt at the end.
        let mut source = ends.newest.take();
        ends.oldest = None;
        let mut run = 1usize;
        loop {
            let mut merged = MergedChain::default();
            let mut merges = 0usize;
            let mut lhs = source.take();
            while lhs.is_some() {
                merges += 1;
                // Find the right-hand run and the actual left run size.
                let mut rhs = lhs.clone();
                let mut lhs_remaining = 0usize;
                for _ in 0..run {
                    match rhs {
                        Some(node) => {
                            lhs_remaining += 1;
                            rhs = node.older_link();
                        }
                        None => break,
                    }
                }
                let mut rhs_remaining = run;
                while lhs_remaining > 0 || (rhs_remaining > 0 && rhs.is_some()) {
                    let take_rhs = if lhs_remaining == 0 {
                        true
                    } else if rhs_remaining == 0 || rhs.is_none() {
                        false
                    } else {
                        // Strict comparison keeps the sort stable and
                        // orders larger (newer) timestamps first.
                        match (&lhs, &rhs) {
                            (Some(l), Some(r)) => l.timestamp() < r.timestamp(),
                            _ => false,
                        }
                    };
                    let picked = if take_rhs {
                        let node = rhs.take();
                        if let Some(node) = &node {
                            rhs = node.older_link();
                        }
                        rhs_remaining -= 1;
                        node
                    } else {
                        let node = lhs.take();
                        if let Some(node) = &node {
                            lhs = node.older_link();
                        }
                        lhs_remaining -= 1;
                        node
                    };
                    if let Some(node) = picked {
                        merged.push(node);
                    }
                }
                lhs = rhs;
            }
            source = merged.newest.take();
            if merges <= 1 {
                break;
            }
            run *= 2;
        }

        // Rebuild the `newer` backlinks, the ends, and the count.
        let mut count = 0usize;
        let mut newer: Option<Arc<Chunk>> = None;
        let mut cursor = source.clone();
        ends.newest = source;
        while let Some(chunk) = cursor {
            chunk.set_newer(newer.as_ref().map(Arc::downgrade));
            count += 1;
            let older = chunk.older_link();
            if older.is_none() {
                ends.oldest = Some(Arc::clone(&chunk));
            }
            newer = Some(Arc::clone(&chunk));
            cursor = older;
        }
        ends.count = count;
    }
}

impl Drop for ChunkList {
    /// Unthread the `older` ownership chain iteratively so that
    /// dropping a long journal history cannot overflow the stack.
    fn drop(&mut self) {
        let mut cursor = lock(&self.ends).newest.take();
        while let Some(chunk) = cursor {
            cursor = lock(&chunk.links).older.take();
        }
    }
}

/// Accumulator for merge-sorted runs, threaded through `older` links.
#[derive(Default)]
struct MergedChain {
    newest: Option<Arc<Chunk>>,
    oldest: Option<Arc<Chunk>>,
}

impl MergedChain {
    fn push(&mut self, chunk: Arc<Chunk>) {
        chunk.set_older(None);
        match &self.oldest {
            Some(tail) => tail.set_older(Some(Arc::clone(&chunk))),
            None => self.newest = Some(Arc::clone(&chunk)),
        }
        self.oldest = Some(chunk);
    }
}
