//! File-backed journal implementation.
//!
//! [`FileJournal`] appends opaque record bytes to an open head chunk
//! file and rolls over to a fresh head when the configured size budget
//! would be exceeded. Roll-over seals the prior head with a single
//! rename that flips the role marker in its filename, then notifies
//! flush listeners.
//!
//! # Locking
//!
//! The journal mutex serializes `write`, roll-over, listener
//! registration, `flush`, `purge`, and `dispose`. The chunk list keeps
//! its own mutex for structural updates; handle operations take only
//! that one. Journal mutex before list mutex whenever both are needed.

use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use tracing::{error, trace};

use super::chunk::{Chunk, ChunkList};
use super::error::JournalError;
use super::group::GroupConfig;
use super::handle::ChunkHandle;
use super::journal::{ChunkListener, ChunkVisitor, Journal};
use super::path::{self, ChunkRole};

/// A per-key, file-backed journal of size-bounded chunks.
///
/// Created by `JournalGroup::get_journal` (fresh) or recovered from
/// disk by the startup scan. The journal owns the current writer and
/// the chunk list; consumers interact through [`ChunkHandle`]s.
pub struct FileJournal {
    key: String,
    config: Arc<GroupConfig>,
    chunks: Arc<ChunkList>,
    state: Mutex<JournalState>,
}

struct JournalState {
    /// Open append handle to the current head chunk file.
    writer: Option<File>,
    /// Bytes written to the head since it was created or reopened.
    position: u64,
    new_chunk_listeners: Vec<ChunkListener>,
    flush_listeners: Vec<ChunkListener>,
}

impl FileJournal {
    /// A fresh journal with no chunks, created on first key lookup.
    pub(crate) fn create(key: String, config: Arc<GroupConfig>) -> Self {
        FileJournal {
            key,
            config,
            chunks: Arc::new(ChunkList::new()),
            state: Mutex::new(JournalState {
                writer: None,
                position: 0,
                new_chunk_listeners: Vec::new(),
                flush_listeners: Vec::new(),
            }),
        }
    }

    /// A journal rebuilt from a scanned, sorted, validated chunk list.
    /// The writer is installed separately by [`install_writer`].
    ///
    /// [`install_writer`]: FileJournal::install_writer
    pub(crate) fn recovered(key: String, config: Arc<GroupConfig>, chunks: ChunkList) -> Self {
        FileJournal {
            key,
            config,
            chunks: Arc::new(chunks),
            state: Mutex::new(JournalState {
                writer: None,
                position: 0,
                new_chunk_listeners: Vec::new(),
                flush_listeners: Vec::new(),
            }),
        }
    }

    /// Reopen the newest recovered chunk for appending: seek to its
    /// end, record the resume position, and take the writer's chunk
    /// reference.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError`] if the chunk file cannot be opened or
    /// seeked; the caller disposes the whole group in that case.
    pub(crate) fn install_writer(&self) -> Result<(), JournalError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| JournalError::MutexPoisoned)?;
        let Some(newest) = self.chunks.newest() else {
            return Ok(());
        };
        let chunk_path = newest.path();
        let mut file = OpenOptions::new()
            .append(true)
            .open(&chunk_path)
            .map_err(|err| JournalError::Io {
                message: err.to_string(),
                path: Some(chunk_path.clone()),
            })?;
        let position = file
            .seek(SeekFrom::End(0))
            .map_err(|err| JournalError::Io {
                message: err.to_string(),
                path: Some(chunk_path),
            })?;
        ChunkList::add_ref(&newest);
        state.writer = Some(file);
        state.position = position;
        Ok(())
    }

    /// Reclaim chunks no consumer holds on to.
    ///
    /// Releases the list anchor on the oldest chunk, which cascades
    /// through every unreferenced chunk toward the newest end, then
    /// restores the anchor on the surviving oldest chunk. Idempotent
    /// when no writes happen in between.
    ///
    /// # Errors
    ///
    /// Propagates I/O failures from the cascade.
    pub fn purge(&self) -> Result<(), JournalError> {
        let _state = self
            .state
            .lock()
            .map_err(|_| JournalError::MutexPoisoned)?;
        self.purge_locked()
    }

    /// Purge body; the caller holds the journal mutex.
    fn purge_locked(&self) -> Result<(), JournalError> {
        if let Some(oldest) = self.chunks.oldest() {
            self.chunks.release_ref(&oldest)?;
        }
        // The cascade may have replaced the oldest chunk; re-anchor
        // whichever chunk survived at that end.
        if let Some(oldest) = self.chunks.oldest() {
            ChunkList::add_ref(&oldest);
        }
        Ok(())
    }

    /// Create a fresh head chunk and install it as the write target.
    /// Called under the journal mutex.
    fn new_chunk(&self, state: &mut JournalState) -> Result<(), JournalError> {
        let info = path::encode(
            &self.key,
            ChunkRole::Head,
            self.config.clock.now(),
            self.config.nonces.next_nonce(),
        );
        let chunk_path = self.config.chunk_path(&info.variable_portion);

        let mut options = OpenOptions::new();
        options.append(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(self.config.file_mode);
        }
        let file = options.open(&chunk_path).map_err(|err| JournalError::Io {
            message: err.to_string(),
            path: Some(chunk_path.clone()),
        })?;

        // Dropping the prior writer closes it; the new head file stays
        // on disk either way and the next scan would find it.
        drop(state.writer.take());

        let chunk = Chunk::new(
            chunk_path.clone(),
            ChunkRole::Head,
            info.t_suffix,
            info.timestamp,
            info.unique_id,
        );
        let prior_head = self.chunks.push_newest(&chunk);
        ChunkList::add_ref(&chunk); // the writer's reference

        if let Some(prior) = prior_head {
            if let Err(err) = self.finalize_chunk(state, &prior) {
                drop(file);
                let _ = fs::remove_file(&chunk_path);
                return Err(err);
            }
            // Release the writer's reference on the sealed head.
            if let Err(err) = self.chunks.release_ref(&prior) {
                drop(file);
                let _ = fs::remove_file(&chunk_path);
                return Err(err);
            }
        }

        state.writer = Some(file);
        state.position = 0;
        trace!("journal {} opened new head chunk {}", self.key, chunk_path.display());
        self.notify_listeners(&state.new_chunk_listeners, &chunk, "new-chunk");
        Ok(())
    }

    /// Seal a head chunk: rename it to the Rest-encoded name (the
    /// role marker is the only change; `t_suffix` is preserved), flip
    /// its role, and notify flush listeners.
    fn finalize_chunk(
        &self,
        state: &JournalState,
        chunk: &Arc<Chunk>,
    ) -> Result<(), JournalError> {
        let variable = path::encode_with_t_suffix(&self.key, ChunkRole::Rest, chunk.t_suffix());
        let sealed_path = self.config.chunk_path(&variable);
        let old_path = chunk.path();
        fs::rename(&old_path, &sealed_path).map_err(|err| JournalError::Io {
            message: err.to_string(),
            path: Some(old_path),
        })?;
        chunk.seal(sealed_path);
        self.notify_listeners(&state.flush_listeners, chunk, "flush");
        Ok(())
    }

    /// Invoke listeners under the journal mutex, one fresh handle per
    /// listener. Listener errors are logged and swallowed.
    fn notify_listeners(&self, listeners: &[ChunkListener], chunk: &Arc<Chunk>, event: &str) {
        for listener in listeners {
            ChunkList::add_ref(chunk);
            let handle = ChunkHandle::from_acquired(Arc::clone(&self.chunks), Arc::clone(chunk));
            if let Err(err) = listener(handle) {
                error!(
                    "error notifying {event} listener for journal {}: {err}",
                    self.key
                );
            }
        }
    }

    fn add_listener(listeners: &mut Vec<ChunkListener>, listener: ChunkListener) {
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    #[cfg(test)]
    pub(crate) fn chunk_list(&self) -> &Arc<ChunkList> {
        &self.chunks
    }
}

impl Journal for FileJournal {
    fn key(&self) -> &str {
        &self.key
    }

    fn write(&self, data: &[u8]) -> Result<(), JournalError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| JournalError::MutexPoisoned)?;

        if state.writer.is_none() {
            if !self.chunks.is_empty() {
                return Err(JournalError::WriterClosed);
            }
            self.new_chunk(&mut state)?;
        } else if state.position + data.len() as u64 > self.config.max_chunk_size {
            // Pre-write size check: a record is never split, and an
            // oversized record still gets its own fresh chunk.
            self.new_chunk(&mut state)?;
        }

        let writer = state.writer.as_mut().ok_or(JournalError::WriterClosed)?;
        let written = writer.write(data).map_err(JournalError::from)?;
        if written != data.len() {
            return Err(JournalError::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        state.position += written as u64;
        Ok(())
    }

    fn tail_chunk(&self) -> Option<ChunkHandle> {
        let oldest = self.chunks.acquire_oldest()?;
        Some(ChunkHandle::from_acquired(Arc::clone(&self.chunks), oldest))
    }

    fn add_new_chunk_listener(&self, listener: ChunkListener) {
        if let Ok(mut state) = self.state.lock() {
            Self::add_listener(&mut state.new_chunk_listeners, listener);
        }
    }

    fn add_flush_listener(&self, listener: ChunkListener) {
        if let Ok(mut state) = self.state.lock() {
            Self::add_listener(&mut state.flush_listeners, listener);
        }
    }

    fn flush(&self, visitor: Option<&mut ChunkVisitor<'_>>) -> Result<(), JournalError> {
        let _state = self
            .state
            .lock()
            .map_err(|_| JournalError::MutexPoisoned)?;

        if let Some(visitor) = visitor {
            let snapshot = self.chunks.acquire_all_oldest_first();
            let mut handles = snapshot
                .into_iter()
                .map(|chunk| ChunkHandle::from_acquired(Arc::clone(&self.chunks), chunk));
            while let Some(handle) = handles.next() {
                if let Err(err) = visitor(handle) {
                    // The visitor owns the handles it has seen; the
                    // rest would leak chunk references if kept.
                    for unvisited in handles {
                        if let Err(undo) = unvisited.dispose() {
                            error!(
                                "error disposing unvisited chunk handle for journal {}: {undo}",
                                self.key
                            );
                        }
                    }
                    return Err(err);
                }
            }
        }

        self.purge_locked()
    }

    fn dispose(&self) -> Result<(), JournalError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| JournalError::MutexPoisoned)?;
        // Dropping the writer closes the head chunk file; the chunk
        // itself stays on disk for the next startup scan.
        drop(state.writer.take());
        Ok(())
    }
}

impl std::fmt::Debug for FileJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJournal")
            .field("key", &self.key)
            .field("chunks", &self.chunks.count())
            .finish()
    }
}
