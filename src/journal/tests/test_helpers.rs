//! Deterministic providers and small fixtures shared by the scenario
//! tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::journal::providers::{Clock, NonceSource};
use crate::journal::{JournalGroup, JournalGroupFactory};

/// A clock that advances one millisecond per reading, so every chunk
/// gets a distinct, strictly increasing timestamp.
pub(crate) struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub(crate) fn new() -> Self {
        ManualClock {
            micros: AtomicU64::new(1_700_000_000_000_000),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        let micros = self.micros.fetch_add(1_000, Ordering::AcqRel);
        UNIX_EPOCH + Duration::from_micros(micros)
    }
}

/// Nonces counting up from zero; combined with [`ManualClock`] this
/// pins chunk filenames completely.
pub(crate) struct SequentialNonces {
    next: AtomicU16,
}

impl SequentialNonces {
    pub(crate) fn new() -> Self {
        SequentialNonces {
            next: AtomicU16::new(0),
        }
    }
}

impl NonceSource for SequentialNonces {
    fn next_nonce(&self) -> u16 {
        self.next.fetch_add(1, Ordering::AcqRel) & 0x0fff
    }
}

/// A factory with deterministic providers and the given chunk size
/// budget.
pub(crate) fn deterministic_factory(max_chunk_size: u64) -> JournalGroupFactory {
    JournalGroupFactory::with_config(".log", 0o644, max_chunk_size)
        .with_providers(Arc::new(ManualClock::new()), Arc::new(SequentialNonces::new()))
}

/// Bind a group over `<dir>/j.*.log` with deterministic providers.
pub(crate) fn open_group(
    factory: &JournalGroupFactory,
    dir: &std::path::Path,
    instance: &str,
) -> Arc<JournalGroup> {
    let pattern = format!("{}/j.*.log", dir.display());
    factory
        .get_journal_group(&pattern, instance)
        .unwrap_or_else(|e| panic!("get_journal_group: {e}"))
}

/// Read a chunk handle's file contents as a string.
pub(crate) fn read_handle(handle: &crate::journal::ChunkHandle) -> String {
    use std::io::Read;
    let mut contents = String::new();
    handle
        .reader()
        .unwrap_or_else(|e| panic!("reader: {e}"))
        .read_to_string(&mut contents)
        .unwrap_or_else(|e| panic!("read: {e}"));
    contents
}

/// Chunk file names under `dir`, sorted for stable assertions.
pub(crate) fn chunk_file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("read_dir: {e}"))
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
