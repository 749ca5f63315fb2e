//! Startup discovery of chunk files left behind by a previous run.
//!
//! The scanner reads the directory holding the group's chunk files,
//! decodes every filename that matches `<prefix>…<suffix>`, assembles a
//! per-key chunk list, sorts each list newest-first by the timestamp
//! embedded in the filename, and validates the head invariant. Foreign
//! files in the directory are skipped with a warning; the scan never
//! fails because of them.

use std::collections::HashMap;
use std::fs;

use tracing::warn;

use super::chunk::{Chunk, ChunkList};
use super::error::JournalError;
use super::path::{self, ChunkRole};

/// Scan the directory portion of `path_prefix` and rebuild the chunk
/// list for every key found on disk.
///
/// # Errors
///
/// Fails when the directory cannot be read, when it is not a
/// directory, or when a recovered list violates the head invariant
/// (more than one head chunk, or a head chunk that is not the newest).
pub(crate) fn scan_journals(
    path_prefix: &str,
    path_suffix: &str,
) -> Result<HashMap<String, ChunkList>, JournalError> {
    let (dirname, basename) = split_prefix(path_prefix);

    let metadata = fs::metadata(dirname).map_err(|err| JournalError::Io {
        message: err.to_string(),
        path: Some(dirname.into()),
    })?;
    if !metadata.is_dir() {
        return Err(JournalError::InvalidDirectory {
            path: dirname.into(),
        });
    }

    let mut journals: HashMap<String, ChunkList> = HashMap::new();
    let entries = fs::read_dir(dirname).map_err(|err| JournalError::Io {
        message: err.to_string(),
        path: Some(dirname.into()),
    })?;
    for entry in entries {
        let entry = entry.map_err(|err| JournalError::Io {
            message: err.to_string(),
            path: Some(dirname.into()),
        })?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            warn!("skipping non-UTF-8 file name in journal directory {dirname}");
            continue;
        };
        if !name.ends_with(path_suffix) {
            continue;
        }
        let Some(stem) = name.strip_prefix(basename) else {
            warn!("unexpected file under journal directory {dirname}: {name}");
            continue;
        };
        let Some(variable_portion) = stem.strip_suffix(path_suffix) else {
            continue;
        };
        let info = match path::decode(variable_portion) {
            Ok(info) => info,
            Err(err) => {
                warn!("unexpected file under journal directory {dirname}: {name} ({err})");
                continue;
            }
        };

        let chunk_path = format!("{path_prefix}{}{path_suffix}", info.variable_portion);
        let chunk = Chunk::new(
            chunk_path.into(),
            info.role,
            info.t_suffix,
            info.timestamp,
            info.unique_id,
        );
        // Scan order is arbitrary; the sort below establishes the real
        // order.
        journals
            .entry(info.key)
            .or_default()
            .push_oldest(&chunk);
    }

    for (key, list) in &journals {
        list.sort_by_timestamp();
        validate_chunks(key, list)?;
    }
    Ok(journals)
}

/// Split a path prefix into its directory and the filename fragment
/// chunk names start with.
fn split_prefix(path_prefix: &str) -> (&str, &str) {
    match path_prefix.rfind('/') {
        Some(idx) => (&path_prefix[..=idx], &path_prefix[idx + 1..]),
        None => (".", path_prefix),
    }
}

/// Enforce the head invariant on a recovered list: at most one head
/// chunk, and if present it must be the newest.
fn validate_chunks(key: &str, list: &ChunkList) -> Result<(), JournalError> {
    let head_count = list
        .snapshot_oldest_first()
        .iter()
        .filter(|chunk| chunk.role() == ChunkRole::Head)
        .count();
    if head_count > 1 {
        return Err(JournalError::Invariant {
            message: format!("journal '{key}': multiple head chunks found"),
        });
    }
    if head_count == 1 {
        let newest_is_head = list
            .newest()
            .is_some_and(|newest| newest.role() == ChunkRole::Head);
        if !newest_is_head {
            return Err(JournalError::Invariant {
                message: format!("journal '{key}': head chunk is not the newest"),
            });
        }
    }
    Ok(())
}
