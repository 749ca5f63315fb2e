//! Journal groups and the path-binding factory.
//!
//! A [`JournalGroup`] owns every journal sharing one directory prefix,
//! suffix, and size budget. The [`JournalGroupFactory`] is the
//! long-lived registry that binds a path pattern to the plugin
//! instance that first claimed it, runs the startup scan, and reopens
//! recovered journals for appending.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{error, info};

use super::chunk::ChunkList;
use super::error::JournalError;
use super::file_journal::FileJournal;
use super::providers::{Clock, NonceSource, RandomNonceSource, SystemClock};
use super::scanner;

/// Default chunk filename suffix when the path pattern has no `*`.
pub const DEFAULT_PATH_SUFFIX: &str = ".log";

/// Default permission bits for freshly created chunk files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default per-chunk size budget in bytes.
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 8 * 1024 * 1024;

/// Configuration shared by every journal in a group.
pub(crate) struct GroupConfig {
    pub(crate) path_prefix: String,
    pub(crate) path_suffix: String,
    pub(crate) file_mode: u32,
    pub(crate) max_chunk_size: u64,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) nonces: Arc<dyn NonceSource>,
}

impl GroupConfig {
    /// Full chunk path for a variable filename portion.
    pub(crate) fn chunk_path(&self, variable_portion: &str) -> std::path::PathBuf {
        std::path::PathBuf::from(format!(
            "{}{variable_portion}{}",
            self.path_prefix, self.path_suffix
        ))
    }
}

/// The set of journals sharing one directory prefix and suffix.
pub struct JournalGroup {
    plugin_instance: String,
    config: Arc<GroupConfig>,
    journals: Mutex<HashMap<String, Arc<FileJournal>>>,
}

impl JournalGroup {
    fn from_scan(
        plugin_instance: String,
        config: Arc<GroupConfig>,
        lists: HashMap<String, ChunkList>,
    ) -> Result<Self, JournalError> {
        let mut journals = HashMap::with_capacity(lists.len());
        for (key, list) in lists {
            let journal = Arc::new(FileJournal::recovered(
                key.clone(),
                Arc::clone(&config),
                list,
            ));
            journals.insert(key, journal);
        }
        let group = JournalGroup {
            plugin_instance,
            config,
            journals: Mutex::new(journals),
        };
        // Reopen every recovered journal for appending. A single
        // failure abandons the whole group.
        let recovered: Vec<Arc<FileJournal>> = group.journal_snapshot();
        for journal in recovered {
            if let Err(err) = journal.install_writer() {
                if let Err(dispose_err) = group.dispose() {
                    error!("error disposing partially opened journal group: {dispose_err}");
                }
                return Err(err);
            }
        }
        Ok(group)
    }

    fn journal_snapshot(&self) -> Vec<Arc<FileJournal>> {
        self.journals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// The journal for `key`, created empty on first lookup.
    pub fn get_journal(&self, key: &str) -> Arc<FileJournal> {
        let mut journals = self
            .journals
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(journal) = journals.get(key) {
            return Arc::clone(journal);
        }
        let journal = Arc::new(FileJournal::create(
            key.to_string(),
            Arc::clone(&self.config),
        ));
        journals.insert(key.to_string(), Arc::clone(&journal));
        journal
    }

    /// Snapshot of the keys with a journal in this group.
    #[must_use]
    pub fn get_journal_keys(&self) -> Vec<String> {
        self.journals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Dispose every journal: writers are closed, chunks stay on disk.
    ///
    /// # Errors
    ///
    /// Returns the first journal dispose error; the remaining journals
    /// are still disposed (failures logged).
    pub fn dispose(&self) -> Result<(), JournalError> {
        use super::journal::Journal;

        let mut first_error = None;
        for journal in self.journal_snapshot() {
            if let Err(err) = journal.dispose() {
                error!("error disposing journal '{}': {err}", journal.key());
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for JournalGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalGroup")
            .field("plugin_instance", &self.plugin_instance)
            .field("path_prefix", &self.config.path_prefix)
            .field("path_suffix", &self.config.path_suffix)
            .finish()
    }
}

/// Registry of journal groups keyed by their path pattern.
///
/// Each path pattern can be bound by exactly one plugin instance; a
/// second instance asking for the same path gets a
/// [`JournalError::BindingConflict`] naming the current binder. The
/// registry is an ordinary long-lived value — share it explicitly
/// (e.g. in an `Arc`) rather than through process-wide state.
pub struct JournalGroupFactory {
    default_path_suffix: String,
    default_file_mode: u32,
    max_chunk_size: u64,
    clock: Arc<dyn Clock>,
    nonces: Arc<dyn NonceSource>,
    groups: Mutex<HashMap<String, Arc<JournalGroup>>>,
}

impl JournalGroupFactory {
    /// A factory with the default suffix, file mode, and size budget.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_PATH_SUFFIX, DEFAULT_FILE_MODE, DEFAULT_MAX_CHUNK_SIZE)
    }

    /// A factory with explicit defaults.
    #[must_use]
    pub fn with_config(
        default_path_suffix: impl Into<String>,
        default_file_mode: u32,
        max_chunk_size: u64,
    ) -> Self {
        JournalGroupFactory {
            default_path_suffix: default_path_suffix.into(),
            default_file_mode,
            max_chunk_size,
            clock: Arc::new(SystemClock),
            nonces: Arc::new(RandomNonceSource),
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the clock and nonce providers (deterministic tests).
    #[must_use]
    pub fn with_providers(
        mut self,
        clock: Arc<dyn Clock>,
        nonces: Arc<dyn NonceSource>,
    ) -> Self {
        self.clock = clock;
        self.nonces = nonces;
        self
    }

    /// The journal group for `path`, bound to `plugin_instance`.
    ///
    /// `path` splits at its first `*` into `(prefix, suffix)`; without
    /// a `*` the prefix is `path + "."` and the suffix is the factory
    /// default. The first call for a path scans the directory, rebuilds
    /// the journals found there, and reopens their newest chunks for
    /// appending; later calls by the same instance return the
    /// registered group.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::BindingConflict`] when a different
    /// plugin instance already bound the path, or any scan/reopen
    /// failure (the partially opened group is disposed first).
    pub fn get_journal_group(
        &self,
        path: &str,
        plugin_instance: &str,
    ) -> Result<Arc<JournalGroup>, JournalError> {
        let mut groups = self
            .groups
            .lock()
            .map_err(|_| JournalError::MutexPoisoned)?;

        if let Some(registered) = groups.get(path) {
            if registered.plugin_instance == plugin_instance {
                return Ok(Arc::clone(registered));
            }
            return Err(JournalError::BindingConflict {
                path: path.to_string(),
                existing_instance: registered.plugin_instance.clone(),
            });
        }

        let (path_prefix, path_suffix) = match path.split_once('*') {
            Some((prefix, suffix)) => (prefix.to_string(), suffix.to_string()),
            None => (format!("{path}."), self.default_path_suffix.clone()),
        };

        let lists = scanner::scan_journals(&path_prefix, &path_suffix)?;
        let config = Arc::new(GroupConfig {
            path_prefix,
            path_suffix,
            file_mode: self.default_file_mode,
            max_chunk_size: self.max_chunk_size,
            clock: Arc::clone(&self.clock),
            nonces: Arc::clone(&self.nonces),
        });
        let group = Arc::new(JournalGroup::from_scan(
            plugin_instance.to_string(),
            config,
            lists,
        )?);

        info!("journal path {path} bound to plugin instance '{plugin_instance}'");
        groups.insert(path.to_string(), Arc::clone(&group));
        Ok(group)
    }
}

impl Default for JournalGroupFactory {
    fn default() -> Self {
        Self::new()
    }
}
