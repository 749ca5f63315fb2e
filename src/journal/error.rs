//! Error types for the journal subsystem.
//!
//! [`JournalError`] covers all failure modes of the file-backed journal:
//! I/O errors, short writes, handle misuse, and directory binding
//! conflicts. Invariant violations that indicate logic bugs (a chunk
//! refcount going negative) panic instead of returning an error.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur within the journal subsystem.
#[derive(Debug)]
#[non_exhaustive]
pub enum JournalError {
    /// An I/O error occurred while reading or writing journal files.
    Io {
        /// The underlying I/O error message.
        message: String,
        /// The file path involved, if known.
        path: Option<PathBuf>,
    },

    /// A write to the current head chunk returned fewer bytes than
    /// requested.
    ShortWrite {
        /// The number of bytes actually written.
        written: usize,
        /// The number of bytes that were requested.
        expected: usize,
    },

    /// A chunk handle was used after it was disposed.
    AlreadyDisposed,

    /// A write was attempted on a journal whose writer has been closed
    /// by [`dispose`](crate::journal::journal::Journal::dispose).
    WriterClosed,

    /// The journal path is already bound by a different plugin instance.
    BindingConflict {
        /// The contested journal path pattern.
        path: String,
        /// The plugin instance that currently holds the binding.
        existing_instance: String,
    },

    /// The directory portion of the journal path prefix does not exist
    /// or is not a directory.
    InvalidDirectory {
        /// The path that was expected to be a valid directory.
        path: PathBuf,
    },

    /// On-disk chunk state violates a structural invariant (multiple
    /// head chunks, or a head chunk that is not the newest).
    Invariant {
        /// Description of the violated invariant.
        message: String,
    },

    /// An internal mutex was poisoned (another thread panicked while
    /// holding the lock).
    MutexPoisoned,
}

impl fmt::Display for JournalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JournalError::Io { message, path } => {
                if let Some(p) = path {
                    write!(f, "journal I/O error at {}: {message}", p.display())
                } else {
                    write!(f, "journal I/O error: {message}")
                }
            }
            JournalError::ShortWrite { written, expected } => {
                write!(
                    f,
                    "short write to journal chunk: {written} of {expected} bytes written"
                )
            }
            JournalError::AlreadyDisposed => {
                write!(f, "chunk handle already disposed")
            }
            JournalError::WriterClosed => {
                write!(f, "journal writer is closed")
            }
            JournalError::BindingConflict {
                path,
                existing_instance,
            } => {
                write!(
                    f,
                    "journal path {path} is already bound by plugin instance \
                     '{existing_instance}'"
                )
            }
            JournalError::InvalidDirectory { path } => {
                write!(f, "invalid journal directory: {}", path.display())
            }
            JournalError::Invariant { message } => {
                write!(f, "journal invariant violated: {message}")
            }
            JournalError::MutexPoisoned => {
                write!(f, "journal internal mutex poisoned")
            }
        }
    }
}

impl std::error::Error for JournalError {}

impl From<std::io::Error> for JournalError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        JournalError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}
