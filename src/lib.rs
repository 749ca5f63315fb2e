//! # File-Backed Journal Core
//!
//! A durable, append-oriented buffer that stages opaque byte records on
//! local disk for later consumption by a downstream forwarder.
//! Producers write records keyed by a logical stream name; the journal
//! rolls writes over into size-bounded *chunks*, notifies listeners as
//! chunks appear and seal, and keeps chunks alive on disk until
//! consumers explicitly release them. On restart, prior chunks are
//! rediscovered from the filesystem and appending resumes on the most
//! recent one.
//!
//! ## Key Pieces
//!
//! - **Chunk lifecycle**: every journal is a newest-to-oldest doubly
//!   linked list of chunks guarded by fine-grained locks. A cascading
//!   refcount protocol ties reclamation to age — a chunk is deleted
//!   only when nothing references it *and* no older chunk survives, so
//!   a consumer holding any chunk implicitly protects the journal's
//!   newer history from reclamation ("no holes").
//! - **Crash-safe naming**: a chunk's role (head vs. sealed) is encoded
//!   as a single marker character in its filename; roll-over seals a
//!   chunk with one rename that preserves its timestamp segment and
//!   unique id. Startup recovery needs nothing but the directory
//!   listing.
//! - **Ownership transfer**: consumers read chunks through refcounted
//!   [`ChunkHandle`]s and may take ownership of a chunk file once,
//!   after which the file's fate is theirs (typically: shipped
//!   downstream, then deleted).
//!
//! ## Example
//!
//! ```rust,no_run
//! use journal_rs::{Journal, JournalGroupFactory};
//!
//! # fn example() -> Result<(), journal_rs::JournalError> {
//! let factory = JournalGroupFactory::new();
//! let group = factory.get_journal_group("/var/spool/fwd/buf.*.log", "forward_out_0")?;
//!
//! let journal = group.get_journal("nginx.access");
//! journal.write(b"192.0.2.1 - GET /index.html\n")?;
//!
//! // A consumer drains the journal from its oldest chunk forward.
//! let mut cursor = journal.tail_chunk();
//! while let Some(handle) = cursor {
//!     let _reader = handle.reader()?;
//!     // ... ship the chunk contents downstream ...
//!     cursor = handle.next_chunk();
//!     handle.take_ownership();
//!     handle.dispose()?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! Writes, roll-over, listener registration, flush, and purge are
//! serialized per journal by the journal mutex. Handle operations
//! touch only the chunk-list mutex, so consumers never block producers
//! except through the deliberate back-pressure of listeners running
//! under the journal mutex.
//!
//! ## Durability
//!
//! Durability is at chunk-seal granularity by OS semantics: there is no
//! fsync-per-write contract. Disposing a group closes writers and
//! leaves every chunk on disk for the next startup scan.

pub mod journal;

pub use journal::{
    ChunkHandle, ChunkListener, ChunkRole, ChunkVisitor, Clock, DEFAULT_FILE_MODE,
    DEFAULT_MAX_CHUNK_SIZE, DEFAULT_PATH_SUFFIX, DecodeError, FileJournal, Journal, JournalError,
    JournalGroup, JournalGroupFactory, NonceSource, PathInfo, RandomNonceSource, SystemClock,
};
