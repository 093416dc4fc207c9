//! # LunaDB
//!
//! An embeddable, single-file, **log-structured** key-value store: an
//! append-only binary log paired with an in-memory index, supporting point
//! lookups, writes, deletes and compaction by atomic file replacement.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lunadb::{Db, StoreConfig};
//!
//! let db = Db::open(StoreConfig::with_path("/tmp/tasks.db")).unwrap();
//!
//! // Write
//! db.put(b"task-1", b"{\"title\":\"write docs\"}").unwrap();
//!
//! // Read
//! assert!(db.get(b"task-1").unwrap().is_some());
//!
//! // Delete (persisted as a tombstone)
//! db.delete(b"task-1").unwrap();
//! assert_eq!(db.get(b"task-1").unwrap(), None);
//!
//! // Graceful shutdown compacts the log
//! db.close().unwrap();
//! ```
//!
//! ## Layers
//!
//! - [`record`]: binary record framing.
//! - [`logfile`]: the append-only file and its atomic replacement.
//! - [`index`]: live key/value state rebuilt by replay.
//! - [`store`]: the single-writer [`Store`] orchestrating all of the above.
//! - [`Db`]: a thread-safe handle that funnels every mutation through one
//!   writer thread and serves reads straight from the index.
//!
//! ## On-disk format
//!
//! One file, no header, no checksum: a concatenation of
//! `[tombstone u8][key_len u32 BE][key][value_len u32 BE][value]` records.

pub mod encoding;
pub mod index;
pub mod logfile;
pub mod record;
pub mod store;

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, error, info};

pub use index::Index;
pub use record::Record;
pub use store::{
    CompactionStats, LoadStats, Store, StoreConfig, StoreError, StoreReader, StoreState,
    StoreStats,
};

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Db`] operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The database has been closed.
    #[error("database is closed")]
    Closed,

    /// A store-level error occurred.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The writer thread stopped unexpectedly.
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Writer thread
// ------------------------------------------------------------------------------------------------

type Reply<T> = Sender<Result<T, StoreError>>;

/// A mutation queued for the writer thread.
enum Command {
    Put {
        key: Vec<u8>,
        value: Vec<u8>,
        reply: Reply<()>,
    },
    Delete {
        key: Vec<u8>,
        reply: Reply<()>,
    },
    Compact {
        reply: Reply<Option<CompactionStats>>,
    },
}

/// Holds the command sender and the writer's join handle.
/// Taken (`Option::take`) on shutdown to ensure single cleanup.
struct Writer {
    sender: Sender<Command>,
    handle: thread::JoinHandle<Result<(), StoreError>>,
}

/// Body of the writer thread: owns the store, applies commands in arrival
/// order and compacts once the queue is closed.
fn run_writer(mut store: Store, commands: Receiver<Command>) -> Result<(), StoreError> {
    while let Ok(command) = commands.recv() {
        // The receiver is only gone if the submitting thread unwound.
        match command {
            Command::Put { key, value, reply } => {
                let _ = reply.send(store.put(&key, &value));
            }
            Command::Delete { key, reply } => {
                let _ = reply.send(store.del(&key));
            }
            Command::Compact { reply } => {
                let _ = reply.send(store.compact());
            }
        }
    }

    debug!("writer queue drained");
    if store.config().compact_on_close {
        store.compact()?;
    }
    Ok(())
}

// ------------------------------------------------------------------------------------------------
// Database handle
// ------------------------------------------------------------------------------------------------

/// Thread-safe handle to a [`Store`].
///
/// # Thread safety
///
/// `Db` is `Send + Sync` and can be shared across threads via `Arc<Db>`.
/// Mutations (`put`, `delete`, `compact`) are queued to a single writer
/// thread and applied one at a time in arrival order; each call blocks
/// until its own mutation is durable in the log (or failed). Reads (`get`,
/// `list_all`) go straight to the shared index and never wait behind the
/// queue.
///
/// # Shutdown
///
/// Call [`Db::close`] for a graceful shutdown: the queue is drained, the
/// log is compacted (if [`StoreConfig::compact_on_close`] is set) and the
/// writer thread is joined. If the handle is dropped without calling
/// `close`, the destructor does the same but ignores errors.
pub struct Db {
    reader: StoreReader,
    path: PathBuf,
    writer: Mutex<Option<Writer>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Opens the store described by `config` and replays its log.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidConfig`] for an invalid configuration.
    /// - [`StoreError::CorruptRecord`] if the log holds a bad record; the
    ///   host should treat this as fatal.
    /// - [`StoreError::Io`] if the log cannot be read or the writer thread
    ///   cannot be spawned.
    pub fn open(config: StoreConfig) -> Result<Self, DbError> {
        let path = config.path.clone();
        let mut store = Store::with_config(config)?;
        let stats = store.load()?;
        let reader = store.reader();

        let (sender, receiver) = channel::unbounded::<Command>();
        let handle = thread::Builder::new()
            .name("lunadb-writer".into())
            .spawn(move || run_writer(store, receiver))
            .map_err(StoreError::Io)?;

        info!(path = %path.display(), live_keys = stats.live_keys, "database opened");

        Ok(Self {
            reader,
            path,
            writer: Mutex::new(Some(Writer { sender, handle })),
            closed: AtomicBool::new(false),
        })
    }

    /// Opens the store at `path` with default settings.
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self, DbError> {
        Self::open(StoreConfig::with_path(path))
    }

    /// Drains pending mutations, compacts if configured, and stops the
    /// writer thread.
    ///
    /// Subsequent operations on this handle return [`DbError::Closed`].
    /// Calling `close` more than once is harmless.
    pub fn close(&self) -> Result<(), DbError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(()); // Already closed.
        }

        self.shutdown_writer()?;
        info!(path = %self.path.display(), "database closed");
        Ok(())
    }

    // --------------------------------------------------------------------------------------------
    // Write operations
    // --------------------------------------------------------------------------------------------

    /// Inserts or overwrites `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), DbError> {
        self.submit(|reply| Command::Put {
            key: key.to_vec(),
            value: value.to_vec(),
            reply,
        })
    }

    /// Deletes `key`. The delete is persisted as a tombstone.
    pub fn delete(&self, key: &[u8]) -> Result<(), DbError> {
        self.submit(|reply| Command::Delete {
            key: key.to_vec(),
            reply,
        })
    }

    /// Compacts the log now. Returns `None` if there is no log yet.
    pub fn compact(&self) -> Result<Option<CompactionStats>, DbError> {
        self.submit(|reply| Command::Compact { reply })
    }

    // --------------------------------------------------------------------------------------------
    // Read operations
    // --------------------------------------------------------------------------------------------

    /// Returns the live value of `key`, or `Ok(None)`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, DbError> {
        self.check_open()?;
        Ok(self.reader.get(key))
    }

    /// Returns every live value.
    pub fn list_all(&self) -> Result<Vec<Vec<u8>>, DbError> {
        self.check_open()?;
        Ok(self.reader.list_all())
    }

    /// Returns `true` if `key` is live.
    pub fn contains_key(&self, key: &[u8]) -> Result<bool, DbError> {
        self.check_open()?;
        Ok(self.reader.contains_key(key))
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize, DbError> {
        self.check_open()?;
        Ok(self.reader.len())
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> Result<bool, DbError> {
        self.check_open()?;
        Ok(self.reader.is_empty())
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // --------------------------------------------------------------------------------------------
    // Internal helpers
    // --------------------------------------------------------------------------------------------

    /// Returns `Err(DbError::Closed)` if the database has been closed.
    fn check_open(&self) -> Result<(), DbError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DbError::Closed);
        }
        Ok(())
    }

    /// Queues a command built around a fresh reply channel and waits for
    /// the writer's answer.
    fn submit<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, DbError> {
        self.check_open()?;

        let sender = {
            let guard = self
                .writer
                .lock()
                .map_err(|_| DbError::Internal("writer mutex poisoned".into()))?;
            match guard.as_ref() {
                Some(writer) => writer.sender.clone(),
                None => return Err(DbError::Closed),
            }
        };

        let (reply_tx, reply_rx) = channel::bounded(1);
        sender
            .send(build(reply_tx))
            .map_err(|_| DbError::Closed)?;
        drop(sender);

        let result = reply_rx
            .recv()
            .map_err(|_| DbError::Internal("writer thread terminated".into()))?;
        Ok(result?)
    }

    /// Closes the command queue and joins the writer thread.
    fn shutdown_writer(&self) -> Result<(), DbError> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| DbError::Internal("writer mutex poisoned".into()))?
            .take();

        if let Some(Writer { sender, handle }) = writer {
            // Drop sender → writer drains remaining commands then exits.
            drop(sender);
            match handle.join() {
                Ok(result) => result?,
                Err(_) => return Err(DbError::Internal("writer thread panicked".into())),
            }
        }
        Ok(())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            if let Err(e) = self.shutdown_writer() {
                error!("shutdown on drop failed: {e}");
            }
        }
    }
}
