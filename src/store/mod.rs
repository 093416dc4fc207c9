//! # Store
//!
//! The [`Store`] ties the [`LogFile`] and the [`Index`] together and is the
//! only component callers interact with.
//!
//! ## Control flow
//!
//! - [`Store::load`] reads the whole log once and replays every record in
//!   file order into a fresh index.
//! - [`Store::put`] / [`Store::del`] append a record to the log, then update
//!   the index. The index is only touched after the append succeeded, so the
//!   on-disk log is always the source of truth.
//! - [`Store::get`] / [`Store::list_all`] read the index only.
//! - [`Store::compact`] writes one live record per key into a temp file and
//!   atomically renames it over the log.
//!
//! ## Lifecycle
//!
//! A store starts [`StoreState::Unloaded`]. `load` moves it to
//! [`StoreState::Loaded`]; mutations are rejected before that with
//! [`StoreError::NotLoaded`]. Calling `load` again re-replays the file,
//! which is deterministic and therefore safe.
//!
//! ## Concurrency
//!
//! A `Store` is single-writer: all mutating methods take `&mut self`, so
//! the borrow checker serializes them. Readers on other threads go through
//! a [`StoreReader`], which shares the index behind an `RwLock` and never
//! touches the log. For a handle that serializes writers from many threads
//! see [`Db`](crate::Db).

#[cfg(test)]
mod tests;

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::encoding::EncodingError;
use crate::index::Index;
use crate::logfile::{LogFile, LogFileError};
use crate::record::{self, RecordError, RecordIter};

/// Log file name used when no path is configured.
pub const DEFAULT_PATH: &str = "data.db";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Store`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record in the log is truncated or malformed.
    ///
    /// Returned by [`Store::load`]; the in-memory state is left unchanged. This usually
    /// means an append was interrupted and needs operator attention (for
    /// example truncating the log at `offset`).
    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord {
        /// Byte offset of the start of the bad record.
        offset: usize,
        /// What was wrong with it.
        reason: EncodingError,
    },

    /// Underlying file read, write or rename failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Key or value cannot be represented in the log format.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A mutation was issued before [`Store::load`].
    #[error("store is not loaded")]
    NotLoaded,

    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl From<LogFileError> for StoreError {
    fn from(e: LogFileError) -> Self {
        match e {
            LogFileError::Io(e) => StoreError::Io(e),
            torn @ LogFileError::TornTail(_) => StoreError::Io(io::Error::other(torn.to_string())),
        }
    }
}

impl From<RecordError> for StoreError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Corrupt { offset, reason } => StoreError::CorruptRecord { offset, reason },
            RecordError::TooLarge(msg) => StoreError::InvariantViolation(msg),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Configuration for a [`Store`].
///
/// # Example
///
/// ```rust
/// use lunadb::StoreConfig;
///
/// let config = StoreConfig {
///     sync_appends: true,
///     ..StoreConfig::with_path("/tmp/tasks.db")
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path of the log file.
    ///
    /// Default: `data.db` in the working directory.
    pub path: PathBuf,

    /// `fsync` every append before returning.
    ///
    /// Default: `false`.
    pub sync_appends: bool,

    /// `fsync` the compaction temp file before the rename and the
    /// containing directory after it.
    ///
    /// Default: `true`.
    pub sync_on_compact: bool,

    /// Compact the log when a [`Db`](crate::Db) is closed.
    ///
    /// Default: `true`.
    pub compact_on_close: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            sync_appends: false,
            sync_on_compact: true,
            compact_on_close: true,
        }
    }
}

impl StoreConfig {
    /// Default configuration with the log at `path`.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig("path must not be empty".into()));
        }
        if self.path.is_dir() {
            return Err(StoreError::InvalidConfig(format!(
                "path {} is a directory",
                self.path.display()
            )));
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Stats
// ------------------------------------------------------------------------------------------------

/// Lifecycle state of a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Constructed, log not yet replayed.
    Unloaded,
    /// Log replayed; all operations available.
    Loaded,
}

/// Summary of one [`Store::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Records replayed, tombstones included.
    pub records: u64,
    /// Tombstone records replayed.
    pub tombstones: u64,
    /// Size of the log in bytes.
    pub bytes: u64,
    /// Live keys after replay.
    pub live_keys: usize,
}

/// Summary of one [`Store::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Records in the compacted log.
    pub live_keys: usize,
}

/// Point-in-time view of a [`Store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Current lifecycle state.
    pub state: StoreState,
    /// Live keys in the index.
    pub live_keys: usize,
    /// Sum of live key and value lengths.
    pub approximate_size: usize,
    /// Current log size in bytes.
    pub log_bytes: u64,
}

// ------------------------------------------------------------------------------------------------
// Shared index access
// ------------------------------------------------------------------------------------------------

type SharedIndex = Arc<RwLock<Index>>;

// The index is only ever mutated by single, non-panicking map operations,
// so a poisoned lock still guards a consistent map.
fn read_index(index: &SharedIndex) -> RwLockReadGuard<'_, Index> {
    index.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_index(index: &SharedIndex) -> RwLockWriteGuard<'_, Index> {
    index.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable, read-only view of a store's index.
///
/// Reads never wait on log I/O. A write becomes visible once the owning
/// store has appended it to the log.
#[derive(Debug, Clone)]
pub struct StoreReader {
    index: SharedIndex,
}

impl StoreReader {
    /// Returns the live value of `key`.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        read_index(&self.index).get(key).map(<[u8]>::to_vec)
    }

    /// Returns all live values.
    pub fn list_all(&self) -> Vec<Vec<u8>> {
        read_index(&self.index).values().map(<[u8]>::to_vec).collect()
    }

    /// Returns `true` if `key` is live.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        read_index(&self.index).contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        read_index(&self.index).len()
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        read_index(&self.index).is_empty()
    }
}

// ------------------------------------------------------------------------------------------------
// Store
// ------------------------------------------------------------------------------------------------

/// Single-file, log-structured key-value store.
///
/// See the [module-level documentation](self) for the control flow and
/// lifecycle.
#[derive(Debug)]
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Append-only log on disk.
    log: LogFile,

    /// Live state rebuilt from the log.
    index: SharedIndex,

    /// Unloaded until the first successful `load`.
    state: StoreState,
}

impl Store {
    /// Creates an unloaded store for the log at `path`, with default
    /// settings otherwise. Nothing is read or created.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::build(StoreConfig::with_path(path))
    }

    /// Creates an unloaded store from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the configuration is invalid.
    pub fn with_config(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StoreConfig) -> Self {
        let mut log = LogFile::new(&config.path);
        log.set_sync_appends(config.sync_appends);
        log.set_sync_on_replace(config.sync_on_compact);

        Self {
            config,
            log,
            index: Arc::new(RwLock::new(Index::new())),
            state: StoreState::Unloaded,
        }
    }

    // --------------------------------------------------------------------
    // Lifecycle
    // --------------------------------------------------------------------

    /// Rebuilds the index by replaying the whole log.
    ///
    /// A missing log is a first run and yields an empty store.
    ///
    /// # Errors
    ///
    /// - [`StoreError::CorruptRecord`] if any record, including a partially
    ///   written trailing one, cannot be decoded. The previous in-memory
    ///   state and the state machine are left unchanged.
    /// - [`StoreError::Io`] if the log cannot be read.
    pub fn load(&mut self) -> Result<LoadStats, StoreError> {
        if !self.log.exists() {
            write_index(&self.index).clear();
            self.log.clear_torn();
            self.state = StoreState::Loaded;
            info!(
                "No log at {}, starting with an empty store",
                self.log.path().display()
            );
            return Ok(LoadStats::default());
        }

        let contents = self.log.read_all()?;
        let mut fresh = Index::new();
        let mut stats = LoadStats {
            bytes: contents.len() as u64,
            ..LoadStats::default()
        };

        for record in RecordIter::new(&contents) {
            let record = record?;
            stats.records += 1;
            if record.tombstone {
                stats.tombstones += 1;
            }
            fresh.apply(record);
        }
        drop(contents);

        stats.live_keys = fresh.len();
        *write_index(&self.index) = fresh;
        self.log.clear_torn();
        self.state = StoreState::Loaded;

        info!(
            records = stats.records,
            tombstones = stats.tombstones,
            bytes = stats.bytes,
            live_keys = stats.live_keys,
            "Loaded log {}",
            self.log.path().display()
        );
        Ok(stats)
    }

    // --------------------------------------------------------------------
    // Write operations
    // --------------------------------------------------------------------

    /// Inserts or overwrites `key`.
    ///
    /// The record is appended to the log before the index is updated.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotLoaded`] before [`Store::load`].
    /// - [`StoreError::InvariantViolation`] if `key` or `value` is longer
    ///   than `u32::MAX` bytes; nothing is written.
    /// - [`StoreError::Io`] if the append fails; the index is unchanged.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.check_loaded()?;

        let mut buf = Vec::new();
        record::encode_record(false, key, value, &mut buf)?;
        self.log.append(&buf)?;

        write_index(&self.index).set(key.to_vec(), value.to_vec());
        trace!(key_len = key.len(), value_len = value.len(), "put");
        Ok(())
    }

    /// Deletes `key` by appending a tombstone, then removing it from the
    /// index.
    ///
    /// Deleting an absent key still appends a tombstone; replaying it is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Same as [`Store::put`].
    pub fn del(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.check_loaded()?;

        let mut buf = Vec::new();
        record::encode_record(true, key, &[], &mut buf)?;
        self.log.append(&buf)?;

        write_index(&self.index).remove(key);
        trace!(key_len = key.len(), "del");
        Ok(())
    }

    /// Rewrites the log as a snapshot holding one record per live key.
    ///
    /// Returns `Ok(None)` without touching the disk if the log does not
    /// exist.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotLoaded`] before [`Store::load`].
    /// - [`StoreError::Io`] if writing the temp file or the rename fails.
    ///   The original log stays valid and the store remains usable.
    pub fn compact(&mut self) -> Result<Option<CompactionStats>, StoreError> {
        self.check_loaded()?;

        if !self.log.exists() {
            debug!("Compaction skipped: no log at {}", self.log.path().display());
            return Ok(None);
        }

        let bytes_before = self.log.len()?;

        let (snapshot, live_keys) = {
            let index = read_index(&self.index);
            let mut buf = Vec::with_capacity(
                index.approximate_size() + index.len() * record::RECORD_OVERHEAD,
            );
            for (key, value) in index.iter() {
                record::encode_record(false, key, value, &mut buf)?;
            }
            (buf, index.len())
        };

        self.log.replace_with(&snapshot)?;

        let stats = CompactionStats {
            bytes_before,
            bytes_after: snapshot.len() as u64,
            live_keys,
        };
        info!(
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            live_keys = stats.live_keys,
            "Compacted log {}",
            self.log.path().display()
        );
        Ok(Some(stats))
    }

    // --------------------------------------------------------------------
    // Read operations
    // --------------------------------------------------------------------

    /// Returns the live value of `key`, or `None`. Never touches the log.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        read_index(&self.index).get(key).map(<[u8]>::to_vec)
    }

    /// Returns every live value, in ascending key order.
    pub fn list_all(&self) -> Vec<Vec<u8>> {
        read_index(&self.index).values().map(<[u8]>::to_vec).collect()
    }

    /// Returns every live key/value pair, in ascending key order.
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        read_index(&self.index)
            .iter()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect()
    }

    /// Returns `true` if `key` is live.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        read_index(&self.index).contains_key(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        read_index(&self.index).len()
    }

    /// Returns `true` if no key is live.
    pub fn is_empty(&self) -> bool {
        read_index(&self.index).is_empty()
    }

    /// Returns a read-only handle sharing this store's index.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            index: Arc::clone(&self.index),
        }
    }

    // --------------------------------------------------------------------
    // Accessors
    // --------------------------------------------------------------------

    /// Current size of the log in bytes, `0` if it does not exist.
    pub fn log_size(&self) -> Result<u64, StoreError> {
        Ok(self.log.len()?)
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        self.log.path()
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Returns `true` once [`Store::load`] has succeeded.
    pub fn is_loaded(&self) -> bool {
        self.state == StoreState::Loaded
    }

    /// Returns a point-in-time summary of the store.
    pub fn stats(&self) -> Result<StoreStats, StoreError> {
        let (live_keys, approximate_size) = {
            let index = read_index(&self.index);
            (index.len(), index.approximate_size())
        };
        Ok(StoreStats {
            state: self.state,
            live_keys,
            approximate_size,
            log_bytes: self.log.len()?,
        })
    }

    fn check_loaded(&self) -> Result<(), StoreError> {
        match self.state {
            StoreState::Loaded => Ok(()),
            StoreState::Unloaded => Err(StoreError::NotLoaded),
        }
    }
}
