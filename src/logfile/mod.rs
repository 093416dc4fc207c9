//! # Append Log
//!
//! A [`LogFile`] is durable, ordered byte storage on a single file path.
//! The store appends encoded records to it and reads it back in full on
//! load.  It never edits bytes in place: the only way to shrink the file
//! is [`LogFile::replace_with`], which swaps in a complete new image.
//!
//! ## Replacement protocol
//!
//! 1. Write the new image to `<path>.tmp` (created or truncated).
//! 2. Optionally `fsync` the temp file.
//! 3. `rename` the temp file over `<path>`.
//! 4. Optionally `fsync` the parent directory so the rename is durable.
//!
//! The rename is the only step that changes what `<path>` names.  A crash
//! before it leaves the original log untouched (plus a stale temp file,
//! which is ignored and later overwritten); a crash after it leaves the
//! complete new image in place.
//!
//! ## Durability
//!
//! Appends go through `write_all` on a file opened in append mode, which
//! may issue several `write(2)` calls.  If any of them (or the optional
//! `sync_data`) fails, the file is truncated back to its length before the
//! append, so a failed append never leaves a partial record behind.  If
//! that truncation itself fails the log is marked torn and every further
//! append is refused until the log is reloaded or replaced.
//!
//! Appends are not fsynced unless [`LogFile::set_sync_appends`] is enabled.

#[cfg(test)]
mod tests;

use std::{
    ffi::OsString,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    ops::Deref,
    path::{Path, PathBuf},
};

use memmap2::Mmap;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

/// Suffix appended to the log path to form the compaction temp file.
pub const TMP_SUFFIX: &str = ".tmp";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by log file operations.
#[derive(Debug, Error)]
pub enum LogFileError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A failed append could not be rolled back; the log ends in a
    /// partial record.
    #[error("log {0} ends in a partial record from a failed append")]
    TornTail(PathBuf),
}

// ------------------------------------------------------------------------------------------------
// LogContents
// ------------------------------------------------------------------------------------------------

/// Full contents of the log, as returned by [`LogFile::read_all`].
///
/// Non-empty files are memory-mapped read-only; a zero-length file is
/// represented without a mapping.  Dereferences to `[u8]`.
#[derive(Debug)]
pub enum LogContents {
    /// The file exists but holds no bytes.
    Empty,

    /// Read-only mapping of the whole file.
    Mapped(Mmap),
}

impl Deref for LogContents {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            LogContents::Empty => &[],
            LogContents::Mapped(mmap) => mmap,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// LogFile
// ------------------------------------------------------------------------------------------------

/// Append-only log stored in one file.
///
/// The file is created lazily by the first [`append`](LogFile::append) or
/// [`replace_with`](LogFile::replace_with).
#[derive(Debug)]
pub struct LogFile {
    /// Path of the log file.
    path: PathBuf,

    /// Path of the compaction temp file (`<path>.tmp`).
    tmp_path: PathBuf,

    /// Append handle, opened on first append and dropped on replacement.
    writer: Option<File>,

    /// `sync_data` after every append.
    sync_appends: bool,

    /// `fsync` the temp file before rename and the directory after.
    sync_on_replace: bool,

    /// Set when a failed append could not be truncated away.
    torn_tail: bool,

    /// Writes only this many bytes of the next append, then fails.
    #[cfg(test)]
    pub(crate) fail_next_append_after: Option<usize>,
}

impl LogFile {
    /// Creates a handle for the log at `path`. No file is touched.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut tmp: OsString = path.as_os_str().to_owned();
        tmp.push(TMP_SUFFIX);

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
            writer: None,
            sync_appends: false,
            sync_on_replace: true,
            torn_tail: false,
            #[cfg(test)]
            fail_next_append_after: None,
        }
    }

    /// Enables or disables `fsync` after every append.
    pub fn set_sync_appends(&mut self, enabled: bool) {
        self.sync_appends = enabled;
    }

    /// Enables or disables `fsync` of the temp file and parent directory
    /// during [`replace_with`](LogFile::replace_with).
    pub fn set_sync_on_replace(&mut self, enabled: bool) {
        self.sync_on_replace = enabled;
    }

    /// Returns `true` iff the log path currently names a regular file.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Current size of the log in bytes, `0` if it does not exist.
    pub fn len(&self) -> Result<u64, LogFileError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns `true` if the log is absent or holds no bytes.
    pub fn is_empty(&self) -> Result<bool, LogFileError> {
        Ok(self.len()? == 0)
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the compaction temp file.
    pub fn temp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Reads the whole log.
    ///
    /// # Safety
    ///
    /// Uses `unsafe { Mmap::map(...) }`. This is sound under the store's
    /// single-writer contract: the mapping is dropped before the owning
    /// store appends again, and replacement renames a new inode over the
    /// path instead of truncating the mapped one.
    pub fn read_all(&self) -> Result<LogContents, LogFileError> {
        if self.tmp_path.exists() {
            warn!(
                "Ignoring stale compaction temp file {}",
                self.tmp_path.display()
            );
        }

        let file = File::open(&self.path)?;
        let len = file.metadata()?.len();
        if len == 0 {
            trace!("Log {} is empty", self.path.display());
            return Ok(LogContents::Empty);
        }

        let mmap = unsafe { Mmap::map(&file)? };
        debug!("Mapped {} bytes of {}", mmap.len(), self.path.display());
        Ok(LogContents::Mapped(mmap))
    }

    /// Returns `true` if a failed append left bytes that could not be
    /// truncated away.
    pub fn is_torn(&self) -> bool {
        self.torn_tail
    }

    /// Clears the torn marker once the caller has re-read the log and
    /// found it well formed.
    pub fn clear_torn(&mut self) {
        self.torn_tail = false;
    }

    #[cfg(test)]
    pub(crate) fn mark_torn(&mut self) {
        self.torn_tail = true;
    }

    /// Appends `bytes` to the end of the log.
    ///
    /// Creates the file if it does not exist. The handle is kept open and
    /// reused by later appends.
    ///
    /// Either all of `bytes` is in the file when this returns `Ok`, or the
    /// file is back at its previous length. When the rollback itself fails
    /// the log is marked torn and later appends return
    /// [`LogFileError::TornTail`].
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), LogFileError> {
        if self.torn_tail {
            return Err(LogFileError::TornTail(self.path.clone()));
        }

        // Taken out for the duration of the write; a failed write drops the
        // handle and the next append reopens the file.
        let mut file = match self.writer.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        };
        let start = file.metadata()?.len();

        if let Err(e) = self.write_appended(&mut file, bytes) {
            self.roll_back(&file, start);
            return Err(e.into());
        }
        self.writer = Some(file);

        trace!("Appended {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }

    fn write_appended(&mut self, file: &mut File, bytes: &[u8]) -> io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.fail_next_append_after.take() {
            file.write_all(&bytes[..limit.min(bytes.len())])?;
            return Err(io::Error::new(
                io::ErrorKind::StorageFull,
                "short write injected by test",
            ));
        }

        file.write_all(bytes)?;
        if self.sync_appends {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Truncates the log back to `len` after a failed append.
    fn roll_back(&mut self, file: &File, len: u64) {
        match file.set_len(len) {
            Ok(()) => warn!(
                "Rolled back failed append on {} to {} bytes",
                self.path.display(),
                len
            ),
            Err(e) => {
                self.torn_tail = true;
                error!(
                    "Failed to roll back append on {}: {e}; refusing further appends",
                    self.path.display()
                );
            }
        }
    }

    /// Atomically replaces the whole log with `bytes`.
    ///
    /// On any error before the rename the original file is untouched.
    pub fn replace_with(&mut self, bytes: &[u8]) -> Result<(), LogFileError> {
        // The append handle refers to the inode about to be unlinked.
        self.writer = None;

        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.tmp_path)?;
            f.write_all(bytes)?;
            if self.sync_on_replace {
                f.sync_all()?;
            }
        }

        fs::rename(&self.tmp_path, &self.path)?;
        self.torn_tail = false;

        if self.sync_on_replace {
            Self::fsync_dir(self.parent_dir())?;
        }

        info!(
            "Replaced log {} with {} bytes",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }

    /// Directory containing the log; `.` for a bare file name.
    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    fn fsync_dir(dir: &Path) -> Result<(), LogFileError> {
        let dir_file = File::open(dir)?;
        dir_file.sync_all()?;
        Ok(())
    }
}
