//! I/O backend trait.
//!
//! The [`IoBackend`] trait abstracts the handful of whole-file operations a
//! write-then-promote persistence scheme needs:
//! - read a small file in full
//! - write a small file durably (write + fsync)
//! - atomically rename one file over another
//! - sync a directory so the rename itself survives a crash
//!
//! This lets the view store be tested against a mock backend that can
//! simulate a crash mid-write.

use std::path::Path;

use bytes::Bytes;

use crate::IoError;

/// Abstraction over durable file operations.
///
/// All methods are synchronous. View files are a few hundred bytes, so
/// whole-file reads and writes are the only access pattern.
pub trait IoBackend: Send + Sync {
    /// Reads an entire file into memory.
    ///
    /// Returns [`IoError::NotFound`] if the file does not exist.
    fn read_all(&self, path: &Path) -> Result<Bytes, IoError>;

    /// Writes data to a file, replacing any previous contents, and syncs it
    /// to disk before returning.
    fn write_durable(&self, path: &Path, data: &[u8]) -> Result<(), IoError>;

    /// Atomically replaces `to` with `from`.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError>;

    /// Syncs directory metadata (entries created or renamed in it).
    fn sync_dir(&self, dir: &Path) -> Result<(), IoError>;

    /// Removes a file. Removing a missing file is not an error.
    fn remove(&self, path: &Path) -> Result<(), IoError>;

    /// Returns true if the file exists.
    fn exists(&self, path: &Path) -> bool;
}
