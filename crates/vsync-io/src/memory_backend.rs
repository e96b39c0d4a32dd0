//! In-memory I/O backend with fault injection.
//!
//! Files live in a `HashMap` behind a mutex. Durable writes and renames are
//! atomic by construction, so tests model crashes explicitly with
//! [`MemoryBackend::truncate`] (a torn write) and [`MemoryBackend::corrupt`]
//! (bit rot in the payload).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bytes::Bytes;

use crate::IoError;
use crate::backend::IoBackend;

/// In-memory backend for tests and simulation.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    files: Mutex<HashMap<PathBuf, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Bytes>> {
        // A poisoned map only means another test thread panicked mid-insert;
        // the map itself is still consistent.
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Cuts a file down to its first `len` bytes, as a crash mid-write would.
    ///
    /// Returns false if the file does not exist.
    pub fn truncate(&self, path: &Path, len: usize) -> bool {
        let mut files = self.files();
        match files.get_mut(path) {
            Some(data) => {
                let keep = len.min(data.len());
                *data = data.slice(..keep);
                true
            }
            None => false,
        }
    }

    /// Flips every bit of the byte at `offset`.
    ///
    /// Returns false if the file does not exist or is too short.
    pub fn corrupt(&self, path: &Path, offset: usize) -> bool {
        let mut files = self.files();
        match files.get_mut(path) {
            Some(data) if offset < data.len() => {
                let mut bytes = data.to_vec();
                bytes[offset] = !bytes[offset];
                *data = Bytes::from(bytes);
                true
            }
            _ => false,
        }
    }

    /// Places raw bytes at `path` without going through the durable path.
    pub fn insert_raw(&self, path: &Path, data: impl Into<Bytes>) {
        self.files().insert(path.to_path_buf(), data.into());
    }

    /// Number of files currently stored.
    pub fn len(&self) -> usize {
        self.files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }
}

impl IoBackend for MemoryBackend {
    fn read_all(&self, path: &Path) -> Result<Bytes, IoError> {
        self.files()
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn write_durable(&self, path: &Path, data: &[u8]) -> Result<(), IoError> {
        self.files()
            .insert(path.to_path_buf(), Bytes::copy_from_slice(data));
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError> {
        let mut files = self.files();
        let data = files.remove(from).ok_or_else(|| IoError::NotFound {
            path: from.to_path_buf(),
        })?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn sync_dir(&self, _dir: &Path) -> Result<(), IoError> {
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), IoError> {
        self.files().remove(path);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }
}
