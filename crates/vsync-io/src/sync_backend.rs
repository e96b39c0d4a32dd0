//! Synchronous I/O backend using `std::fs`.
//!
//! This is the default backend. Durable writes open, write, and `sync_all`
//! the file; directory syncs open the directory and `sync_all` it (a no-op
//! on platforms that cannot open directories).

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use bytes::Bytes;

use crate::IoError;
use crate::backend::IoBackend;

/// Synchronous I/O backend using `std::fs::File`.
#[derive(Debug, Default)]
pub struct SyncBackend;

impl SyncBackend {
    /// Creates a new synchronous I/O backend.
    pub fn new() -> Self {
        Self
    }
}

impl IoBackend for SyncBackend {
    fn read_all(&self, path: &Path) -> Result<Bytes, IoError> {
        let data = fs::read(path).map_err(|e| IoError::from_os(path, e))?;
        Ok(Bytes::from(data))
    }

    fn write_durable(&self, path: &Path, data: &[u8]) -> Result<(), IoError> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| IoError::from_os(path, e))?;
        file.write_all(data).map_err(|e| IoError::from_os(path, e))?;
        file.sync_all().map_err(|e| IoError::from_os(path, e))?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), IoError> {
        tracing::trace!(from = %from.display(), to = %to.display(), "renaming file");
        fs::rename(from, to).map_err(|e| IoError::from_os(from, e))
    }

    fn sync_dir(&self, dir: &Path) -> Result<(), IoError> {
        #[cfg(unix)]
        {
            let handle = fs::File::open(dir).map_err(|e| IoError::from_os(dir, e))?;
            handle.sync_all().map_err(|e| IoError::from_os(dir, e))?;
        }

        #[cfg(not(unix))]
        {
            let _ = dir;
        }

        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), IoError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IoError::from_os(path, e)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_backend_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dat");
        let backend = SyncBackend::new();

        backend.write_durable(&path, b"hello world").unwrap();

        let data = backend.read_all(&path).unwrap();
        assert_eq!(&data[..], b"hello world");
    }

    #[test]
    fn sync_backend_write_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replace.dat");
        let backend = SyncBackend::new();

        backend.write_durable(&path, b"a much longer first payload").unwrap();
        backend.write_durable(&path, b"short").unwrap();

        assert_eq!(&backend.read_all(&path).unwrap()[..], b"short");
    }

    #[test]
    fn sync_backend_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = SyncBackend::new()
            .read_all(&dir.path().join("absent"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn sync_backend_rename_promotes() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("view.swp");
        let to = dir.path().join("view");
        let backend = SyncBackend::new();

        backend.write_durable(&to, b"old").unwrap();
        backend.write_durable(&from, b"new").unwrap();
        backend.rename(&from, &to).unwrap();
        backend.sync_dir(dir.path()).unwrap();

        assert!(!backend.exists(&from));
        assert_eq!(&backend.read_all(&to).unwrap()[..], b"new");
    }

    #[test]
    fn sync_backend_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        SyncBackend::new()
            .remove(&dir.path().join("never-written"))
            .unwrap();
    }
}
