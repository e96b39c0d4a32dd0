//! Integration tests for the I/O backends.

use std::path::Path;

use crate::{IoBackend, MemoryBackend, SyncBackend};

/// Exercises the write-then-promote sequence the view store relies on.
fn promote_sequence(backend: &dyn IoBackend, dir: &Path) {
    let primary = dir.join("view");
    let swap = dir.join("view.swp");

    backend.write_durable(&swap, b"epoch-1").unwrap();
    assert!(backend.exists(&swap));
    backend.rename(&swap, &primary).unwrap();
    backend.sync_dir(dir).unwrap();

    assert!(!backend.exists(&swap));
    assert_eq!(&backend.read_all(&primary).unwrap()[..], b"epoch-1");

    backend.write_durable(&swap, b"epoch-2").unwrap();
    backend.rename(&swap, &primary).unwrap();
    assert_eq!(&backend.read_all(&primary).unwrap()[..], b"epoch-2");
}

#[test]
fn sync_backend_promote_sequence() {
    let dir = tempfile::tempdir().unwrap();
    promote_sequence(&SyncBackend::new(), dir.path());
}

#[test]
fn memory_backend_promote_sequence() {
    promote_sequence(&MemoryBackend::new(), Path::new("/virtual"));
}

#[test]
fn memory_backend_truncate_simulates_torn_write() {
    let backend = MemoryBackend::new();
    let path = Path::new("/virtual/view");
    backend.write_durable(path, b"0123456789").unwrap();

    assert!(backend.truncate(path, 4));
    assert_eq!(&backend.read_all(path).unwrap()[..], b"0123");

    // Truncating past the end keeps the file as is.
    assert!(backend.truncate(path, 100));
    assert_eq!(backend.read_all(path).unwrap().len(), 4);

    assert!(!backend.truncate(Path::new("/virtual/absent"), 0));
}

#[test]
fn memory_backend_corrupt_flips_byte() {
    let backend = MemoryBackend::new();
    let path = Path::new("/virtual/view");
    backend.write_durable(path, &[0x00, 0x0F]).unwrap();

    assert!(backend.corrupt(path, 1));
    assert_eq!(&backend.read_all(path).unwrap()[..], &[0x00, 0xF0]);
    assert!(!backend.corrupt(path, 2));
}

#[test]
fn memory_backend_rename_missing_source_fails() {
    let backend = MemoryBackend::new();
    let err = backend
        .rename(Path::new("/virtual/a"), Path::new("/virtual/b"))
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(backend.is_empty());
}
