//! Crash-safe durable storage for views.
//!
//! A stored view lives in two files: the primary at `path` and a swap file
//! at `path` + [`SWAP_FILE_EXTENSION`]. Each holds one frame:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │ length (u64, LE, 8B) │ postcard-encoded View        │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Write path
//!
//! 1. Write the frame to the swap file and fsync it.
//! 2. Rename the swap file over the primary (atomic on POSIX).
//! 3. Fsync the parent directory so the rename is durable.
//!
//! A crash before step 2 leaves the old primary intact; a crash after it
//! leaves the new one. A torn swap file never replaces a good primary.
//!
//! # Read path
//!
//! Both files are read. A file is usable only if the full frame is present
//! and decodes into a valid view. The primary wins when it is usable and its
//! epoch is at least the swap file's; otherwise the swap file wins. When
//! neither is usable there is no stored view, which is the normal state of
//! a node that has never joined.

use std::path::{Path, PathBuf};

use vsync_io::{IoBackend, SyncBackend};

use crate::{PersistenceError, View};

/// Suffix appended to the primary path to name the swap file.
pub const SWAP_FILE_EXTENSION: &str = ".swp";

const LENGTH_PREFIX: usize = 8;

/// Why a frame could not be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame truncated: need {needed} bytes, have {available}")]
    Truncated { needed: u64, available: usize },

    #[error("payload does not decode: {0}")]
    Decode(String),

    #[error("decoded view is invalid: {0}")]
    Invalid(String),
}

/// Returns the swap path for a primary view file.
pub fn swap_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(SWAP_FILE_EXTENSION);
    PathBuf::from(name)
}

/// Encodes a view as one length-prefixed frame.
pub fn encode_frame(view: &View) -> Result<Vec<u8>, PersistenceError> {
    view.validate()?;
    let payload = postcard::to_allocvec(view)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decodes one length-prefixed frame.
///
/// Bytes after the frame are ignored.
pub fn decode_frame(bytes: &[u8]) -> Result<View, FrameError> {
    if bytes.len() < LENGTH_PREFIX {
        return Err(FrameError::Truncated {
            needed: LENGTH_PREFIX as u64,
            available: bytes.len(),
        });
    }
    let mut prefix = [0u8; LENGTH_PREFIX];
    prefix.copy_from_slice(&bytes[..LENGTH_PREFIX]);
    let len = u64::from_le_bytes(prefix);

    let body = &bytes[LENGTH_PREFIX..];
    if (body.len() as u64) < len {
        return Err(FrameError::Truncated {
            needed: len.saturating_add(LENGTH_PREFIX as u64),
            available: bytes.len(),
        });
    }

    let view: View = postcard::from_bytes(&body[..len as usize])
        .map_err(|e| FrameError::Decode(e.to_string()))?;
    view.validate()
        .map_err(|e| FrameError::Invalid(e.to_string()))?;
    Ok(view)
}

/// Durable home of one node's current view.
#[derive(Debug)]
pub struct ViewStore<B: IoBackend = SyncBackend> {
    backend: B,
    path: PathBuf,
    swap: PathBuf,
}

impl ViewStore<SyncBackend> {
    /// Opens a store on the local filesystem.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::with_backend(SyncBackend::new(), path)
    }
}

impl<B: IoBackend> ViewStore<B> {
    pub fn with_backend(backend: B, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let swap = swap_path(&path);
        Self {
            backend,
            path,
            swap,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn swap_path(&self) -> &Path {
        &self.swap
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Reads one file, returning `None` if it is missing or unusable.
    fn read_candidate(&self, path: &Path) -> Result<Option<View>, PersistenceError> {
        let bytes = match self.backend.read_all(path) {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %path.display(), "no view file");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match decode_frame(&bytes) {
            Ok(view) => Ok(Some(view)),
            Err(reason) => {
                tracing::warn!(path = %path.display(), %reason, "ignoring unusable view file");
                Ok(None)
            }
        }
    }

    /// Loads the most recent usable view, or `None` if there is none.
    pub fn load(&self) -> Result<Option<View>, PersistenceError> {
        let primary = self.read_candidate(&self.path)?;
        let swap = self.read_candidate(&self.swap)?;

        let chosen = match (primary, swap) {
            (primary, None) => primary,
            (Some(primary), Some(swap)) if primary.epoch_id() >= swap.epoch_id() => Some(primary),
            (_, Some(swap)) => Some(swap),
        };

        if let Some(view) = &chosen {
            tracing::info!(
                path = %self.path.display(),
                epoch = %view.epoch_id(),
                members = view.num_members(),
                "loaded stored view"
            );
        }
        Ok(chosen)
    }

    /// Durably replaces the stored view (write swap, fsync, promote).
    pub fn save(&self, view: &View) -> Result<(), PersistenceError> {
        let frame = encode_frame(view)?;
        self.backend.write_durable(&self.swap, &frame)?;
        self.backend.rename(&self.swap, &self.path)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        self.backend.sync_dir(dir)?;

        tracing::debug!(
            path = %self.path.display(),
            epoch = %view.epoch_id(),
            bytes = frame.len(),
            "persisted view"
        );
        Ok(())
    }
}

/// Loads the stored view at `path` from the local filesystem.
pub fn load_view(path: impl AsRef<Path>) -> Result<Option<View>, PersistenceError> {
    ViewStore::open(path.as_ref()).load()
}

/// Persists `view` at `path` on the local filesystem.
pub fn save_view(path: impl AsRef<Path>, view: &View) -> Result<(), PersistenceError> {
    ViewStore::open(path.as_ref()).save(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsync_io::MemoryBackend;
    use vsync_types::{EpochId, NodeAddress, NodeId};

    use crate::Change;

    fn view_at(epoch_steps: u32) -> View {
        let members = (0..4)
            .map(|i| {
                (
                    NodeId::new(i),
                    NodeAddress::new(format!("node{i}:7000")).unwrap(),
                )
            })
            .collect();
        let mut view = View::initial(members, NodeId::new(3)).unwrap();
        for step in 0..epoch_steps {
            view = view
                .successor(&[Change::Join {
                    node: NodeId::new(100 + step),
                    address: NodeAddress::new(format!("joiner{step}:7000")).unwrap(),
                }])
                .unwrap();
        }
        view
    }

    fn memory_store() -> ViewStore<MemoryBackend> {
        ViewStore::with_backend(MemoryBackend::new(), "/state/view")
    }

    #[test]
    fn swap_path_appends_suffix() {
        assert_eq!(
            swap_path(Path::new("/var/lib/vsync/view")),
            PathBuf::from("/var/lib/vsync/view.swp")
        );
    }

    #[test]
    fn round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view");
        let mut view = view_at(2);
        view.mark_failed(1).unwrap();

        save_view(&path, &view).unwrap();
        let loaded = load_view(&path).unwrap().unwrap();

        assert_eq!(loaded.epoch_id(), view.epoch_id());
        assert_eq!(loaded.members(), view.members());
        assert_eq!(loaded.failed(), view.failed());
        assert_eq!(loaded.my_rank(), view.my_rank());
        assert!(!path.with_file_name("view.swp").exists(), "swap was promoted");
    }

    #[test]
    fn leader_latch_is_not_persisted() {
        let store = memory_store();
        let mut view = view_at(0);
        view.commit_leadership();
        store.save(&view).unwrap();
        assert!(!store.load().unwrap().unwrap().leader_committed());
    }

    #[test]
    fn no_files_means_no_view() {
        assert!(memory_store().load().unwrap().is_none());
    }

    #[test]
    fn truncated_primary_falls_back_to_swap() {
        let store = memory_store();
        let frame = encode_frame(&view_at(1)).unwrap();
        store.backend().insert_raw(store.path(), frame.clone());
        store.backend().insert_raw(store.swap_path(), frame.clone());
        assert!(store.backend().truncate(store.path(), frame.len() - 1));

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.epoch_id(), EpochId::new(1));
    }

    #[test]
    fn absurd_length_prefix_falls_back_to_swap() {
        let store = memory_store();
        store.backend().insert_raw(store.path(), vec![0xFFu8; 12]);
        store
            .backend()
            .insert_raw(store.swap_path(), encode_frame(&view_at(2)).unwrap());

        match decode_frame(&[0xFFu8; 12]) {
            Err(FrameError::Truncated { needed, available }) => {
                assert_eq!(needed, u64::MAX);
                assert_eq!(available, 12);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        assert_eq!(store.load().unwrap().unwrap().epoch_id(), EpochId::new(2));
    }

    #[test]
    fn newer_swap_wins_over_older_primary() {
        let store = memory_store();
        store.save(&view_at(1)).unwrap();
        store
            .backend()
            .insert_raw(store.swap_path(), encode_frame(&view_at(3)).unwrap());

        assert_eq!(store.load().unwrap().unwrap().epoch_id(), EpochId::new(3));
    }

    #[test]
    fn primary_wins_ties_and_newer_epochs() {
        let store = memory_store();
        store.save(&view_at(2)).unwrap();
        store
            .backend()
            .insert_raw(store.swap_path(), encode_frame(&view_at(2)).unwrap());
        assert_eq!(store.load().unwrap().unwrap().epoch_id(), EpochId::new(2));

        store
            .backend()
            .insert_raw(store.swap_path(), encode_frame(&view_at(1)).unwrap());
        assert_eq!(store.load().unwrap().unwrap().epoch_id(), EpochId::new(2));
    }

    #[test]
    fn torn_swap_does_not_hide_primary() {
        let store = memory_store();
        store.save(&view_at(1)).unwrap();
        let frame = encode_frame(&view_at(5)).unwrap();
        store.backend().insert_raw(store.swap_path(), frame);
        store.backend().truncate(store.swap_path(), 6);

        assert_eq!(store.load().unwrap().unwrap().epoch_id(), EpochId::new(1));
    }

    #[test]
    fn both_unusable_means_no_view() {
        let store = memory_store();
        store.backend().insert_raw(store.path(), vec![0xFFu8; 4]);
        store.backend().insert_raw(store.swap_path(), Vec::<u8>::new());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn frame_truncation_detected() {
        let frame = encode_frame(&view_at(0)).unwrap();
        for cut in [0, 3, 8, frame.len() - 1] {
            assert!(matches!(
                decode_frame(&frame[..cut]),
                Err(FrameError::Truncated { .. })
            ));
        }
        assert!(decode_frame(&frame).is_ok());
    }

    #[test]
    fn frame_ignores_trailing_bytes() {
        let mut frame = encode_frame(&view_at(1)).unwrap();
        frame.extend_from_slice(b"junk");
        assert_eq!(decode_frame(&frame).unwrap().epoch_id(), EpochId::new(1));
    }

    #[test]
    fn repeated_saves_keep_latest() {
        let store = memory_store();
        for steps in 0..4 {
            store.save(&view_at(steps)).unwrap();
        }
        assert_eq!(store.load().unwrap().unwrap().epoch_id(), EpochId::new(3));
        assert!(!store.backend().exists(store.swap_path()));
    }
}
