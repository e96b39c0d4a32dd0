//! # vsync-io: Durable file I/O for view persistence
//!
//! The view store never touches `std::fs` directly. It goes through the
//! [`IoBackend`] trait so the crash-safety logic can be exercised against
//! an in-memory backend that simulates torn writes:
//!
//! - **`SyncBackend`** (default): blocking `std::fs` calls with fsync on
//!   every durable write and directory sync after renames
//! - **`MemoryBackend`**: a map of path to bytes with fault injection
//!   (truncation, corruption) for crash-recovery tests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │   vsync-view::ViewStore  │
//! │   (uses IoBackend trait) │
//! └────────────┬─────────────┘
//!              │
//! ┌────────────┴─────────────┐
//! │         vsync-io         │
//! │  ┌─────────┐  ┌────────┐ │
//! │  │  Sync   │  │ Memory │ │
//! │  │ Backend │  │ Backend│ │
//! │  └─────────┘  └────────┘ │
//! └──────────────────────────┘
//! ```

mod backend;
mod error;
mod memory_backend;
mod sync_backend;

pub use backend::IoBackend;
pub use error::IoError;
pub use memory_backend::MemoryBackend;
pub use sync_backend::SyncBackend;

#[cfg(test)]
mod tests;
