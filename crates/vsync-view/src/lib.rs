//! # vsync-view: Views and their persistence
//!
//! A [`View`] is the agreed membership of one epoch: who is in the group,
//! who is currently marked failed, and which rank this node holds. Views
//! are immutable once installed; a reconfiguration produces a new view
//! through [`View::successor`].
//!
//! This crate also owns the two ways a view leaves memory:
//! - [`text`]: a line-oriented diagnostic encoding, parsed strictly
//! - [`persistence`]: length-prefixed binary frames in a primary file and a
//!   swap file, written swap-first and atomically promoted

mod error;
pub mod persistence;
pub mod text;
mod view;

pub use error::{PersistenceError, ViewError};
pub use persistence::{SWAP_FILE_EXTENSION, ViewStore, load_view, save_view};
pub use view::{Change, View};
