//! Error types for views and view persistence.

use thiserror::Error;
use vsync_io::IoError;

/// Errors from view queries, construction, and parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    /// Every member is marked failed.
    #[error("no live member to lead the view")]
    NoLeader,

    /// A lookup did not match any member.
    #[error("{0} is not a member of the view")]
    NotFound(String),

    /// Construction or mutation would break a view invariant.
    #[error("view invariant violated: {0}")]
    Invariant(String),

    /// The textual encoding was malformed.
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Errors from durable view storage.
///
/// An unusable (missing, truncated, or undecodable) file is not an error;
/// the other file is tried and, failing both, no view is returned.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The backend failed for a reason other than a missing file.
    #[error("view storage I/O failed: {0}")]
    Io(#[from] IoError),

    /// The view could not be serialized.
    #[error("view serialization failed: {0}")]
    Encode(#[from] postcard::Error),

    /// Refused to persist an invalid view.
    #[error("refusing to persist invalid view: {0}")]
    InvalidView(#[from] ViewError),
}
