//! Error types for shared state table access.

use thiserror::Error;

/// Errors from the shared state table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SstError {
    /// A push covered bytes outside the row.
    #[error("byte range {offset}..{offset}+{len} exceeds row size {row_size}")]
    OutOfRange {
        offset: usize,
        len: usize,
        row_size: usize,
    },

    /// A row index outside the table.
    #[error("row {index} out of bounds (table has {rows} rows)")]
    RowIndex { index: usize, rows: usize },

    /// The local replica has been cut off from the fabric.
    #[error("replica {index} is disconnected")]
    Disconnected { index: usize },

    /// Row bytes did not decode into a valid row.
    #[error("row decode failed: {0}")]
    Decode(String),

    /// Layout parameters were unusable.
    #[error("invalid row layout: {0}")]
    InvalidLayout(String),
}
