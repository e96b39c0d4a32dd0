//! # vsync-sst: Shared State Table
//!
//! The membership protocol is built entirely on one primitive: a table with
//! one row per member, where each member writes only its own row, every
//! member reads every row, and local writes are pushed to all replicas.
//! Pushes can be partial: only a byte range of the row is propagated.
//!
//! This crate provides:
//! - [`RowLayout`]: the fixed byte layout of a group-management row
//! - [`GmsRow`]: the typed view of one row, with its byte codec
//! - [`SharedStateTable`]: the contract the membership engine consumes
//! - [`LocalFabric`]: an in-process replicated table with controllable
//!   delivery, used by tests and the simulator
//!
//! # Row Layout
//!
//! ```text
//! ┌───────────┬──────────────┬────────────┬─────────┬───────────┬───────┬────────┐
//! │ suspected │   changes    │   joiner   │   num   │    num    │  num  │ wedged │
//! │  1B × n   │ 4B × capacity│  address   │ changes │ committed │ acked │   1B   │
//! │           │              │  1B + 63B  │  8B LE  │   8B LE   │ 8B LE │        │
//! └───────────┴──────────────┴────────────┴─────────┴───────────┴───────┴────────┘
//! ```
//!
//! `changes`, `joiner address`, `num_changes` and `num_committed` are
//! contiguous so a merge can publish them with a single partial push.

mod error;
mod fabric;
mod layout;
mod row;
mod table;

pub use error::SstError;
pub use fabric::{DeliveryMode, LocalFabric, SstHandle};
pub use layout::{ADDRESS_SLOT_LEN, RowField, RowLayout};
pub use row::GmsRow;
pub use table::SharedStateTable;

#[cfg(test)]
mod tests;
