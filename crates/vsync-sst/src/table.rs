//! The shared state table contract.

use crate::{GmsRow, RowField, RowLayout, SstError};

/// A replicated table with one [`GmsRow`] per member.
///
/// Implementations own the local row and the replicas of every remote row.
/// The membership engine receives the table as an explicit handle on every
/// call; it never reaches it through global state.
///
/// # Contract
///
/// - Only the local row is writable, through [`local_row_mut`](Self::local_row_mut).
/// - Writes become visible to other members only after [`put`](Self::put)
///   pushes the covering byte range.
/// - Reads of remote rows are non-blocking snapshots and may be stale.
/// - Pushes from one member are applied at each replica in the order they
///   were issued.
pub trait SharedStateTable {
    /// Layout shared by every row of this table.
    fn layout(&self) -> &RowLayout;

    /// Number of rows (members).
    fn num_rows(&self) -> usize {
        self.layout().num_members()
    }

    /// Index of the locally owned row.
    fn local_index(&self) -> usize;

    /// Snapshot of row `index` as this replica currently sees it.
    fn row(&self, index: usize) -> Result<GmsRow, SstError>;

    /// The locally owned row.
    fn local_row(&self) -> &GmsRow;

    /// Mutable access to the locally owned row. Changes stay local until pushed.
    fn local_row_mut(&mut self) -> &mut GmsRow;

    /// Propagates bytes `offset..offset + len` of the local row to all replicas.
    ///
    /// Asynchronous and best-effort timely; `Ok` only means "accepted".
    fn put(&mut self, offset: usize, len: usize) -> Result<(), SstError>;

    /// Pushes a single field.
    fn put_field(&mut self, field: RowField) -> Result<(), SstError> {
        let range = self.layout().range(field);
        self.put(range.start, range.len())
    }

    /// Pushes the contiguous span of fields `first..=last`.
    fn put_span(&mut self, first: RowField, last: RowField) -> Result<(), SstError> {
        let range = self.layout().span(first, last);
        self.put(range.start, range.len())
    }

    /// Snapshots of every row, local row included.
    fn rows(&self) -> Result<Vec<GmsRow>, SstError> {
        (0..self.num_rows()).map(|i| self.row(i)).collect()
    }
}
