//! Fixed byte layout of a group-management row.

use std::ops::Range;

use vsync_types::MAX_ADDRESS_LEN;

use crate::SstError;

/// Width of the joiner address slot: one length byte plus the address bytes.
pub const ADDRESS_SLOT_LEN: usize = 1 + MAX_ADDRESS_LEN;

const CHANGE_ENTRY_LEN: usize = 4;
const COUNTER_LEN: usize = 8;

/// Fields of a row, in layout order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RowField {
    Suspected,
    Changes,
    JoinerAddress,
    NumChanges,
    NumCommitted,
    NumAcked,
    Wedged,
}

impl RowField {
    /// All fields in the order they appear in a row.
    pub const ALL: [RowField; 7] = [
        RowField::Suspected,
        RowField::Changes,
        RowField::JoinerAddress,
        RowField::NumChanges,
        RowField::NumCommitted,
        RowField::NumAcked,
        RowField::Wedged,
    ];
}

/// Byte layout of a row for a group of `num_members` with a change log of
/// `change_capacity` slots.
///
/// Every replica of a table shares one layout; it is fixed for the lifetime
/// of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    num_members: usize,
    change_capacity: usize,
}

impl RowLayout {
    pub fn new(num_members: usize, change_capacity: usize) -> Result<Self, SstError> {
        if num_members == 0 {
            return Err(SstError::InvalidLayout(
                "a row needs at least one member".to_string(),
            ));
        }
        if change_capacity == 0 {
            return Err(SstError::InvalidLayout(
                "change log capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            num_members,
            change_capacity,
        })
    }

    pub fn num_members(&self) -> usize {
        self.num_members
    }

    pub fn change_capacity(&self) -> usize {
        self.change_capacity
    }

    fn width(&self, field: RowField) -> usize {
        match field {
            RowField::Suspected => self.num_members,
            RowField::Changes => self.change_capacity * CHANGE_ENTRY_LEN,
            RowField::JoinerAddress => ADDRESS_SLOT_LEN,
            RowField::NumChanges | RowField::NumCommitted | RowField::NumAcked => COUNTER_LEN,
            RowField::Wedged => 1,
        }
    }

    /// Byte range occupied by `field`.
    pub fn range(&self, field: RowField) -> Range<usize> {
        let start: usize = RowField::ALL
            .iter()
            .take_while(|f| **f != field)
            .map(|f| self.width(*f))
            .sum();
        start..start + self.width(field)
    }

    /// Contiguous byte range from the start of `first` to the end of `last`.
    ///
    /// # Panics
    ///
    /// Panics if `last` precedes `first` in layout order.
    pub fn span(&self, first: RowField, last: RowField) -> Range<usize> {
        assert!(first <= last, "span must run forward: {first:?}..={last:?}");
        self.range(first).start..self.range(last).end
    }

    /// Total size of a row in bytes.
    pub fn row_size(&self) -> usize {
        RowField::ALL.iter().map(|f| self.width(*f)).sum()
    }

    /// Byte range of change log slot `slot` (already reduced modulo capacity).
    pub(crate) fn change_slot(&self, slot: usize) -> Range<usize> {
        debug_assert!(slot < self.change_capacity);
        let start = self.range(RowField::Changes).start + slot * CHANGE_ENTRY_LEN;
        start..start + CHANGE_ENTRY_LEN
    }

    /// Checks that `offset..offset + len` lies within the row.
    pub fn check_range(&self, offset: usize, len: usize) -> Result<Range<usize>, SstError> {
        let row_size = self.row_size();
        match offset.checked_add(len) {
            Some(end) if end <= row_size => Ok(offset..end),
            _ => Err(SstError::OutOfRange {
                offset,
                len,
                row_size,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_contiguous_and_ordered() {
        let layout = RowLayout::new(5, 5).unwrap();
        let mut cursor = 0;
        for field in RowField::ALL {
            let range = layout.range(field);
            assert_eq!(range.start, cursor, "{field:?} starts where the previous ends");
            cursor = range.end;
        }
        assert_eq!(cursor, layout.row_size());
    }

    #[test]
    fn five_member_row_size() {
        let layout = RowLayout::new(5, 5).unwrap();
        // 5 suspected + 20 changes + 64 address + 24 counters + 1 wedged
        assert_eq!(layout.row_size(), 114);
        assert_eq!(layout.range(RowField::Wedged), 113..114);
    }

    #[test]
    fn merge_span_covers_changes_through_committed() {
        let layout = RowLayout::new(3, 4).unwrap();
        let span = layout.span(RowField::Changes, RowField::NumCommitted);
        assert_eq!(span.start, layout.range(RowField::Changes).start);
        assert_eq!(span.end, layout.range(RowField::NumCommitted).end);
        assert_eq!(span.len(), 16 + ADDRESS_SLOT_LEN + 16);
    }

    #[test]
    fn zero_sized_layouts_rejected() {
        assert!(RowLayout::new(0, 1).is_err());
        assert!(RowLayout::new(1, 0).is_err());
    }

    #[test]
    fn check_range_bounds() {
        let layout = RowLayout::new(2, 2).unwrap();
        let size = layout.row_size();
        assert!(layout.check_range(0, size).is_ok());
        assert!(layout.check_range(size, 0).is_ok());
        assert!(layout.check_range(1, size).is_err());
        assert!(layout.check_range(usize::MAX, 2).is_err());
    }
}
