//! Typed view of a group-management row and its byte codec.

use vsync_types::{NodeAddress, NodeId};

use crate::{RowField, RowLayout, SstError};

/// One member's row of the group-management table.
///
/// The owning member mutates it through
/// [`SharedStateTable::local_row_mut`](crate::SharedStateTable::local_row_mut)
/// and pushes the modified byte range; everyone else sees snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GmsRow {
    /// `suspected[r]` is true if this member believes rank `r` has failed.
    pub suspected: Vec<bool>,

    /// Circular log of proposed changes, indexed modulo capacity.
    ///
    /// An entry naming a current member proposes its removal; any other
    /// entry proposes a join at [`GmsRow::joiner_address`].
    pub changes: Vec<Option<NodeId>>,

    /// Address of the pending joiner, if a join is proposed.
    pub joiner_address: Option<NodeAddress>,

    /// Total number of changes ever proposed in this epoch.
    pub num_changes: u64,

    /// Number of changes known to be committed.
    pub num_committed: u64,

    /// Number of proposed changes this member has acknowledged.
    pub num_acked: u64,

    /// Set once this member has fenced its transport for the epoch.
    pub wedged: bool,
}

impl GmsRow {
    /// Creates an all-zero row for `layout`.
    pub fn new(layout: &RowLayout) -> Self {
        Self {
            suspected: vec![false; layout.num_members()],
            changes: vec![None; layout.change_capacity()],
            joiner_address: None,
            num_changes: 0,
            num_committed: 0,
            num_acked: 0,
            wedged: false,
        }
    }

    /// Capacity of the change log.
    pub fn capacity(&self) -> usize {
        self.changes.len()
    }

    /// Entry for logical change index `index`.
    pub fn change_at(&self, index: u64) -> Option<NodeId> {
        let slot = (index % self.capacity() as u64) as usize;
        self.changes[slot]
    }

    /// Number of proposals not yet committed.
    pub fn pending_count(&self) -> u64 {
        self.num_changes.saturating_sub(self.num_committed)
    }

    /// Entries in `[num_committed, num_changes)`.
    pub fn pending(&self) -> impl Iterator<Item = NodeId> + '_ {
        (self.num_committed..self.num_changes).filter_map(|i| self.change_at(i))
    }

    /// Appends `node` at `num_changes mod capacity` and bumps the counter.
    ///
    /// Returns false, leaving the row untouched, if every slot holds an
    /// uncommitted proposal.
    pub fn push_change(&mut self, node: NodeId) -> bool {
        if self.pending_count() >= self.capacity() as u64 {
            return false;
        }
        let slot = (self.num_changes % self.capacity() as u64) as usize;
        self.changes[slot] = Some(node);
        self.num_changes += 1;
        true
    }

    /// Takes `other`'s commit count together with the entries it covers.
    ///
    /// A log at least as long as the local one is copied whole. A shorter
    /// one only overwrites the committed prefix, so `num_changes` never
    /// shrinks.
    pub fn adopt_commit(&mut self, other: &GmsRow) {
        if other.num_changes >= self.num_changes {
            self.changes.clone_from(&other.changes);
            self.num_changes = other.num_changes;
        } else {
            let capacity = self.capacity() as u64;
            for index in 0..other.num_committed {
                self.changes[(index % capacity) as usize] = other.change_at(index);
            }
        }
        if other.joiner_address.is_some() {
            self.joiner_address.clone_from(&other.joiner_address);
        }
        self.num_committed = other.num_committed;
    }

    /// Encodes the row into a fresh buffer.
    pub fn encode(&self, layout: &RowLayout) -> Vec<u8> {
        let mut buf = vec![0u8; layout.row_size()];
        self.encode_into(layout, &mut buf);
        buf
    }

    /// Encodes the row into `buf`, which must be exactly one row long.
    ///
    /// # Panics
    ///
    /// Panics if the row's vectors do not match `layout` or `buf` has the
    /// wrong length.
    pub fn encode_into(&self, layout: &RowLayout, buf: &mut [u8]) {
        assert_eq!(buf.len(), layout.row_size(), "row buffer size mismatch");
        assert_eq!(self.suspected.len(), layout.num_members());
        assert_eq!(self.changes.len(), layout.change_capacity());

        let suspected = layout.range(RowField::Suspected);
        for (byte, flag) in buf[suspected].iter_mut().zip(&self.suspected) {
            *byte = u8::from(*flag);
        }

        for (slot, entry) in self.changes.iter().enumerate() {
            let raw = entry.map_or(NodeId::RESERVED, |n| n.as_u32());
            buf[layout.change_slot(slot)].copy_from_slice(&raw.to_le_bytes());
        }

        let address = &mut buf[layout.range(RowField::JoinerAddress)];
        address.fill(0);
        if let Some(joiner) = &self.joiner_address {
            let bytes = joiner.as_bytes();
            address[0] = bytes.len() as u8;
            address[1..=bytes.len()].copy_from_slice(bytes);
        }

        buf[layout.range(RowField::NumChanges)].copy_from_slice(&self.num_changes.to_le_bytes());
        buf[layout.range(RowField::NumCommitted)]
            .copy_from_slice(&self.num_committed.to_le_bytes());
        buf[layout.range(RowField::NumAcked)].copy_from_slice(&self.num_acked.to_le_bytes());
        buf[layout.range(RowField::Wedged).start] = u8::from(self.wedged);
    }

    /// Decodes a row from exactly one row's worth of bytes.
    pub fn decode(layout: &RowLayout, buf: &[u8]) -> Result<Self, SstError> {
        if buf.len() != layout.row_size() {
            return Err(SstError::Decode(format!(
                "expected {} bytes, got {}",
                layout.row_size(),
                buf.len()
            )));
        }

        let suspected = buf[layout.range(RowField::Suspected)]
            .iter()
            .map(|b| *b != 0)
            .collect();

        let changes = (0..layout.change_capacity())
            .map(|slot| {
                let raw = read_u32(&buf[layout.change_slot(slot)]);
                (raw != NodeId::RESERVED).then(|| NodeId::new(raw))
            })
            .collect();

        let address = &buf[layout.range(RowField::JoinerAddress)];
        let joiner_address = match address[0] as usize {
            0 => None,
            len if len < address.len() => {
                let text = std::str::from_utf8(&address[1..=len])
                    .map_err(|e| SstError::Decode(format!("joiner address: {e}")))?;
                Some(
                    NodeAddress::new(text)
                        .map_err(|e| SstError::Decode(format!("joiner address: {e}")))?,
                )
            }
            len => {
                return Err(SstError::Decode(format!(
                    "joiner address length {len} exceeds slot"
                )));
            }
        };

        Ok(Self {
            suspected,
            changes,
            joiner_address,
            num_changes: read_u64(&buf[layout.range(RowField::NumChanges)]),
            num_committed: read_u64(&buf[layout.range(RowField::NumCommitted)]),
            num_acked: read_u64(&buf[layout.range(RowField::NumAcked)]),
            wedged: buf[layout.range(RowField::Wedged).start] != 0,
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(bytes);
    u64::from_le_bytes(raw)
}
