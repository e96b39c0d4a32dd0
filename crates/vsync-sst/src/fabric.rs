//! In-process replicated table.
//!
//! [`LocalFabric`] holds one replica of every row for every member, as raw
//! bytes, exactly as a one-sided-write transport would. A push copies a byte
//! range of the writer's row into the writer's slot at every other replica,
//! either immediately or through per-link FIFO queues that tests drain in
//! any order they like (preserving per-sender ordering on each link).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;

use crate::{GmsRow, RowLayout, SharedStateTable, SstError};

/// How pushes reach remote replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Pushes land at every replica before `put` returns.
    #[default]
    Immediate,
    /// Pushes wait in per-link queues until delivered explicitly.
    Queued,
}

#[derive(Debug)]
struct PendingWrite {
    offset: usize,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct FabricState {
    layout: RowLayout,
    mode: DeliveryMode,
    /// `replicas[observer][row]`: the bytes of `row` as `observer` sees them.
    replicas: Vec<Vec<Vec<u8>>>,
    /// `links[from * n + to]`: writes from `from` not yet applied at `to`.
    links: Vec<VecDeque<PendingWrite>>,
    connected: Vec<bool>,
}

impl FabricState {
    fn n(&self) -> usize {
        self.layout.num_members()
    }

    fn apply(&mut self, from: usize, to: usize, write: &PendingWrite) {
        let end = write.offset + write.bytes.len();
        self.replicas[to][from][write.offset..end].copy_from_slice(&write.bytes);
    }

    fn deliver_front(&mut self, link: usize) -> bool {
        let n = self.n();
        match self.links[link].pop_front() {
            Some(write) => {
                self.apply(link / n, link % n, &write);
                true
            }
            None => false,
        }
    }
}

/// An in-process shared state table for a whole group.
///
/// Cloning is cheap; all clones share the same replicas.
#[derive(Debug, Clone)]
pub struct LocalFabric {
    state: Arc<Mutex<FabricState>>,
}

impl LocalFabric {
    /// Creates a fabric with all-zero rows for `layout.num_members()` members.
    pub fn new(layout: RowLayout, mode: DeliveryMode) -> Self {
        let n = layout.num_members();
        let zero = GmsRow::new(&layout).encode(&layout);
        let state = FabricState {
            layout,
            mode,
            replicas: vec![vec![zero; n]; n],
            links: (0..n * n).map(|_| VecDeque::new()).collect(),
            connected: vec![true; n],
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FabricState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn layout(&self) -> RowLayout {
        self.lock().layout
    }

    /// Returns the table handle for member `index`.
    pub fn handle(&self, index: usize) -> Result<SstHandle, SstError> {
        let layout = self.layout();
        if index >= layout.num_members() {
            return Err(SstError::RowIndex {
                index,
                rows: layout.num_members(),
            });
        }
        Ok(SstHandle {
            fabric: self.clone(),
            index,
            layout,
            local: GmsRow::new(&layout),
        })
    }

    /// Number of writes waiting in link queues.
    pub fn pending(&self) -> usize {
        self.lock().links.iter().map(VecDeque::len).sum()
    }

    /// Delivers every queued write. Returns how many were applied.
    pub fn deliver_all(&self) -> usize {
        let mut state = self.lock();
        let mut delivered = 0;
        for link in 0..state.links.len() {
            while state.deliver_front(link) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Delivers the oldest queued write on the `from -> to` link.
    pub fn deliver_link(&self, from: usize, to: usize) -> bool {
        let mut state = self.lock();
        let n = state.n();
        if from >= n || to >= n {
            return false;
        }
        state.deliver_front(from * n + to)
    }

    /// Delivers up to `max` writes, each from a randomly chosen non-empty link.
    pub fn deliver_random<R: Rng>(&self, rng: &mut R, max: usize) -> usize {
        let mut state = self.lock();
        let mut delivered = 0;
        while delivered < max {
            let busy: Vec<usize> = (0..state.links.len())
                .filter(|l| !state.links[*l].is_empty())
                .collect();
            if busy.is_empty() {
                break;
            }
            let link = busy[rng.gen_range(0..busy.len())];
            state.deliver_front(link);
            delivered += 1;
        }
        delivered
    }

    /// Cuts member `index` off the fabric, as a crash would.
    ///
    /// Its queued writes are dropped in both directions and further pushes
    /// fail. What others already received stays visible to them.
    pub fn disconnect(&self, index: usize) {
        let mut state = self.lock();
        let n = state.n();
        if index >= n {
            return;
        }
        state.connected[index] = false;
        for other in 0..n {
            state.links[index * n + other].clear();
            state.links[other * n + index].clear();
        }
        tracing::debug!(replica = index, "replica disconnected from fabric");
    }

    pub fn is_connected(&self, index: usize) -> bool {
        self.lock().connected.get(index).copied().unwrap_or(false)
    }
}

/// One member's handle onto a [`LocalFabric`].
///
/// Owns the authoritative copy of the local row; remote rows are decoded
/// from this member's replica on every read.
#[derive(Debug)]
pub struct SstHandle {
    fabric: LocalFabric,
    index: usize,
    layout: RowLayout,
    local: GmsRow,
}

impl SstHandle {
    pub fn fabric(&self) -> &LocalFabric {
        &self.fabric
    }
}

impl SharedStateTable for SstHandle {
    fn layout(&self) -> &RowLayout {
        &self.layout
    }

    fn local_index(&self) -> usize {
        self.index
    }

    fn row(&self, index: usize) -> Result<GmsRow, SstError> {
        if index == self.index {
            return Ok(self.local.clone());
        }
        let state = self.fabric.lock();
        let replica = state
            .replicas
            .get(self.index)
            .and_then(|rows| rows.get(index))
            .ok_or(SstError::RowIndex {
                index,
                rows: state.n(),
            })?;
        GmsRow::decode(&self.layout, replica)
    }

    fn local_row(&self) -> &GmsRow {
        &self.local
    }

    fn local_row_mut(&mut self) -> &mut GmsRow {
        &mut self.local
    }

    fn put(&mut self, offset: usize, len: usize) -> Result<(), SstError> {
        let range = self.layout.check_range(offset, len)?;
        let encoded = self.local.encode(&self.layout);
        let bytes = &encoded[range.clone()];

        let mut state = self.fabric.lock();
        if !state.connected[self.index] {
            return Err(SstError::Disconnected { index: self.index });
        }

        let n = state.n();
        let mode = state.mode;
        let from = self.index;
        state.replicas[from][from][range].copy_from_slice(bytes);
        for to in (0..n).filter(|to| *to != from) {
            if !state.connected[to] {
                continue;
            }
            let write = PendingWrite {
                offset,
                bytes: bytes.to_vec(),
            };
            match mode {
                DeliveryMode::Immediate => state.apply(from, to, &write),
                DeliveryMode::Queued => state.links[from * n + to].push_back(write),
            }
        }

        tracing::trace!(replica = from, offset, len, "pushed row range");
        Ok(())
    }
}
