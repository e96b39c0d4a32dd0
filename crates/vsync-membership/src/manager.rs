//! The per-node poll driver.
//!
//! A node's single polling thread calls [`ViewManager::poll`] in a loop.
//! Each call runs one agreement cycle and, once the epoch is wedged
//! everywhere it needs to be, derives, persists, and installs the successor
//! view:
//!
//! ```text
//!   propagate ─► merge ─► promote? ─► ack ─► commit (leader) ─► wedge ─► install
//! ```
//!
//! After [`PollOutcome::Installed`] the manager runs the new view; the caller
//! must switch to a table laid out by [`ViewManager::layout`].

use vsync_io::{IoBackend, SyncBackend};
use vsync_sst::{RowLayout, SharedStateTable};
use vsync_types::EpochId;
use vsync_view::{Change, View, ViewStore};

use crate::instrumentation::METRICS;
use crate::transport::Transport;
use crate::{GroupMembership, MembershipConfig, MembershipError, WedgePolicy};

/// Progress summary of an epoch that has not been replaced yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollStatus {
    pub epoch: EpochId,
    pub leader_rank: usize,
    pub num_changes: u64,
    pub num_committed: u64,
    pub wedged: bool,
    /// Live rows (this one included) that report `wedged`.
    pub wedged_rows: usize,
    pub live_rows: usize,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The epoch is still running or still reconfiguring.
    Pending(PollStatus),
    /// A successor view was persisted and installed.
    Installed(View),
    /// The committed changes removed this node.
    Evicted { epoch: EpochId },
}

/// Drives one node's membership through successive epochs.
#[derive(Debug)]
pub struct ViewManager<B: IoBackend = SyncBackend> {
    engine: GroupMembership,
    store: ViewStore<B>,
    promoted_in: Option<EpochId>,
    evicted_in: Option<EpochId>,
}

impl<B: IoBackend> ViewManager<B> {
    pub fn new(view: View, config: MembershipConfig, store: ViewStore<B>) -> Self {
        Self {
            engine: GroupMembership::new(view, config),
            store,
            promoted_in: None,
            evicted_in: None,
        }
    }

    /// Resumes from the view in `store`, or returns `None` if it holds none.
    pub fn recover(store: ViewStore<B>, config: MembershipConfig) -> Result<Option<Self>, MembershipError> {
        Ok(store.load()?.map(|view| Self::new(view, config, store)))
    }

    pub fn engine(&self) -> &GroupMembership {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut GroupMembership {
        &mut self.engine
    }

    pub fn view(&self) -> &View {
        self.engine.view()
    }

    pub fn store(&self) -> &ViewStore<B> {
        &self.store
    }

    /// Layout of the table the current view runs on.
    pub fn layout(&self) -> Result<RowLayout, MembershipError> {
        Ok(self.engine.config().layout_for(self.engine.view())?)
    }

    /// Epoch in which this node was last promoted, cleared by the call.
    pub fn take_promotion(&mut self) -> Option<EpochId> {
        self.promoted_in.take()
    }

    /// Forwards a local failure-detector report.
    pub fn report_failure<S: SharedStateTable + ?Sized>(
        &mut self,
        rank: usize,
        sst: &mut S,
    ) -> Result<bool, MembershipError> {
        self.engine.suspect(rank, sst)
    }

    /// Runs one agreement cycle.
    pub fn poll<T, S>(&mut self, transport: &mut T, sst: &mut S) -> Result<PollOutcome, MembershipError>
    where
        T: Transport + ?Sized,
        S: SharedStateTable + ?Sized,
    {
        if let Some(epoch) = self.evicted_in {
            return Ok(PollOutcome::Evicted { epoch });
        }
        METRICS.increment_polls();

        self.engine.propagate_suspicions(sst)?;
        if !self.engine.is_wedged() {
            self.engine.merge_changes(sst)?;
        }

        if self.engine.is_new_leader(sst)? {
            let view = self.engine.view();
            let leader = view.rank_of_leader()?;
            if leader != view.my_rank() {
                let nodes = vec![view.members()[leader], view.my_id()];
                tracing::error!(epoch = %view.epoch_id(), ?nodes, "promoted while another member leads");
                return Err(MembershipError::LeadershipInvariantViolated {
                    epoch: view.epoch_id(),
                    nodes,
                });
            }
            self.promoted_in = Some(view.epoch_id());
        }

        if !self.engine.is_wedged() {
            self.engine.acknowledge(sst)?;
            if self.engine.view().am_i_leader() {
                self.engine.leader_commit(sst)?;
            }
        }

        if sst.local_row().num_committed > 0 {
            self.engine.wedge(transport, sst)?;
        }

        if self.engine.is_wedged() {
            if let Some(outcome) = self.try_install(sst)? {
                return Ok(outcome);
            }
        }

        let status = self.status(sst)?;
        tracing::debug!(
            epoch = %status.epoch,
            leader = status.leader_rank,
            num_changes = status.num_changes,
            num_committed = status.num_committed,
            wedged_rows = status.wedged_rows,
            live_rows = status.live_rows,
            "poll pending"
        );
        Ok(PollOutcome::Pending(status))
    }

    fn status<S: SharedStateTable + ?Sized>(&self, sst: &S) -> Result<PollStatus, MembershipError> {
        let view = self.engine.view();
        let mut wedged_rows = 0;
        let mut live_rows = 0;
        for r in view.live_ranks() {
            live_rows += 1;
            if sst.row(r)?.wedged {
                wedged_rows += 1;
            }
        }
        let local = sst.local_row();
        Ok(PollStatus {
            epoch: view.epoch_id(),
            leader_rank: view.rank_of_leader()?,
            num_changes: local.num_changes,
            num_committed: local.num_committed,
            wedged: self.engine.is_wedged(),
            wedged_rows,
            live_rows,
        })
    }

    /// Installs the successor once every live row has frozen on the
    /// leader's committed prefix and, under [`WedgePolicy::AllLive`], every
    /// live member has wedged.
    fn try_install<S: SharedStateTable + ?Sized>(
        &mut self,
        sst: &S,
    ) -> Result<Option<PollOutcome>, MembershipError> {
        self.engine.check_majority()?;
        let view = self.engine.view();
        let me = view.my_rank();

        if self.engine.config().wedge_policy == WedgePolicy::AllLive {
            for r in view.live_ranks().filter(|r| *r != me) {
                if !sst.row(r)?.wedged {
                    return Ok(None);
                }
            }
        }
        let Some(changes) = self.engine.unanimous_changes(sst)? else {
            return Ok(None);
        };

        let epoch = view.epoch_id();
        if changes.contains(&Change::Remove(view.my_id())) {
            tracing::warn!(%epoch, node = %view.my_id(), "removed by the committed changes");
            self.evicted_in = Some(epoch);
            return Ok(Some(PollOutcome::Evicted { epoch }));
        }

        let next = view.successor(&changes)?;
        self.store.save(&next)?;

        METRICS.record_view_installed(next.epoch_id().as_u64(), next.num_members());
        tracing::info!(
            epoch = %next.epoch_id(),
            members = next.num_members(),
            rank = next.my_rank(),
            changes = changes.len(),
            "installed view"
        );

        let config = self.engine.config().clone();
        self.engine = GroupMembership::new(next.clone(), config);
        Ok(Some(PollOutcome::Installed(next)))
    }
}
