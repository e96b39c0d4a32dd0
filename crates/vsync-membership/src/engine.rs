//! The membership agreement engine.
//!
//! [`GroupMembership`] owns one node's [`View`] for the current epoch and
//! runs the agreement operations against the group-management table. The
//! table is never stored: every operation borrows it.
//!
//! # Row Protocol
//!
//! ```text
//! detect ──► suspect ──► propagate ──► merge ──► acknowledge ──► commit ──► wedge
//!   (local)   suspected[]  suspected[]   changes[]   num_acked    num_committed  wedged
//! ```
//!
//! Every node adopts suspicions it sees, proposes removal of every member it
//! believes failed, and adopts the longest change log it observes. The
//! leader commits the prefix every live member has acknowledged. A promoted
//! leader must first prove that each lower-ranked member's failure is
//! corroborated by every lower-ranked row.
//!
//! A commit count always travels with the entries it covers: followers take
//! it only from their leader's row, the leader only from live rows. Once a
//! row holds a commit it is frozen, so a view is installed only when every
//! live row has frozen on the same prefix. A promoted leader commits only
//! after every live row suspects all lower ranks; per-link FIFO delivery
//! then guarantees it has seen any commit those rows took from the old
//! leader.
//!
//! All operations are idempotent and monotonic: repeating a call with no new
//! input never regresses a counter or flips a flag back.

use vsync_sst::{GmsRow, RowField, SharedStateTable};
use vsync_types::{NodeAddress, NodeId};
use vsync_view::{Change, View, ViewError};

use crate::instrumentation::METRICS;
use crate::transport::Transport;
use crate::{MembershipConfig, MembershipError};

/// What one [`GroupMembership::merge_changes`] call did to the local row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// A longer log or a higher commit count was adopted from another row.
    pub adopted: bool,
    /// Failed members newly appended to the log.
    pub proposed: usize,
}

impl MergeOutcome {
    /// True if the local row was modified and published.
    pub fn changed(&self) -> bool {
        self.adopted || self.proposed > 0
    }
}

/// One node's membership state for the current epoch.
#[derive(Debug)]
pub struct GroupMembership {
    view: View,
    config: MembershipConfig,
    wedged: bool,
}

impl GroupMembership {
    /// Starts running `view`.
    ///
    /// The member that leads the view at the start of the epoch holds
    /// leadership without a promotion, so its latch is set here.
    pub fn new(mut view: View, config: MembershipConfig) -> Self {
        if view.am_i_leader() {
            view.commit_leadership();
        }
        Self {
            view,
            config,
            wedged: false,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn config(&self) -> &MembershipConfig {
        &self.config
    }

    /// True once this node has wedged the epoch.
    pub fn is_wedged(&self) -> bool {
        self.wedged
    }

    pub fn into_view(self) -> View {
        self.view
    }

    fn check_table<S: SharedStateTable + ?Sized>(&self, sst: &S) -> Result<(), MembershipError> {
        if sst.num_rows() != self.view.num_members() || sst.local_index() != self.view.my_rank() {
            return Err(MembershipError::TableMismatch {
                rows: sst.num_rows(),
                local: sst.local_index(),
                members: self.view.num_members(),
                rank: self.view.my_rank(),
            });
        }
        Ok(())
    }

    pub(crate) fn check_majority(&self) -> Result<(), MembershipError> {
        if self.config.require_majority && self.view.has_majority_failed() {
            METRICS.increment_partitions();
            tracing::warn!(
                epoch = %self.view.epoch_id(),
                failed = self.view.num_failed(),
                members = self.view.num_members(),
                "lost the majority; this node must stop"
            );
            return Err(MembershipError::Partitioned {
                failed: self.view.num_failed(),
                members: self.view.num_members(),
            });
        }
        Ok(())
    }

    // ========================================================================
    // Failure Detection
    // ========================================================================

    /// Records a failure reported by the local failure detector.
    ///
    /// Sets `suspected[rank]` in the local row, marks the member failed in
    /// the view, and publishes the suspicion vector. Returns true if anything
    /// changed.
    pub fn suspect<S: SharedStateTable + ?Sized>(
        &mut self,
        rank: usize,
        sst: &mut S,
    ) -> Result<bool, MembershipError> {
        self.check_table(sst)?;
        if rank == self.view.my_rank() {
            return Err(MembershipError::SelfSuspicion);
        }
        if rank >= self.view.num_members() {
            return Err(ViewError::NotFound(format!("rank {rank}")).into());
        }

        let row = sst.local_row_mut();
        let newly_suspected = !row.suspected[rank];
        row.suspected[rank] = true;
        let newly_failed = self.view.mark_failed(rank)?;

        if newly_suspected {
            sst.put_field(RowField::Suspected)?;
            METRICS.increment_suspicions();
            tracing::info!(
                epoch = %self.view.epoch_id(),
                rank,
                node = %self.view.members()[rank],
                "suspecting member"
            );
        }
        self.check_majority()?;
        Ok(newly_suspected || newly_failed)
    }

    /// Adopts every suspicion published by a live member.
    ///
    /// Returns the number of suspicions newly copied into the local row.
    /// Fails with [`MembershipError::Expelled`] if a live member suspects
    /// this node, and with [`MembershipError::Partitioned`] once half the
    /// group is failed (when a majority is required).
    pub fn propagate_suspicions<S: SharedStateTable + ?Sized>(
        &mut self,
        sst: &mut S,
    ) -> Result<usize, MembershipError> {
        self.check_table(sst)?;
        let me = self.view.my_rank();
        let mut adopted = 0usize;

        for r in 0..self.view.num_members() {
            if r == me || self.view.is_failed(r) {
                continue;
            }
            let row = sst.row(r)?;
            if row.suspected[me] {
                let by = self.view.members()[r];
                tracing::error!(epoch = %self.view.epoch_id(), %by, "suspected by a live member");
                return Err(MembershipError::Expelled { by });
            }
            for (target, suspected) in row.suspected.iter().enumerate() {
                if !*suspected || target == me {
                    continue;
                }
                let local = sst.local_row_mut();
                if !local.suspected[target] {
                    local.suspected[target] = true;
                    adopted += 1;
                }
                self.view.mark_failed(target)?;
            }
        }

        if adopted > 0 {
            sst.put_field(RowField::Suspected)?;
            METRICS.add_suspicions_adopted(adopted as u64);
            tracing::debug!(
                epoch = %self.view.epoch_id(),
                adopted,
                failed = self.view.num_failed(),
                "adopted suspicions"
            );
        }
        self.check_majority()?;
        Ok(adopted)
    }

    // ========================================================================
    // Change Log
    // ========================================================================

    /// True once the local row holds a commit. A frozen row never changes
    /// its log or counters again in this epoch.
    pub fn is_frozen<S: SharedStateTable + ?Sized>(&self, sst: &S) -> bool {
        sst.local_row().num_committed > 0
    }

    /// Merges change logs and proposes removal of locally failed members.
    ///
    /// 1. Adopts any row's log that is longer than the local one.
    /// 2. Adopts the highest commit count offered, together with the
    ///    entries it covers. A follower only takes it from its leader's row;
    ///    the leader takes it from any live row.
    /// 3. Appends every failed member not already in the log, unless the
    ///    row is now frozen.
    /// 4. Publishes the span from `changes` through `num_committed`, if
    ///    anything changed.
    ///
    /// A frozen row is left untouched. Returns
    /// [`MembershipError::ChangeLogFull`] without appending if the proposals
    /// would overwrite an uncommitted entry.
    pub fn merge_changes<S: SharedStateTable + ?Sized>(
        &mut self,
        sst: &mut S,
    ) -> Result<MergeOutcome, MembershipError> {
        self.check_table(sst)?;
        let mut outcome = MergeOutcome::default();
        if self.is_frozen(sst) {
            return Ok(outcome);
        }
        let me = self.view.my_rank();

        for r in 0..self.view.num_members() {
            if r == me {
                continue;
            }
            let other = sst.row(r)?;
            let mine = sst.local_row_mut();
            if other.num_changes > mine.num_changes {
                mine.changes = other.changes;
                mine.num_changes = other.num_changes;
                mine.joiner_address = other.joiner_address;
                outcome.adopted = true;
            }
        }

        let sources: Vec<usize> = if self.view.am_i_leader() {
            self.view.live_ranks().filter(|r| *r != me).collect()
        } else {
            vec![self.view.rank_of_leader()?]
        };
        let mut best: Option<GmsRow> = None;
        for r in sources {
            let row = sst.row(r)?;
            let floor = best.as_ref().map_or(0, |b| b.num_committed);
            if row.num_committed > floor {
                best = Some(row);
            }
        }
        if let Some(source) = best {
            sst.local_row_mut().adopt_commit(&source);
            outcome.adopted = true;
            tracing::info!(
                epoch = %self.view.epoch_id(),
                num_committed = source.num_committed,
                "adopted commit"
            );
            sst.put_span(RowField::Changes, RowField::NumCommitted)?;
            return Ok(outcome);
        }

        let proposals: Vec<NodeId> = {
            let mine = sst.local_row();
            self.view
                .failed()
                .iter()
                .zip(self.view.members())
                .filter(|(failed, id)| **failed && !logged(mine, **id))
                .map(|(_, id)| *id)
                .collect()
        };

        if !proposals.is_empty() {
            let mine = sst.local_row_mut();
            let capacity = mine.capacity();
            if mine.pending_count() + proposals.len() as u64 > capacity as u64 {
                if outcome.adopted {
                    sst.put_span(RowField::Changes, RowField::NumCommitted)?;
                }
                tracing::warn!(
                    epoch = %self.view.epoch_id(),
                    capacity,
                    waiting = proposals.len(),
                    "change log full"
                );
                return Err(MembershipError::ChangeLogFull { capacity });
            }
            for id in &proposals {
                let appended = mine.push_change(*id);
                debug_assert!(appended, "capacity was checked");
            }
            outcome.proposed = proposals.len();
            METRICS.add_proposals(proposals.len() as u64);
            tracing::info!(
                epoch = %self.view.epoch_id(),
                proposed = ?proposals,
                num_changes = mine.num_changes,
                "proposed removals"
            );
        }

        debug_assert!(sst.local_row().num_committed <= sst.local_row().num_changes);
        if outcome.changed() {
            sst.put_span(RowField::Changes, RowField::NumCommitted)?;
        }
        Ok(outcome)
    }

    /// Acknowledges every change in the local log.
    ///
    /// Returns true if `num_acked` advanced. A frozen row acknowledges
    /// nothing.
    pub fn acknowledge<S: SharedStateTable + ?Sized>(
        &mut self,
        sst: &mut S,
    ) -> Result<bool, MembershipError> {
        self.check_table(sst)?;
        let row = sst.local_row_mut();
        if row.num_committed > 0 || row.num_acked >= row.num_changes {
            return Ok(false);
        }
        row.num_acked = row.num_changes;
        sst.put_field(RowField::NumAcked)?;
        Ok(true)
    }

    /// Commits the prefix of the log every live member has acknowledged.
    ///
    /// Leader only, and at most once per epoch: a frozen row commits
    /// nothing more. A promoted leader waits until every live row suspects
    /// all lower ranks. The commit never exceeds the local `num_changes`.
    /// Returns true if it advanced.
    pub fn leader_commit<S: SharedStateTable + ?Sized>(
        &mut self,
        sst: &mut S,
    ) -> Result<bool, MembershipError> {
        self.check_table(sst)?;
        if !self.view.am_i_leader() {
            return Err(MembershipError::NotLeader);
        }
        if self.is_frozen(sst) {
            return Ok(false);
        }

        let me = self.view.my_rank();
        let mut min_acked = sst.local_row().num_acked;
        for r in self.view.live_ranks().filter(|r| *r != me) {
            let row = sst.row(r)?;
            if row.suspected[..me].iter().any(|s| !*s) {
                return Ok(false);
            }
            min_acked = min_acked.min(row.num_acked);
        }

        let row = sst.local_row_mut();
        let target = min_acked.min(row.num_changes);
        if target <= row.num_committed {
            return Ok(false);
        }
        row.num_committed = target;
        sst.put_field(RowField::NumCommitted)?;
        tracing::info!(
            epoch = %self.view.epoch_id(),
            num_committed = target,
            "committed changes"
        );
        Ok(true)
    }

    /// Proposes adding `node` at `address` to the next view.
    ///
    /// Leader only. At most one join may be proposed per epoch, and none
    /// once the epoch holds a commit.
    pub fn propose_join<S: SharedStateTable + ?Sized>(
        &mut self,
        node: NodeId,
        address: NodeAddress,
        sst: &mut S,
    ) -> Result<(), MembershipError> {
        self.check_table(sst)?;
        if !self.view.am_i_leader() {
            return Err(MembershipError::NotLeader);
        }
        if self.view.members().contains(&node) {
            return Err(MembershipError::AlreadyMember(node));
        }
        if self.is_frozen(sst) {
            return Err(MembershipError::EpochFrozen);
        }

        let members = self.view.members();
        let row = sst.local_row_mut();
        let join_logged = (0..row.num_changes)
            .filter_map(|i| row.change_at(i))
            .any(|id| !members.contains(&id));
        if join_logged || row.joiner_address.is_some() {
            return Err(MembershipError::JoinPending);
        }
        if !row.push_change(node) {
            return Err(MembershipError::ChangeLogFull {
                capacity: row.capacity(),
            });
        }
        row.joiner_address = Some(address);
        sst.put_span(RowField::Changes, RowField::NumCommitted)?;

        METRICS.add_proposals(1);
        tracing::info!(epoch = %self.view.epoch_id(), %node, "proposed join");
        Ok(())
    }

    /// Decodes the committed prefix of the local log.
    pub fn committed_changes<S: SharedStateTable + ?Sized>(
        &self,
        sst: &S,
    ) -> Result<Vec<Change>, MembershipError> {
        decode_changes(&self.view, sst.local_row())
    }

    /// Decodes the committed prefix of the leader's log.
    ///
    /// Every survivor derives its successor from the same row, so this is
    /// what installation uses.
    pub fn agreed_changes<S: SharedStateTable + ?Sized>(
        &self,
        sst: &S,
    ) -> Result<Vec<Change>, MembershipError> {
        let leader = self.view.rank_of_leader()?;
        if leader == self.view.my_rank() {
            return self.committed_changes(sst);
        }
        decode_changes(&self.view, &sst.row(leader)?)
    }

    /// The leader's committed changes, once every live row has frozen on
    /// the same prefix. `None` while any live row disagrees or has not
    /// committed.
    pub fn unanimous_changes<S: SharedStateTable + ?Sized>(
        &self,
        sst: &S,
    ) -> Result<Option<Vec<Change>>, MembershipError> {
        let leader = sst.row(self.view.rank_of_leader()?)?;
        if leader.num_committed == 0 {
            return Ok(None);
        }
        let agreed = decode_changes(&self.view, &leader)?;
        for r in self.view.live_ranks() {
            let row = sst.row(r)?;
            if row.num_committed != leader.num_committed
                || decode_changes(&self.view, &row)? != agreed
            {
                return Ok(None);
            }
        }
        Ok(Some(agreed))
    }

    // ========================================================================
    // Leadership
    // ========================================================================

    /// Returns true exactly once, when this node takes over leadership.
    ///
    /// Every lower-ranked member must be failed locally or suspected by
    /// every lower-ranked row. On promotion those members are marked failed
    /// (their failure is corroborated) and the leadership latch is set.
    pub fn is_new_leader<S: SharedStateTable + ?Sized>(
        &mut self,
        sst: &S,
    ) -> Result<bool, MembershipError> {
        self.check_table(sst)?;
        if self.view.leader_committed() {
            return Ok(false);
        }

        let me = self.view.my_rank();
        let lower: Vec<GmsRow> = (0..me).map(|r| sst.row(r)).collect::<Result<_, _>>()?;
        for n in 0..me {
            for row in &lower {
                if !self.view.is_failed(n) && !row.suspected[n] {
                    return Ok(false);
                }
            }
        }

        self.view.commit_leadership();
        for n in 0..me {
            self.view.mark_failed(n)?;
        }
        METRICS.increment_promotions();
        tracing::info!(
            epoch = %self.view.epoch_id(),
            rank = me,
            node = %self.view.my_id(),
            "promoted to leader"
        );
        Ok(true)
    }

    // ========================================================================
    // Epoch Fencing
    // ========================================================================

    /// Fences the epoch: wedges the transport, then publishes `wedged`.
    ///
    /// If the transport fails the flag stays clear and the error is
    /// returned. Later calls are no-ops.
    pub fn wedge<T, S>(&mut self, transport: &mut T, sst: &mut S) -> Result<(), MembershipError>
    where
        T: Transport + ?Sized,
        S: SharedStateTable + ?Sized,
    {
        self.check_table(sst)?;
        if self.wedged {
            return Ok(());
        }
        transport.wedge()?;
        sst.local_row_mut().wedged = true;
        sst.put_field(RowField::Wedged)?;
        self.wedged = true;

        METRICS.increment_wedges();
        tracing::info!(epoch = %self.view.epoch_id(), "wedged epoch");
        Ok(())
    }
}

/// True if `id` appears anywhere in the row's log.
fn logged(row: &GmsRow, id: NodeId) -> bool {
    let oldest = row.num_changes.saturating_sub(row.capacity() as u64);
    (oldest..row.num_changes).any(|i| row.change_at(i) == Some(id))
}

fn decode_changes(view: &View, row: &GmsRow) -> Result<Vec<Change>, MembershipError> {
    let oldest = row.num_changes.saturating_sub(row.capacity() as u64);
    if oldest > 0 {
        // Committed entries were overwritten before the view was installed.
        return Err(MembershipError::ChangeLogFull {
            capacity: row.capacity(),
        });
    }

    let mut changes = Vec::with_capacity(row.num_committed as usize);
    for index in 0..row.num_committed {
        let Some(node) = row.change_at(index) else {
            continue;
        };
        if view.members().contains(&node) {
            changes.push(Change::Remove(node));
        } else {
            let address = row
                .joiner_address
                .clone()
                .ok_or(MembershipError::MissingJoinerAddress(node))?;
            changes.push(Change::Join { node, address });
        }
    }
    Ok(changes)
}
