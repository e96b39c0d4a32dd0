//! The view data model and its queries.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use vsync_types::{EpochId, NodeAddress, NodeId};

use crate::ViewError;

// ============================================================================
// Changes
// ============================================================================

/// One committed membership change, applied when deriving a successor view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    /// The member leaves (it failed or departed).
    Remove(NodeId),
    /// A new member joins at the given address.
    Join { node: NodeId, address: NodeAddress },
}

impl Change {
    /// The node the change refers to.
    pub fn node(&self) -> NodeId {
        match self {
            Self::Remove(node) | Self::Join { node, .. } => *node,
        }
    }
}

// ============================================================================
// View
// ============================================================================

/// The agreed membership descriptor for one epoch.
///
/// # Invariants
///
/// - `members`, `member_addresses` and `failed` have the same length
/// - `my_rank < members.len()`
/// - `num_failed == failed.iter().filter(|f| **f).count()`
/// - at least one rank is not failed
///
/// Every constructor and mutator upholds these; deserialized views must be
/// checked with [`View::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    epoch_id: EpochId,
    members: Vec<NodeId>,
    member_addresses: Vec<NodeAddress>,
    failed: Vec<bool>,
    num_failed: usize,
    my_rank: usize,
    /// One-shot latch: this node has irrevocably assumed leadership.
    ///
    /// Per-epoch runtime state, never persisted.
    #[serde(skip)]
    leader_committed: bool,
    changed_member: Option<NodeId>,
}

impl View {
    /// Creates the founding view (epoch 0) of a group.
    ///
    /// `members` is in rank order; `me` must be among them.
    pub fn initial(members: Vec<(NodeId, NodeAddress)>, me: NodeId) -> Result<Self, ViewError> {
        let my_rank = members
            .iter()
            .position(|(id, _)| *id == me)
            .ok_or_else(|| ViewError::NotFound(format!("node {me}")))?;
        let (members, member_addresses): (Vec<_>, Vec<_>) = members.into_iter().unzip();
        let failed = vec![false; members.len()];
        Self::from_parts(
            EpochId::ZERO,
            members,
            member_addresses,
            failed,
            my_rank,
            None,
        )
    }

    /// Assembles a view from its parts, checking every invariant.
    pub fn from_parts(
        epoch_id: EpochId,
        members: Vec<NodeId>,
        member_addresses: Vec<NodeAddress>,
        failed: Vec<bool>,
        my_rank: usize,
        changed_member: Option<NodeId>,
    ) -> Result<Self, ViewError> {
        let num_failed = failed.iter().filter(|f| **f).count();
        let view = Self {
            epoch_id,
            members,
            member_addresses,
            failed,
            num_failed,
            my_rank,
            leader_committed: false,
            changed_member,
        };
        view.validate()?;
        Ok(view)
    }

    /// Checks the structural invariants.
    pub fn validate(&self) -> Result<(), ViewError> {
        let n = self.members.len();
        if n == 0 {
            return Err(ViewError::Invariant("view has no members".to_string()));
        }
        if self.member_addresses.len() != n || self.failed.len() != n {
            return Err(ViewError::Invariant(format!(
                "parallel vectors disagree: {} members, {} addresses, {} failure flags",
                n,
                self.member_addresses.len(),
                self.failed.len()
            )));
        }
        if self.my_rank >= n {
            return Err(ViewError::Invariant(format!(
                "my_rank {} out of range for {} members",
                self.my_rank, n
            )));
        }
        let counted = self.failed.iter().filter(|f| **f).count();
        if counted != self.num_failed {
            return Err(ViewError::Invariant(format!(
                "num_failed is {} but {} members are marked failed",
                self.num_failed, counted
            )));
        }
        if counted == n {
            return Err(ViewError::Invariant(
                "every member is marked failed".to_string(),
            ));
        }
        for (i, id) in self.members.iter().enumerate() {
            if id.as_u32() == NodeId::RESERVED {
                return Err(ViewError::Invariant(format!("node id {id} is reserved")));
            }
            if self.members[..i].contains(id) {
                return Err(ViewError::Invariant(format!("node {id} listed twice")));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn epoch_id(&self) -> EpochId {
        self.epoch_id
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn member_addresses(&self) -> &[NodeAddress] {
        &self.member_addresses
    }

    pub fn failed(&self) -> &[bool] {
        &self.failed
    }

    pub fn num_failed(&self) -> usize {
        self.num_failed
    }

    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    pub fn my_rank(&self) -> usize {
        self.my_rank
    }

    /// This node's id.
    pub fn my_id(&self) -> NodeId {
        self.members[self.my_rank]
    }

    pub fn leader_committed(&self) -> bool {
        self.leader_committed
    }

    pub fn changed_member(&self) -> Option<NodeId> {
        self.changed_member
    }

    /// Returns true if the member at `rank` is marked failed.
    ///
    /// Ranks outside the view are reported as failed.
    pub fn is_failed(&self, rank: usize) -> bool {
        self.failed.get(rank).copied().unwrap_or(true)
    }

    /// Ranks not marked failed, in order.
    pub fn live_ranks(&self) -> impl Iterator<Item = usize> + '_ {
        self.failed
            .iter()
            .enumerate()
            .filter(|(_, f)| !**f)
            .map(|(r, _)| r)
    }

    /// Returns true once at least half the members are marked failed, at
    /// which point the live members can no longer be sure they form the
    /// majority partition.
    pub fn has_majority_failed(&self) -> bool {
        self.num_failed * 2 >= self.members.len()
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// The lowest rank not marked failed.
    pub fn rank_of_leader(&self) -> Result<usize, ViewError> {
        self.live_ranks().next().ok_or(ViewError::NoLeader)
    }

    /// Rank of the member with id `who`.
    pub fn rank_of(&self, who: NodeId) -> Result<usize, ViewError> {
        self.members
            .iter()
            .position(|m| *m == who)
            .ok_or_else(|| ViewError::NotFound(format!("node {who}")))
    }

    /// Rank of the member listening on `address`.
    pub fn rank_of_address(&self, address: &NodeAddress) -> Result<usize, ViewError> {
        self.member_addresses
            .iter()
            .position(|a| a == address)
            .ok_or_else(|| ViewError::NotFound(format!("address {address}")))
    }

    /// True iff this node is the lowest-ranked live member.
    pub fn am_i_leader(&self) -> bool {
        self.rank_of_leader() == Ok(self.my_rank)
    }

    /// The changed member, if it is part of this view (it joined).
    pub fn joined(&self) -> Option<NodeId> {
        self.changed_member.filter(|who| self.members.contains(who))
    }

    /// The changed member, if it is not part of this view (it departed).
    pub fn departed(&self) -> Option<NodeId> {
        self.changed_member.filter(|who| !self.members.contains(who))
    }

    // ------------------------------------------------------------------------
    // Engine-owned mutation
    // ------------------------------------------------------------------------

    /// Marks `rank` failed. Returns false if it already was.
    ///
    /// Refuses to fail the last live member.
    pub fn mark_failed(&mut self, rank: usize) -> Result<bool, ViewError> {
        let n = self.members.len();
        let Some(flag) = self.failed.get_mut(rank) else {
            return Err(ViewError::NotFound(format!("rank {rank} of {n}")));
        };
        if *flag {
            return Ok(false);
        }
        if self.num_failed + 1 == n {
            return Err(ViewError::Invariant(format!(
                "failing rank {rank} would leave no live member"
            )));
        }
        *flag = true;
        self.num_failed += 1;
        Ok(true)
    }

    /// Latches leadership for the rest of the epoch.
    pub fn commit_leadership(&mut self) {
        self.leader_committed = true;
    }

    // ------------------------------------------------------------------------
    // Successor
    // ------------------------------------------------------------------------

    /// Derives the next view from this one plus the committed change set.
    ///
    /// Removals drop the member, joins append it. The successor has the next
    /// epoch, no failures, an unlatched leader flag, and records the last
    /// applied change as its changed member. Returns [`ViewError::NotFound`]
    /// if this node is removed by the changes and [`ViewError::Invariant`]
    /// if the epoch counter is exhausted.
    pub fn successor(&self, committed: &[Change]) -> Result<View, ViewError> {
        let mut members = self.members.clone();
        let mut addresses = self.member_addresses.clone();

        for change in committed {
            match change {
                Change::Remove(node) => {
                    if let Some(rank) = members.iter().position(|m| m == node) {
                        members.remove(rank);
                        addresses.remove(rank);
                    }
                }
                Change::Join { node, address } => {
                    if !members.contains(node) {
                        members.push(*node);
                        addresses.push(address.clone());
                    }
                }
            }
        }

        let me = self.my_id();
        let my_rank = members
            .iter()
            .position(|m| *m == me)
            .ok_or_else(|| ViewError::NotFound(format!("node {me} (removed from successor)")))?;
        let failed = vec![false; members.len()];
        let epoch = self.epoch_id.next().ok_or_else(|| {
            ViewError::Invariant(format!("epoch {} has no successor", self.epoch_id))
        })?;

        Self::from_parts(
            epoch,
            members,
            addresses,
            failed,
            my_rank,
            committed.last().map(Change::node),
        )
    }
}

impl Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View {}: MyRank={}. Members={{", self.epoch_id, self.my_rank)?;
        for m in &self.members {
            write!(f, " {m}")?;
        }
        write!(f, " }}, Failed={{")?;
        for failed in &self.failed {
            write!(f, " {}", if *failed { 'T' } else { 'F' })?;
        }
        write!(f, " }}, nFailed={}", self.num_failed)?;
        if let Some(departed) = self.departed() {
            write!(f, ", Departed: {departed}")?;
        }
        if let Some(joined) = self.joined() {
            write!(f, ", Joined: {joined}")?;
        }
        Ok(())
    }
}
