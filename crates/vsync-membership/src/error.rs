//! Error types for the membership agreement engine.

use thiserror::Error;
use vsync_sst::SstError;
use vsync_types::{EpochId, NodeId};
use vsync_view::{PersistenceError, ViewError};

use crate::transport::TransportError;

/// Errors surfaced by the agreement engine and the view manager.
///
/// Query failures (`View`, `Sst`) are recoverable: retry on the next poll.
/// The variants reported by [`MembershipError::is_fatal`] mean this node
/// must stop driving the protocol.
#[derive(Debug, Error)]
pub enum MembershipError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error("shared state table: {0}")]
    Sst(#[from] SstError),

    /// The transport could not guarantee the old epoch is quiescent.
    #[error("transport could not wedge the epoch: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Two nodes were promoted to leader in the same epoch.
    #[error("leadership invariant violated in epoch {epoch}: promoted {nodes:?}")]
    LeadershipInvariantViolated { epoch: EpochId, nodes: Vec<NodeId> },

    /// This node is no longer in a majority partition.
    #[error("{failed} of {members} members failed; this node may be in a minority partition")]
    Partitioned { failed: usize, members: usize },

    /// A live peer suspects this node.
    #[error("expelled from the group: suspected by node {by}")]
    Expelled { by: NodeId },

    /// The change log has no free slot for another proposal this epoch.
    #[error("change log full ({capacity} entries)")]
    ChangeLogFull { capacity: usize },

    /// A join has already been proposed in this epoch.
    #[error("a join is already in progress for this epoch")]
    JoinPending,

    /// The epoch already holds a commit; the change waits for the next view.
    #[error("the epoch has a commit and takes no further changes")]
    EpochFrozen,

    #[error("node {0} is already a member")]
    AlreadyMember(NodeId),

    #[error("a node cannot suspect itself")]
    SelfSuspicion,

    /// Operation reserved for the leader.
    #[error("operation requires leadership")]
    NotLeader,

    /// A committed join entry has no joiner address.
    #[error("committed join of node {0} has no joiner address")]
    MissingJoinerAddress(NodeId),

    /// The table handed in does not belong to the current view.
    #[error("table has {rows} rows with local row {local}, view has {members} members with rank {rank}")]
    TableMismatch {
        rows: usize,
        local: usize,
        members: usize,
        rank: usize,
    },
}

impl MembershipError {
    /// Returns true if this node must stop participating.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LeadershipInvariantViolated { .. }
                | Self::Partitioned { .. }
                | Self::Expelled { .. }
                | Self::Transport(_)
                | Self::TableMismatch { .. }
        )
    }
}
