//! Cross-node record of leader promotions.

use std::collections::BTreeMap;

use vsync_types::{EpochId, NodeId};

use crate::MembershipError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    node: NodeId,
    released: bool,
}

/// Every `(epoch, node)` promotion observed across a group.
///
/// A node that returns true from
/// [`GroupMembership::is_new_leader`](crate::GroupMembership::is_new_leader)
/// records a claim here. An epoch may see several promotions when leaders
/// crash one after another, but a new claim while an earlier claimant still
/// runs is a safety violation.
#[derive(Debug, Default, Clone)]
pub struct LeaderClaims {
    claims: BTreeMap<EpochId, Vec<Claim>>,
}

impl LeaderClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `node` was promoted in `epoch`.
    ///
    /// Re-recording the same claim is harmless.
    pub fn record(&mut self, epoch: EpochId, node: NodeId) -> Result<(), MembershipError> {
        let claims = self.claims.entry(epoch).or_default();
        if claims.iter().any(|c| c.node == node) {
            return Ok(());
        }
        if let Some(holder) = claims.iter().find(|c| !c.released) {
            let nodes = vec![holder.node, node];
            tracing::error!(%epoch, ?nodes, "two leaders promoted in one epoch");
            return Err(MembershipError::LeadershipInvariantViolated { epoch, nodes });
        }
        claims.push(Claim {
            node,
            released: false,
        });
        Ok(())
    }

    /// Marks every claim held by `node` as given up, after it crashed.
    pub fn release(&mut self, node: NodeId) {
        for claim in self.claims.values_mut().flatten() {
            if claim.node == node {
                claim.released = true;
            }
        }
    }

    /// The node promoted last in `epoch`, if any.
    pub fn leader_of(&self, epoch: EpochId) -> Option<NodeId> {
        self.claims.get(&epoch)?.last().map(|c| c.node)
    }

    /// Every node promoted in `epoch`, in promotion order.
    pub fn promoted_in(&self, epoch: EpochId) -> Vec<NodeId> {
        self.claims
            .get(&epoch)
            .map(|claims| claims.iter().map(|c| c.node).collect())
            .unwrap_or_default()
    }

    /// Total number of promotions recorded.
    pub fn len(&self) -> usize {
        self.claims.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_running_claim_per_epoch() {
        let mut claims = LeaderClaims::new();
        claims.record(EpochId::new(1), NodeId::new(2)).unwrap();
        claims.record(EpochId::new(1), NodeId::new(2)).unwrap();
        claims.record(EpochId::new(2), NodeId::new(3)).unwrap();
        assert_eq!(claims.len(), 2);
        assert_eq!(claims.leader_of(EpochId::new(1)), Some(NodeId::new(2)));

        match claims.record(EpochId::new(1), NodeId::new(4)) {
            Err(MembershipError::LeadershipInvariantViolated { epoch, nodes }) => {
                assert_eq!(epoch, EpochId::new(1));
                assert_eq!(nodes, vec![NodeId::new(2), NodeId::new(4)]);
            }
            other => panic!("expected violation, got {other:?}"),
        }
    }

    #[test]
    fn crashed_leader_can_be_succeeded() {
        let mut claims = LeaderClaims::new();
        claims.record(EpochId::ZERO, NodeId::new(1)).unwrap();
        claims.release(NodeId::new(1));
        claims.record(EpochId::ZERO, NodeId::new(2)).unwrap();

        assert_eq!(claims.leader_of(EpochId::ZERO), Some(NodeId::new(2)));
        assert_eq!(
            claims.promoted_in(EpochId::ZERO),
            vec![NodeId::new(1), NodeId::new(2)]
        );
        assert!(claims.record(EpochId::ZERO, NodeId::new(3)).is_err());
    }
}
