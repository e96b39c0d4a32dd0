//! In-process group simulation.
//!
//! [`SimulatedGroup`] runs a whole group on one [`LocalFabric`], one
//! [`ViewManager`] per member with in-memory view storage, and a
//! [`NullTransport`] per member. Crashes cut a member off the fabric; the
//! survivors' failure detectors are driven explicitly with
//! [`SimulatedGroup::detect_crashes`]. In [`DeliveryMode::Queued`] a seeded
//! RNG picks which pushes land after each round, so every schedule is
//! reproducible.

use rand::SeedableRng;
use rand::rngs::SmallRng;
use vsync_io::MemoryBackend;
use vsync_sst::{DeliveryMode, LocalFabric, SharedStateTable, SstHandle};
use vsync_types::{EpochId, NodeAddress, NodeId};
use vsync_view::{PersistenceError, View, ViewError, ViewStore};

use crate::transport::NullTransport;
use crate::{LeaderClaims, MembershipConfig, MembershipError, PollOutcome, ViewManager};

/// Where a simulated member stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Running,
    Crashed,
    Installed(View),
    Evicted(EpochId),
    /// Stopped on a fatal error.
    Stopped(String),
}

/// One simulated member.
#[derive(Debug)]
pub struct SimNode {
    id: NodeId,
    manager: ViewManager<MemoryBackend>,
    table: SstHandle,
    transport: NullTransport,
    state: NodeState,
}

impl SimNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn manager(&self) -> &ViewManager<MemoryBackend> {
        &self.manager
    }

    pub fn table(&self) -> &SstHandle {
        &self.table
    }

    pub fn transport(&self) -> &NullTransport {
        &self.transport
    }

    /// The view this member persisted last.
    pub fn stored_view(&self) -> Result<Option<View>, PersistenceError> {
        self.manager.store().load()
    }
}

/// A whole group driven round by round.
#[derive(Debug)]
pub struct SimulatedGroup {
    fabric: LocalFabric,
    nodes: Vec<SimNode>,
    claims: LeaderClaims,
    rng: SmallRng,
    deliveries_per_round: usize,
    rounds: u64,
}

impl SimulatedGroup {
    /// Builds a group of `size` members with ids `0..size`, all in epoch 0.
    pub fn new(
        size: u32,
        config: &MembershipConfig,
        mode: DeliveryMode,
        seed: u64,
    ) -> Result<Self, MembershipError> {
        let members = (0..size)
            .map(|i| {
                NodeAddress::new(format!("sim-{i}:7000"))
                    .map(|address| (NodeId::new(i), address))
                    .map_err(|e| ViewError::Invariant(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let first = View::initial(members.clone(), NodeId::new(0))?;
        let fabric = LocalFabric::new(config.layout_for(&first)?, mode);

        let mut nodes = Vec::with_capacity(members.len());
        for (rank, (id, _)) in members.iter().enumerate() {
            let view = View::initial(members.clone(), *id)?;
            let store = ViewStore::with_backend(MemoryBackend::new(), format!("/sim/{id}/view"));
            store.save(&view)?;
            nodes.push(SimNode {
                id: *id,
                manager: ViewManager::new(view, config.clone(), store),
                table: fabric.handle(rank)?,
                transport: NullTransport::new(),
                state: NodeState::Running,
            });
        }

        Ok(Self {
            fabric,
            deliveries_per_round: (members.len() * members.len()).max(1),
            nodes,
            claims: LeaderClaims::new(),
            rng: SmallRng::seed_from_u64(seed),
            rounds: 0,
        })
    }

    /// Caps how many queued pushes land after each round.
    pub fn with_deliveries_per_round(mut self, deliveries: usize) -> Self {
        self.deliveries_per_round = deliveries.max(1);
        self
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[SimNode] {
        &self.nodes
    }

    pub fn node(&self, rank: usize) -> Option<&SimNode> {
        self.nodes.get(rank)
    }

    pub fn fabric(&self) -> &LocalFabric {
        &self.fabric
    }

    pub fn claims(&self) -> &LeaderClaims {
        &self.claims
    }

    /// Rounds run so far.
    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    /// Crashes the member at `rank`. Nobody notices until
    /// [`detect_crashes`](Self::detect_crashes).
    pub fn crash(&mut self, rank: usize) {
        if let Some(node) = self.nodes.get_mut(rank) {
            self.fabric.disconnect(rank);
            node.state = NodeState::Crashed;
            self.claims.release(node.id);
            tracing::info!(rank, node = %node.id, "crashed member");
        }
    }

    /// Has `observer`'s failure detector report `failed`.
    pub fn report_failure(&mut self, observer: usize, failed: usize) -> Result<bool, MembershipError> {
        let node = self
            .nodes
            .get_mut(observer)
            .ok_or_else(|| ViewError::NotFound(format!("rank {observer}")))?;
        node.manager.report_failure(failed, &mut node.table)
    }

    /// Has the member at `leader` propose adding `node` at `address`.
    pub fn propose_join(
        &mut self,
        leader: usize,
        node: NodeId,
        address: NodeAddress,
    ) -> Result<(), MembershipError> {
        let sim = self
            .nodes
            .get_mut(leader)
            .ok_or_else(|| ViewError::NotFound(format!("rank {leader}")))?;
        sim.manager
            .engine_mut()
            .propose_join(node, address, &mut sim.table)
    }

    /// Every running member reports every crashed member.
    pub fn detect_crashes(&mut self) {
        let crashed: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.state == NodeState::Crashed)
            .map(|(rank, _)| rank)
            .collect();
        for node in self.nodes.iter_mut().filter(|n| n.state == NodeState::Running) {
            for rank in &crashed {
                if let Err(e) = node.manager.report_failure(*rank, &mut node.table) {
                    stop_on_fatal(node, &e);
                    if node.state != NodeState::Running {
                        break;
                    }
                }
            }
        }
    }

    /// Polls every running member once, then delivers queued pushes.
    ///
    /// Returns the number of members still running. A second leader in one
    /// epoch aborts the simulation.
    pub fn step(&mut self) -> Result<usize, MembershipError> {
        self.rounds += 1;
        for node in &mut self.nodes {
            if node.state != NodeState::Running {
                continue;
            }
            match node.manager.poll(&mut node.transport, &mut node.table) {
                Ok(PollOutcome::Pending(_)) => {}
                Ok(PollOutcome::Installed(view)) => node.state = NodeState::Installed(view),
                Ok(PollOutcome::Evicted { epoch }) => node.state = NodeState::Evicted(epoch),
                Err(e @ MembershipError::LeadershipInvariantViolated { .. }) => return Err(e),
                Err(e) => stop_on_fatal(node, &e),
            }
            if let Some(epoch) = node.manager.take_promotion() {
                self.claims.record(epoch, node.id)?;
            }
        }

        self.fabric
            .deliver_random(&mut self.rng, self.deliveries_per_round);
        Ok(self.running())
    }

    /// Steps until no member is running or `max_rounds` have passed.
    ///
    /// Returns true if every member settled.
    pub fn run(&mut self, max_rounds: u64) -> Result<bool, MembershipError> {
        for _ in 0..max_rounds {
            if self.step()? == 0 {
                return Ok(true);
            }
        }
        Ok(self.running() == 0)
    }

    pub fn running(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.state == NodeState::Running)
            .count()
    }

    /// Views installed so far, by member.
    pub fn installed(&self) -> Vec<(NodeId, &View)> {
        self.nodes
            .iter()
            .filter_map(|n| match &n.state {
                NodeState::Installed(view) => Some((n.id, view)),
                _ => None,
            })
            .collect()
    }

    /// Local change-log state of every running member, for convergence checks.
    pub fn logs(&self) -> Vec<(NodeId, Vec<Option<NodeId>>, u64, u64)> {
        self.nodes
            .iter()
            .filter(|n| n.state != NodeState::Crashed)
            .map(|n| {
                let row = n.table.local_row();
                (n.id, row.changes.clone(), row.num_changes, row.num_committed)
            })
            .collect()
    }
}

fn stop_on_fatal(node: &mut SimNode, error: &MembershipError) {
    if error.is_fatal() {
        tracing::warn!(node = %node.id, %error, "member stopped");
        node.state = NodeState::Stopped(error.to_string());
    } else {
        tracing::debug!(node = %node.id, %error, "poll failed; retrying next round");
    }
}
