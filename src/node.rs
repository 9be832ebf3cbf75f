//! Fog Node Context
//!
//! [`FogNode`] is built once at startup and handed to every component constructor;
//! there is no process-wide singleton.
//!
//! All mutable cluster state (ranking, peer map, flow registry) sits behind one
//! async mutex in [`ClusterState`]. Inbound requests and the heartbeat tick take the
//! lock for the duration of a state transition and never hold it across a network
//! call, so mutations are serialized the way a single event loop would serialize them.
//!
//! The local node appears twice: as `local` (what it knows about itself, including
//! the tasks it is executing) and as an entry of `peers`, so that a master can
//! dispatch leaves to itself like to any other worker.

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::NodeConfig;
use crate::graph::registry::FlowRegistry;
use crate::graph::types::TaskRef;
use crate::manager::protocol::ManagerSnapshot;
use crate::membership::peers::PeerMap;
use crate::membership::ranking::{Candidate, CandidateRanking};
use crate::membership::scoring::{ScoringPolicy, rescore};
use crate::membership::types::{NodeAddr, NodeInfo, NodeSnapshot, now_ms};
use crate::system::SystemProbe;
use crate::transport::PeerTransport;

#[derive(Debug)]
pub struct ClusterState {
    pub local: NodeInfo,
    pub ranking: CandidateRanking,
    pub peers: PeerMap,
    pub flows: FlowRegistry,
    /// Last time (ms) the master was confirmed alive.
    pub last_master_contact_ms: u64,
}

impl ClusterState {
    pub fn new(local: NodeInfo) -> Self {
        let mut peers = PeerMap::new();
        let mut own_entry = local.clone();
        own_entry.pending_tasks.clear();
        peers.insert(own_entry);

        Self {
            local,
            ranking: CandidateRanking::new(),
            peers,
            flows: FlowRegistry::new(),
            last_master_contact_ms: now_ms(),
        }
    }

    pub fn local_addr(&self) -> &NodeAddr {
        &self.local.addr
    }

    /// Role is always derived from the ranking, never stored.
    pub fn is_master(&self) -> bool {
        self.ranking.is_master(&self.local.addr)
    }

    pub fn current_master(&self) -> Option<NodeAddr> {
        self.ranking
            .current_master()
            .map(|master| master.addr.clone())
    }

    pub fn rank_index(&self) -> Option<usize> {
        self.ranking.index_of(&self.local.addr)
    }

    /// Puts the local node in the ranking if it volunteers as candidate.
    pub fn join_ranking(&mut self) {
        if self.local.candidate {
            self.ranking.sync_score(Candidate::from(&self.local));
        }
    }

    pub fn rescore_local(&mut self, policy: &dyn ScoringPolicy) {
        rescore(&mut self.local, policy);
        if self.local.candidate && self.ranking.get(&self.local.addr).is_some() {
            self.ranking.sync_score(Candidate::from(&self.local));
        }
    }

    pub fn touch_master(&mut self) {
        self.last_master_contact_ms = now_ms();
    }

    /// Ranking, flows and peer map as sent in probe replies and heartbeat pushes.
    pub fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            ranking: self.ranking.clone(),
            flows: self.flows.clone(),
            peers: self.peers.clone(),
        }
    }

    /// Takes over the view of the node that answered a discovery probe.
    pub fn adopt(&mut self, snapshot: ManagerSnapshot) {
        self.ranking.replace_wholesale(snapshot.ranking);
        self.flows = snapshot.flows;
        self.peers.sync_membership(&snapshot.peers);
        self.ensure_own_entry();

        // Our own score is authoritative locally
        self.join_ranking();
    }

    /// Keeps the local node listed as a worker.
    pub fn ensure_own_entry(&mut self) {
        if !self.peers.contains(&self.local.addr) {
            let mut own_entry = self.local.clone();
            own_entry.pending_tasks.clear();
            self.peers.insert(own_entry);
        }
        if let Some(own_entry) = self.peers.get_mut(&self.local.addr) {
            own_entry.system = self.local.system.clone();
            own_entry.score = self.local.score;
            own_entry.mark_reachable();
        }
    }

    /// Applies a peer's self-report: metrics, reachability and score. A peer that
    /// registered as candidate is (re)entered into the ranking. Returns false for
    /// peers this node does not track.
    pub fn record_report(&mut self, report: &NodeSnapshot, policy: &dyn ScoringPolicy) -> bool {
        let Some(peer) = self.peers.get_mut(&report.addr) else {
            return false;
        };
        peer.apply_system_report(report);
        rescore(peer, policy);

        if peer.candidate {
            let candidate = Candidate::from(&*peer);
            self.ranking.sync_score(candidate);
        }
        true
    }

    /// Filters out tasks whose leaf already holds a value.
    pub fn live_pending(&self, tasks: &[TaskRef]) -> Vec<TaskRef> {
        tasks
            .iter()
            .filter(|task| {
                !self
                    .flows
                    .get(&task.flow_id)
                    .map(|flow| flow.is_terminal(&task.id))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Drops a finished task from every pending set this node keeps.
    pub fn forget_pending(&mut self, task: &TaskRef) {
        self.peers.forget_pending(task);
        self.local.remove_pending(task);
    }
}

pub struct FogNode {
    pub config: NodeConfig,
    pub addr: NodeAddr,
    /// Peers probed at startup, in order.
    pub seeds: Vec<NodeAddr>,
    pub state: Mutex<ClusterState>,
    pub transport: Arc<dyn PeerTransport>,
    pub scoring: Arc<dyn ScoringPolicy>,
    pub probe: Arc<dyn SystemProbe>,
}

impl FogNode {
    pub fn new(
        config: NodeConfig,
        seeds: Vec<NodeAddr>,
        transport: Arc<dyn PeerTransport>,
        scoring: Arc<dyn ScoringPolicy>,
        probe: Arc<dyn SystemProbe>,
    ) -> Arc<Self> {
        let addr = config.local_addr();
        let mut local = NodeInfo::new_local(addr.clone(), config.score, config.battery, !config.nomaster);
        local.system = probe.sample();
        rescore(&mut local, scoring.as_ref());
        local.mark_reachable();

        let mut state = ClusterState::new(local);
        state.ensure_own_entry();

        Arc::new(Self {
            config,
            addr,
            seeds,
            state: Mutex::new(state),
            transport,
            scoring,
            probe,
        })
    }
}
