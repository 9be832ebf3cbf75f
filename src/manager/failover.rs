//! Failover Protocol
//!
//! Keeps every node's ranking, peer map and flow registry converging on the master's,
//! and moves the master role when the master disappears.
//!
//! ## Lifecycle
//! 1. **Discovery**: at startup the configured peers are probed one by one. The first
//!    answer is adopted wholesale; if the responder is not the master, the master is
//!    probed next so that it registers this node. Nobody answering means this node
//!    founds the fog and is master on its own.
//! 2. **Heartbeat (master)**: every tick the master pushes its snapshot to all peers in
//!    parallel and refreshes each peer from the ack. Failed peers lose their heartbeat,
//!    their ranking entry and their pending work, which is resubmitted.
//! 3. **Heartbeat (slave)**: a slave only acts once the master has been silent for
//!    `(2 + rank) * deprecation_lapse`, so candidates further down wait longer. It then
//!    probes the master and, if that fails, drops it from the ranking; the new head
//!    force-reassigns and resumes the oldest unfinished flow.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::protocol::*;
use crate::dispatcher::engine::DispatchEngine;
use crate::membership::scoring::rescore;
use crate::membership::ranking::Candidate;
use crate::membership::types::{NodeAddr, NodeInfo, now_ms};
use crate::node::{ClusterState, FogNode};
use crate::transport::{PeerRequest, TransportError, send_json};

/// Redirects followed during discovery before settling for the adopted view.
const MAX_DISCOVERY_REDIRECTS: usize = 3;

/// Whether a slave at `rank_index` should suspect the master after `elapsed_ms`
/// without contact. The head of the ranking never suspects anyone.
pub fn master_suspected(rank_index: usize, elapsed_ms: u64, lapse_ms: u64) -> bool {
    rank_index > 0 && (2 + rank_index as u64) * lapse_ms < elapsed_ms
}

enum TickAction {
    Sync,
    CheckMaster,
    Discover,
}

pub struct FailoverProtocol {
    node: Arc<FogNode>,
    dispatcher: Arc<DispatchEngine>,
}

impl FailoverProtocol {
    pub fn new(node: Arc<FogNode>, dispatcher: Arc<DispatchEngine>) -> Arc<Self> {
        Arc::new(Self { node, dispatcher })
    }

    /// Discovery, then the heartbeat loop. Never returns.
    pub async fn start(self: Arc<Self>) {
        self.discover().await;

        let mut interval = tokio::time::interval(self.node.config.heartbeat_interval);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    pub async fn discover(self: &Arc<Self>) {
        {
            let mut state = self.node.state.lock().await;
            state.join_ranking();
        }

        let mut targets: VecDeque<NodeAddr> = self
            .node
            .seeds
            .iter()
            .filter(|seed| **seed != self.node.addr)
            .cloned()
            .collect();
        let mut redirects = 0;

        while let Some(target) = targets.pop_front() {
            let snapshot = match self.probe(&target).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::debug!("Discovery probe of {} failed: {}", target, e);
                    continue;
                }
            };

            let master = {
                let mut state = self.node.state.lock().await;
                state.adopt(snapshot);
                state.touch_master();
                if state.is_master() {
                    tracing::info!("Joined the fog via {} as master", target);
                    self.dispatcher.resume_oldest(&mut state, false);
                }
                state.current_master()
            };

            match master {
                Some(master) if master == target || master == self.node.addr => {
                    tracing::info!("Discovery finished, master is {}", master);
                    return;
                }
                Some(master) if redirects < MAX_DISCOVERY_REDIRECTS => {
                    redirects += 1;
                    tracing::info!("{} is not master, probing {}", target, master);
                    targets.retain(|addr| *addr != master);
                    targets.push_front(master);
                }
                _ => return,
            }
        }

        let mut state = self.node.state.lock().await;
        if state.is_master() {
            tracing::info!("No peer answered, acting as master");
        } else {
            tracing::warn!("No peer answered and this node is not a master candidate");
        }
    }

    /// One heartbeat period.
    pub async fn tick(self: &Arc<Self>) {
        let sample = self.node.probe.sample();

        let action = {
            let mut state = self.node.state.lock().await;
            state.local.system = sample;
            state.rescore_local(self.node.scoring.as_ref());
            state.ensure_own_entry();

            if state.is_master() {
                TickAction::Sync
            } else if state.ranking.is_empty() {
                TickAction::Discover
            } else {
                TickAction::CheckMaster
            }
        };

        match action {
            TickAction::Sync => {
                self.sync_peers().await;
            }
            TickAction::CheckMaster => self.check_master().await,
            TickAction::Discover => self.discover().await,
        }
    }

    /// Master only: pushes the snapshot to every peer in parallel. The returned
    /// handles complete once each reply (or failure) has been applied.
    pub async fn sync_peers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let (targets, body) = {
            let state = self.node.state.lock().await;
            if !state.is_master() {
                return Vec::new();
            }

            let targets: Vec<NodeAddr> = state
                .peers
                .addrs()
                .into_iter()
                .filter(|addr| *addr != self.node.addr)
                .collect();
            let body = match serde_json::to_value(state.snapshot()) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!("Cannot encode heartbeat snapshot: {}", e);
                    return Vec::new();
                }
            };
            (targets, body)
        };

        tracing::debug!("Pushing heartbeat to {} peers", targets.len());

        targets
            .into_iter()
            .map(|target| {
                let protocol = self.clone();
                let body = body.clone();
                tokio::spawn(async move { protocol.push(target, body).await })
            })
            .collect()
    }

    async fn push(self: Arc<Self>, target: NodeAddr, body: serde_json::Value) {
        let request = PeerRequest::post(&target, ENDPOINT_MANAGER, body)
            .with_header(HEADER_REFERER, &self.node.addr);
        let reply = send_json::<HeartbeatReply>(self.node.transport.as_ref(), request).await;

        let mut state = self.node.state.lock().await;
        match reply {
            Ok(reply) => self.apply_ack(&mut state, &target, reply),
            Err(e) => {
                tracing::warn!("Heartbeat to {} failed: {}", target, e);
                let lost = match state.peers.get_mut(&target) {
                    Some(peer) => {
                        peer.mark_unreachable();
                        peer.take_pending()
                    }
                    None => Vec::new(),
                };
                if state.ranking.remove(&target) {
                    tracing::info!("Removed {} from the candidate ranking", target);
                }

                let lost = state.live_pending(&lost);
                if !lost.is_empty() {
                    self.dispatcher.resubmit(lost);
                }
            }
        }
    }

    fn apply_ack(&self, state: &mut ClusterState, target: &NodeAddr, reply: HeartbeatReply) {
        state.record_report(&reply.node, self.node.scoring.as_ref());

        if let Some(snapshot) = reply.snapshot {
            tracing::warn!("{} also claims mastership, merging its view", target);
            state.ranking.merge(&snapshot.ranking);
            state.peers.add_missing(&snapshot.peers);
            state.flows.absorb(snapshot.flows);
            state.ensure_own_entry();

            if state.is_master() {
                self.dispatcher.resume_oldest(state, false);
            } else {
                tracing::info!(
                    "Stepping down, master is now {:?}",
                    state.current_master().map(|addr| addr.to_string())
                );
                state.touch_master();
            }
        }

        // An empty report against non-empty bookkeeping means the peer restarted
        let reported = state.live_pending(&reply.node.pending_tasks);
        let booked = state
            .peers
            .get(target)
            .map(|peer| state.live_pending(&peer.pending_tasks))
            .unwrap_or_default();

        if reported.is_empty() && !booked.is_empty() {
            tracing::warn!("{} lost {} pending tasks, resubmitting", target, booked.len());
            if let Some(peer) = state.peers.get_mut(target) {
                peer.pending_tasks.clear();
            }
            self.dispatcher.resubmit(booked);
        } else if let Some(peer) = state.peers.get_mut(target) {
            peer.pending_tasks = reported;
        }
    }

    /// Slave side of the heartbeat: probes the master once it has been silent too long.
    pub async fn check_master(self: &Arc<Self>) {
        let master = {
            let state = self.node.state.lock().await;
            let (Some(rank), Some(master)) = (state.rank_index(), state.current_master()) else {
                return;
            };
            let elapsed = now_ms().saturating_sub(state.last_master_contact_ms);
            let lapse = self.node.config.deprecation_lapse.as_millis() as u64;
            if !master_suspected(rank, elapsed, lapse) {
                return;
            }
            tracing::info!("No contact with master {} for {}ms, probing it", master, elapsed);
            master
        };

        match self.probe(&master).await {
            Ok(snapshot) => {
                let mut state = self.node.state.lock().await;
                state.adopt(snapshot);
                state.touch_master();
                if state.is_master() {
                    tracing::info!("Resynced and now master");
                    self.dispatcher.resume_oldest(&mut state, false);
                }
            }
            Err(e) => {
                tracing::warn!("Master {} is unreachable: {}", master, e);
                let takeover = {
                    let mut state = self.node.state.lock().await;
                    state.peers.mark_all_reachable();
                    if let Some(dead) = state.peers.get_mut(&master) {
                        dead.mark_unreachable();
                    }
                    state.ranking.remove(&master);
                    state.touch_master();

                    if state.is_master() {
                        tracing::info!("Taking over as master");
                        self.dispatcher.resume_oldest(&mut state, true);
                        true
                    } else {
                        tracing::info!(
                            "Master candidate is now {:?}",
                            state.current_master().map(|addr| addr.to_string())
                        );
                        false
                    }
                };

                if takeover {
                    self.sync_peers().await;
                }
            }
        }
    }

    async fn probe(&self, target: &NodeAddr) -> Result<ManagerSnapshot, TransportError> {
        let (candidate, default_score, on_battery) = {
            let state = self.node.state.lock().await;
            (
                state.local.candidate,
                state.local.default_score,
                state.local.on_battery,
            )
        };

        let request = PeerRequest::get(target, probe_path(candidate))
            .with_header(HEADER_REFERER, &self.node.addr)
            .with_header(HEADER_SCORE, default_score)
            .with_header(HEADER_DEFAULT_BATTERY, on_battery);
        send_json(self.node.transport.as_ref(), request).await
    }

    /// `GET /manager/:is_candidate`: registers the requester (unless it is the
    /// current master) and answers with this node's view.
    pub async fn register_peer(
        &self,
        referer: Option<NodeAddr>,
        is_candidate: bool,
        default_score: f64,
        on_battery: bool,
    ) -> ManagerSnapshot {
        let mut state = self.node.state.lock().await;

        if let Some(referer) = referer
            && referer != self.node.addr
            && state.current_master().as_ref() != Some(&referer)
        {
            if !state.peers.contains(&referer) {
                state.peers.insert(NodeInfo::new_peer(
                    referer.clone(),
                    default_score,
                    on_battery,
                    is_candidate,
                ));
            }

            if let Some(peer) = state.peers.get_mut(&referer) {
                peer.default_score = default_score;
                peer.on_battery = on_battery;
                peer.candidate = is_candidate;
                rescore(peer, self.node.scoring.as_ref());

                let candidate = Candidate::from(&*peer);
                if is_candidate {
                    state.ranking.sync_score(candidate);
                } else {
                    state.ranking.remove(&referer);
                }
            }
            tracing::info!("Registered peer {} (candidate: {})", referer, is_candidate);
        }

        state.snapshot()
    }

    /// `POST /manager`: heartbeat push from a node acting as master.
    pub async fn receive_push(
        &self,
        referer: Option<NodeAddr>,
        snapshot: ManagerSnapshot,
    ) -> HeartbeatReply {
        let mut state = self.node.state.lock().await;

        if state.is_master() && referer.as_ref() != Some(&self.node.addr) {
            tracing::warn!(
                "Push from {:?} while acting as master, merging",
                referer.as_ref().map(|addr| addr.to_string())
            );
            state.ranking.merge(&snapshot.ranking);
            state.peers.add_missing(&snapshot.peers);
            state.flows.absorb(snapshot.flows);
            state.ensure_own_entry();

            if state.is_master() {
                return HeartbeatReply {
                    node: state.local.snapshot(),
                    snapshot: Some(state.snapshot()),
                };
            }
            tracing::info!(
                "Stepping down, master is now {:?}",
                state.current_master().map(|addr| addr.to_string())
            );
        } else {
            let previous = state.current_master();
            state.ranking.reconcile(&snapshot.ranking);
            let current = state.current_master();
            if previous != current {
                tracing::info!(
                    "Master changed from {:?} to {:?}",
                    previous.map(|addr| addr.to_string()),
                    current.map(|addr| addr.to_string())
                );
            }

            state.flows = snapshot.flows;
            state.peers.sync_membership(&snapshot.peers);
            state.ensure_own_entry();
        }

        state.touch_master();
        HeartbeatReply {
            node: state.local.snapshot(),
            snapshot: None,
        }
    }
}
