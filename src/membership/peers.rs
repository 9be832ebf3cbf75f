use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::types::{NodeAddr, NodeInfo, NodeRole};
use crate::graph::types::TaskRef;

/// Peers tracked by a node, keyed by address, in insertion order.
///
/// Insertion order is the "encounter order" used to break ties when picking
/// the least loaded worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerMap {
    peers: IndexMap<NodeAddr, NodeInfo>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: &NodeAddr) -> Option<&NodeInfo> {
        self.peers.get(addr)
    }

    pub fn get_mut(&mut self, addr: &NodeAddr) -> Option<&mut NodeInfo> {
        self.peers.get_mut(addr)
    }

    pub fn contains(&self, addr: &NodeAddr) -> bool {
        self.peers.contains_key(addr)
    }

    /// Inserts or replaces the record for `node.addr`, keeping its position
    /// when it already existed.
    pub fn insert(&mut self, mut node: NodeInfo) {
        node.role = NodeRole::Peer;
        self.peers.insert(node.addr.clone(), node);
    }

    pub fn remove(&mut self, addr: &NodeAddr) -> Option<NodeInfo> {
        self.peers.shift_remove(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.peers.values()
    }

    pub fn addrs(&self) -> Vec<NodeAddr> {
        self.peers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Confirms every tracked peer as reachable. Used right after a master is
    /// lost so the new master can dispatch immediately; peers that are really
    /// gone are weeded out by the next failed push or dispatch.
    pub fn mark_all_reachable(&mut self) {
        for peer in self.peers.values_mut() {
            peer.mark_reachable();
        }
    }

    /// Drops `task` from every peer's bookkeeping.
    pub fn forget_pending(&mut self, task: &TaskRef) {
        for peer in self.peers.values_mut() {
            peer.remove_pending(task);
        }
    }

    /// Among reachable peers, the one with the fewest outstanding tasks.
    /// Ties go to the first one found.
    pub fn least_loaded(&self) -> Option<&NodeAddr> {
        let mut selected: Option<&NodeInfo> = None;

        for peer in self.peers.values().filter(|peer| peer.is_reachable()) {
            match selected {
                Some(current) if current.outstanding() <= peer.outstanding() => {}
                _ => selected = Some(peer),
            }
        }

        selected.map(|peer| &peer.addr)
    }

    /// Adds peers listed by `other` that are not tracked yet, as fresh records
    /// with no confirmed heartbeat.
    pub fn add_missing(&mut self, other: &PeerMap) {
        for received in other.iter() {
            if !self.contains(&received.addr) {
                self.insert(NodeInfo::new_peer(
                    received.addr.clone(),
                    received.default_score,
                    received.on_battery,
                    received.candidate,
                ));
            }
        }
    }

    /// Makes the tracked membership equal to `other`'s: adds what is missing and
    /// drops what `other` no longer lists. Records for peers present on both
    /// sides are kept as they are.
    pub fn sync_membership(&mut self, other: &PeerMap) {
        self.peers.retain(|addr, _| other.contains(addr));
        self.add_missing(other);
    }
}
