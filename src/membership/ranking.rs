//! Master Candidate Ranking
//!
//! Ordered list of the nodes eligible to coordinate the cluster, sorted by score
//! (highest first). Position 0 is the master as perceived by the local node.
//! The designation is eventually consistent: two nodes may briefly disagree
//! during a handoff.
//!
//! Ties keep insertion order (`sort_by` is stable), so among equally scored
//! candidates the one registered first wins.

use super::types::{NodeAddr, NodeInfo};
use serde::{Deserialize, Serialize};

/// One ranking entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub addr: NodeAddr,
    pub score: f64,
    #[serde(default)]
    pub on_battery: bool,
}

impl From<&NodeInfo> for Candidate {
    fn from(node: &NodeInfo) -> Self {
        Self {
            addr: node.addr.clone(),
            score: node.score,
            on_battery: node.on_battery,
        }
    }
}

/// Serialized as a plain ordered JSON array.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CandidateRanking {
    candidates: Vec<Candidate>,
}

impl CandidateRanking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ranking from arbitrary entries, dropping duplicate addresses
    /// (first occurrence wins) and sorting.
    pub fn from_candidates(candidates: Vec<Candidate>) -> Self {
        let mut ranking = Self::new();
        for candidate in candidates {
            if ranking.index_of(&candidate.addr).is_none() {
                ranking.candidates.push(candidate);
            }
        }
        ranking.sort();
        ranking
    }

    /// Inserts the candidate unless one with the same address exists.
    /// Returns whether it was inserted.
    pub fn add_if_absent(&mut self, candidate: Candidate) -> bool {
        if self.index_of(&candidate.addr).is_some() {
            return false;
        }
        self.candidates.push(candidate);
        self.sort();
        true
    }

    /// Overwrites the score of an existing entry, or inserts it.
    pub fn sync_score(&mut self, candidate: Candidate) {
        match self
            .candidates
            .iter_mut()
            .find(|existing| existing.addr == candidate.addr)
        {
            Some(existing) => {
                existing.score = candidate.score;
                existing.on_battery = candidate.on_battery;
            }
            None => self.candidates.push(candidate),
        }
        self.sort();
    }

    pub fn remove(&mut self, addr: &NodeAddr) -> bool {
        let before = self.candidates.len();
        self.candidates.retain(|candidate| &candidate.addr != addr);
        before != self.candidates.len()
    }

    /// Stable sort, descending by score.
    pub fn sort(&mut self) {
        self.candidates
            .sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    /// Union by address; scores from `other` overwrite local ones.
    pub fn merge(&mut self, other: &CandidateRanking) {
        for candidate in &other.candidates {
            self.sync_score(candidate.clone());
        }
        self.sort();
    }

    /// Follows an authoritative ranking without replacing entries wholesale:
    /// drops local entries the other side no longer lists, then merges.
    pub fn reconcile(&mut self, other: &CandidateRanking) {
        self.candidates
            .retain(|candidate| other.index_of(&candidate.addr).is_some());
        self.merge(other);
    }

    /// Adopts a snapshot from the node assuming mastership.
    pub fn replace_wholesale(&mut self, other: CandidateRanking) {
        *self = Self::from_candidates(other.candidates);
    }

    pub fn current_master(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn is_master(&self, addr: &NodeAddr) -> bool {
        self.current_master()
            .map(|master| &master.addr == addr)
            .unwrap_or(false)
    }

    pub fn index_of(&self, addr: &NodeAddr) -> Option<usize> {
        self.candidates
            .iter()
            .position(|candidate| &candidate.addr == addr)
    }

    pub fn get(&self, addr: &NodeAddr) -> Option<&Candidate> {
        self.candidates
            .iter()
            .find(|candidate| &candidate.addr == addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter()
    }

    pub fn addrs(&self) -> Vec<NodeAddr> {
        self.candidates
            .iter()
            .map(|candidate| candidate.addr.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
