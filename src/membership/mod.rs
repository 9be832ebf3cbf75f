//! Membership & Master Candidacy Module
//!
//! Tracks which nodes make up the fog and which of them should coordinate it.
//!
//! ## Core Mechanisms
//! - **NodeInfo**: One record per node (address, score, battery flag, outstanding tasks,
//!   last confirmed heartbeat). A node keeps one record about itself and one per peer.
//! - **CandidateRanking**: Score-sorted list of master candidates; the head is the master.
//!   Roles are never stored, they are derived from the ranking on demand.
//! - **Scoring**: Pluggable policy turning reported host metrics into a ranking score.
//! - **PeerMap**: Insertion-ordered peer records, used for worker selection.

pub mod peers;
pub mod ranking;
pub mod scoring;
pub mod types;
