//! Manager Protocol
//!
//! DTOs for discovery probes and heartbeat pushes between nodes.

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::graph::registry::FlowRegistry;
use crate::membership::peers::PeerMap;
use crate::membership::ranking::CandidateRanking;
use crate::membership::types::NodeSnapshot;

/// `GET /manager/:is_candidate` is the probe, `POST /manager` the heartbeat push.
pub const ENDPOINT_MANAGER: &str = "/manager";

pub const HEADER_REFERER: &str = "referer";
pub const HEADER_SCORE: &str = "score";
pub const HEADER_DEFAULT_BATTERY: &str = "defaultbattery";

/// A node's view of the cluster. Probe reply and heartbeat push body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerSnapshot {
    #[serde(default)]
    pub ranking: CandidateRanking,
    #[serde(default)]
    pub flows: FlowRegistry,
    #[serde(default)]
    pub peers: PeerMap,
}

/// Reply to a heartbeat push.
///
/// A plain ack carries only `node`. A receiver that believes it is master itself
/// adds its own `snapshot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatReply {
    pub node: NodeSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ManagerSnapshot>,
}

pub fn probe_path(is_candidate: bool) -> String {
    format!("{}/{}", ENDPOINT_MANAGER, is_candidate)
}

/// Reads and parses an out-of-band header; absent or malformed values give `None`.
pub fn header_value<T: FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
