//! Flow Submission Protocol
//!
//! `POST /jobs` is used by clients to submit a flow and by nodes to relay it: the
//! master hands a backup copy to every peer, a slave forwards client submissions to
//! the master.

use serde::{Deserialize, Serialize};

use crate::graph::types::{FlowId, TaskSpec};
use crate::membership::ranking::CandidateRanking;

pub const ENDPOINT_JOBS: &str = "/jobs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFlowRequest {
    /// Generated by the receiving node when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FlowId>,
    pub flow: TaskSpec,
}

/// Tells the submitter the flow id and which nodes may coordinate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFlowResponse {
    pub flow_id: FlowId,
    pub ranking: CandidateRanking,
}
