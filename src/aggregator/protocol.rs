use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::graph::types::{FlowId, ResultsMap, TaskId};
use crate::membership::ranking::CandidateRanking;

/// `/result/:flow_id`: GET polls, POST reports a leaf result, DELETE evicts the flow.
pub const ENDPOINT_RESULT: &str = "/result";

pub fn result_path(flow_id: &FlowId) -> String {
    format!("{}/{}", ENDPOINT_RESULT, flow_id)
}

/// Worker → master.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultSubmission {
    pub task_id: TaskId,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultPollResponse {
    /// Absent when the polled node does not know the flow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<ResultsMap>,
    pub completed: bool,
    pub ranking: CandidateRanking,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultAck {
    pub accepted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFlowResponse {
    pub deleted: bool,
}
