//! Leaf assignment DTOs.

use serde::{Deserialize, Serialize};

use crate::graph::types::{LeafTask, ResultsMap};
use crate::membership::types::NodeSnapshot;

/// Master → worker: run this leaf.
pub const ENDPOINT_ENGINE: &str = "/engine";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineRequest {
    pub task: LeafTask,
    /// Results known so far, for `#id#` substitution.
    #[serde(default)]
    pub results: ResultsMap,
}

/// Sent back immediately, before the leaf runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResponse {
    pub node: NodeSnapshot,
}
