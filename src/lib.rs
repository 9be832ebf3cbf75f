//! nodeFog: Peer-to-Peer Fog Computing Library
//!
//! A set of equal nodes cooperates to run client-submitted task flows. One node,
//! the head of a score-ranked candidate list, coordinates: it walks each flow's
//! task tree, hands ready leaves to workers and folds their results back in.
//! When it disappears, the next candidate takes over and resumes.
//!
//! ## Architecture Modules
//! - **`membership`**: Node records, the candidate ranking, the peer map and scoring.
//! - **`graph`**: Task trees, flows (tree + results) and the flow registry.
//! - **`dispatcher`**: The walk that finds ready leaves and the dispatch/retry loop.
//! - **`aggregator`**: Applies worker results and re-walks flows.
//! - **`manager`**: Discovery, heartbeats, master suspicion and handoff.
//! - **`engine`**: Worker side: runs assigned leaves and reports their results.
//! - **`transport`**: The JSON-over-HTTP seam between nodes.
//! - **`node`**: The per-process context and its lock-guarded cluster state.
//! - **`client`**: Submission and polling logic used by `fog-client`.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod graph;
pub mod manager;
pub mod membership;
pub mod node;
pub mod system;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
