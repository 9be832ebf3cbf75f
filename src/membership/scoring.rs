//! Master Candidate Scoring
//!
//! The default policy favours fast, memory-rich hosts and never lets a node
//! running on battery outrank a node on mains power.

use super::types::NodeInfo;

/// Score assigned to every node running without mains power.
pub const BATTERY_SCORE: f64 = -1.0;

/// Lowest score a node on mains power can get, so that it always outranks any
/// node on battery whatever its configured `default_score`.
pub const MAINS_SCORE_FLOOR: f64 = BATTERY_SCORE + f64::EPSILON;

/// Free memory (bytes) worth one scoring point.
pub const FREE_MEMORY_UNIT: f64 = 2_000_000_000.0;

/// Pluggable scoring function for ranking candidates.
pub trait ScoringPolicy: Send + Sync {
    fn score(&self, node: &NodeInfo) -> f64;
}

/// `default_score + cpu_speed_factor + free_memory_factor`, or
/// [`BATTERY_SCORE`] when the node is on battery. Missing metrics count as 1 and
/// the result never drops below [`MAINS_SCORE_FLOOR`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultScoring;

impl ScoringPolicy for DefaultScoring {
    fn score(&self, node: &NodeInfo) -> f64 {
        if node.on_battery {
            return BATTERY_SCORE;
        }

        let cpu_speed = node
            .system
            .cpu
            .as_ref()
            .and_then(|cpu| cpu.speed_ghz)
            .filter(|speed| *speed > 0.0)
            .unwrap_or(1.0);

        let free_memory = node
            .system
            .memory
            .as_ref()
            .filter(|memory| memory.free > 0)
            .map(|memory| memory.free as f64 / FREE_MEMORY_UNIT)
            .unwrap_or(1.0);

        (node.default_score + cpu_speed + free_memory).max(MAINS_SCORE_FLOOR)
    }
}

/// Applies the policy to the node's score in place.
pub fn rescore(node: &mut NodeInfo, policy: &dyn ScoringPolicy) {
    node.score = policy.score(node);
}
