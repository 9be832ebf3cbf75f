use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{Flow, FlowId};

/// In-flight flows, in the order they were first received.
///
/// Flows are only ever removed by an explicit client delete. On the wire the
/// registry is a map keyed by flow id plus an `index` array carrying the order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RegistrySnapshot", into = "RegistrySnapshot")]
pub struct FlowRegistry {
    flows: IndexMap<FlowId, Flow>,
}

#[derive(Serialize, Deserialize)]
struct RegistrySnapshot {
    #[serde(default)]
    flows: HashMap<FlowId, Flow>,
    #[serde(default)]
    index: Vec<FlowId>,
}

impl From<RegistrySnapshot> for FlowRegistry {
    fn from(snapshot: RegistrySnapshot) -> Self {
        let RegistrySnapshot { mut flows, index } = snapshot;
        let mut registry = FlowRegistry::default();

        for id in index {
            if let Some(flow) = flows.remove(&id) {
                registry.add(flow);
            }
        }
        // Entries the index forgot still count; their relative order is lost.
        let mut rest: Vec<Flow> = flows.into_values().collect();
        rest.sort_by(|a, b| a.id.cmp(&b.id));
        for flow in rest {
            registry.add(flow);
        }

        registry
    }
}

impl From<FlowRegistry> for RegistrySnapshot {
    fn from(registry: FlowRegistry) -> Self {
        Self {
            index: registry.flows.keys().cloned().collect(),
            flows: registry.flows.into_iter().collect(),
        }
    }
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the flow unless its id is already registered.
    pub fn add(&mut self, flow: Flow) -> bool {
        if self.flows.contains_key(&flow.id) {
            return false;
        }
        self.flows.insert(flow.id.clone(), flow);
        true
    }

    /// Adds the flows of `other` that are not registered here, in `other`'s order.
    /// Flows known on both sides keep their local progress.
    pub fn absorb(&mut self, other: FlowRegistry) {
        for flow in other.flows.into_values() {
            self.add(flow);
        }
    }

    pub fn get(&self, id: &FlowId) -> Option<&Flow> {
        self.flows.get(id)
    }

    pub fn get_mut(&mut self, id: &FlowId) -> Option<&mut Flow> {
        self.flows.get_mut(id)
    }

    pub fn contains(&self, id: &FlowId) -> bool {
        self.flows.contains_key(id)
    }

    pub fn remove(&mut self, id: &FlowId) -> Option<Flow> {
        self.flows.shift_remove(id)
    }

    /// The oldest flow that has not completed yet; the one resumed after a
    /// restart or handoff.
    pub fn oldest_pending(&self) -> Option<&Flow> {
        self.iter().find(|flow| !flow.is_completed())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    pub fn ids(&self) -> Vec<FlowId> {
        self.flows.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
