use std::sync::Arc;

use super::protocol::{DeleteFlowResponse, ResultPollResponse, ResultSubmission};
use crate::dispatcher::engine::DispatchEngine;
use crate::graph::types::{FlowId, TaskRef};
use crate::node::FogNode;

/// Folds worker results back into their flows and keeps the walk going.
pub struct ResultAggregator {
    node: Arc<FogNode>,
    dispatcher: Arc<DispatchEngine>,
}

impl ResultAggregator {
    pub fn new(node: Arc<FogNode>, dispatcher: Arc<DispatchEngine>) -> Arc<Self> {
        Arc::new(Self { node, dispatcher })
    }

    /// Records a leaf result. Unknown flows are ignored: results racing a restart
    /// or handoff are expected.
    ///
    /// Returns whether the value was stored.
    pub async fn apply(&self, flow_id: &FlowId, submission: ResultSubmission) -> bool {
        let mut state = self.node.state.lock().await;

        let Some(flow) = state.flows.get_mut(flow_id) else {
            tracing::debug!(
                "Result for task {} of unknown flow {} ignored",
                submission.task_id,
                flow_id
            );
            return false;
        };

        let stored = flow.set_value(&submission.task_id, submission.result);
        if !stored {
            tracing::debug!(
                "Result for task {} of flow {} not stored (already set or not a leaf)",
                submission.task_id,
                flow_id
            );
        }

        // The dispatching worker is not recorded per result
        state.forget_pending(&TaskRef {
            id: submission.task_id.clone(),
            flow_id: flow_id.clone(),
        });

        if state.is_master() {
            self.dispatcher.walk_flow(&mut state, flow_id, None, false);
        }

        stored
    }

    pub async fn poll(&self, flow_id: &FlowId) -> ResultPollResponse {
        let state = self.node.state.lock().await;
        let flow = state.flows.get(flow_id);

        ResultPollResponse {
            results: flow.map(|flow| flow.results.clone()),
            completed: flow.map(|flow| flow.is_completed()).unwrap_or(false),
            ranking: state.ranking.clone(),
        }
    }

    /// Client acknowledgement. Bookkeeping only: workers still running leaves of
    /// this flow are not told.
    pub async fn delete(&self, flow_id: &FlowId) -> DeleteFlowResponse {
        let mut state = self.node.state.lock().await;
        let deleted = state.flows.remove(flow_id).is_some();
        if deleted {
            tracing::info!("Flow {} deleted", flow_id);
        }
        DeleteFlowResponse { deleted }
    }
}
