//! Dispatch Engine
//!
//! Turns a flow's tree into remote leaf assignments.
//!
//! ## Walk
//! [`walk`] is a pure function over a [`Flow`]: it marks the leaves that became
//! ready as `assigned` and returns them. The caller holds the cluster lock while
//! walking and spawns one dispatch task per returned leaf afterwards.
//!
//! ## Dispatch
//! Each leaf goes to the reachable peer with the fewest outstanding tasks. A failed
//! send marks that worker unreachable and retries this leaf alone; the worker's
//! other tasks are left to heartbeat-driven detection. With no worker available the
//! whole submission is retried after `dispatch_retry_delay`, with no upper bound.

use std::sync::Arc;
use tokio::task::JoinHandle;

use super::protocol::{SubmitFlowRequest, SubmitFlowResponse};
use crate::engine::protocol::{ENDPOINT_ENGINE, EngineRequest, EngineResponse};
use crate::graph::types::{
    Flow, FlowId, GraphError, ListMode, TaskId, TaskNode, TaskRef, TaskStatus,
};
use crate::membership::types::NodeAddr;
use crate::node::{ClusterState, FogNode};
use crate::transport::{PeerRequest, send_json};

/// Walks the subtree at `from`, returning the leaves newly marked `assigned`.
///
/// With `force`, leaves already `assigned` are handed out again; values are never
/// touched. A list whose children are all terminal is marked completed and the
/// walk continues at its parent.
pub fn walk(flow: &mut Flow, from: &TaskId, force: bool) -> Vec<TaskId> {
    let mut ready = Vec::new();
    walk_into(flow, from, force, &mut ready);
    ready
}

fn walk_into(flow: &mut Flow, id: &TaskId, force: bool, ready: &mut Vec<TaskId>) {
    let (mode, children, parent_id) = match flow.node(id) {
        None => return,
        Some(TaskNode::Leaf { .. }) => {
            if ready.contains(id) {
                return;
            }
            let dispatch = match flow.status(id) {
                None => true,
                Some(TaskStatus::Assigned) => force,
                Some(TaskStatus::Value(_)) => false,
            };
            if dispatch {
                flow.mark_assigned(id);
                ready.push(id.clone());
            }
            return;
        }
        Some(TaskNode::List {
            completed: true, ..
        }) => return,
        Some(TaskNode::List {
            mode,
            children,
            parent_id,
            ..
        }) => (*mode, children.clone(), parent_id.clone()),
    };

    let pending: Vec<TaskId> = children
        .into_iter()
        .filter(|child| !flow.is_terminal(child))
        .collect();

    if pending.is_empty() {
        flow.mark_completed(id);
        if let Some(parent_id) = parent_id {
            walk_into(flow, &parent_id, force, ready);
        }
        return;
    }

    let unassigned: Vec<TaskId> = pending
        .iter()
        .filter(|child| force || !flow.is_assigned(child))
        .cloned()
        .collect();

    match mode {
        ListMode::Sequential => {
            // Head-of-line: later siblings wait for the first pending one
            let head = &pending[0];
            if unassigned.contains(head) {
                walk_into(flow, head, force, ready);
            }
        }
        ListMode::Concurrent => {
            for child in &unassigned {
                walk_into(flow, child, force, ready);
            }
        }
    }
}

enum Attempt {
    Send(NodeAddr, EngineRequest),
    NoWorker,
    Drop,
}

pub struct DispatchEngine {
    node: Arc<FogNode>,
}

impl DispatchEngine {
    pub fn new(node: Arc<FogNode>) -> Arc<Self> {
        Arc::new(Self { node })
    }

    /// Walks a stored flow (from its root when `from` is `None`) and starts
    /// dispatching whatever became ready.
    pub fn walk_flow(
        self: &Arc<Self>,
        state: &mut ClusterState,
        flow_id: &FlowId,
        from: Option<&TaskId>,
        force: bool,
    ) -> Vec<JoinHandle<()>> {
        let Some(flow) = state.flows.get_mut(flow_id) else {
            tracing::debug!("Walk skipped, flow {} is unknown", flow_id);
            return Vec::new();
        };

        let start = from.cloned().unwrap_or_else(|| flow.root.clone());
        let ready = walk(flow, &start, force);
        if flow.is_completed() {
            tracing::info!("Flow {} completed", flow_id);
        }

        ready
            .into_iter()
            .map(|id| {
                self.submit(TaskRef {
                    id,
                    flow_id: flow_id.clone(),
                })
            })
            .collect()
    }

    /// Resumes the oldest unfinished flow. Used after startup discovery and after a
    /// handoff; other stored flows stay dormant until something walks them.
    pub fn resume_oldest(self: &Arc<Self>, state: &mut ClusterState, force: bool) -> Vec<JoinHandle<()>> {
        let Some(flow_id) = state.flows.oldest_pending().map(|flow| flow.id.clone()) else {
            return Vec::new();
        };
        tracing::info!("Resuming flow {} (force reassign: {})", flow_id, force);
        self.walk_flow(state, &flow_id, None, force)
    }

    /// Re-dispatches leaves whose worker was lost.
    pub fn resubmit(self: &Arc<Self>, tasks: Vec<TaskRef>) -> Vec<JoinHandle<()>> {
        tasks
            .into_iter()
            .map(|task| {
                tracing::info!("Resubmitting task {} of flow {}", task.id, task.flow_id);
                self.submit(task)
            })
            .collect()
    }

    pub fn submit(self: &Arc<Self>, task: TaskRef) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move { engine.dispatch(task).await })
    }

    async fn dispatch(self: Arc<Self>, task: TaskRef) {
        loop {
            let attempt = {
                let mut state = self.node.state.lock().await;
                self.prepare(&mut state, &task)
            };

            let (worker, request) = match attempt {
                Attempt::Send(worker, request) => (worker, request),
                Attempt::Drop => return,
                Attempt::NoWorker => {
                    tracing::warn!(
                        "No worker available for task {}, retrying in {:?}",
                        task.id,
                        self.node.config.dispatch_retry_delay
                    );
                    tokio::time::sleep(self.node.config.dispatch_retry_delay).await;
                    continue;
                }
            };

            let body = match serde_json::to_value(&request) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!("Dropping task {}: cannot encode request: {}", task.id, e);
                    return;
                }
            };

            tracing::debug!("Dispatching task {} of flow {} to {}", task.id, task.flow_id, worker);
            let reply = send_json::<EngineResponse>(
                self.node.transport.as_ref(),
                PeerRequest::post(&worker, ENDPOINT_ENGINE, body),
            )
            .await;

            let mut state = self.node.state.lock().await;
            match reply {
                Ok(reply) => {
                    state.record_report(&reply.node, self.node.scoring.as_ref());
                    let pending = state.live_pending(&reply.node.pending_tasks);
                    if let Some(peer) = state.peers.get_mut(&worker) {
                        peer.pending_tasks = pending;
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!("Dispatch of task {} to {} failed: {}", task.id, worker, e);
                    if let Some(peer) = state.peers.get_mut(&worker) {
                        peer.mark_unreachable();
                        peer.remove_pending(&task);
                    }
                }
            }
        }
    }

    /// Picks a worker and books the task on it, or explains why not.
    fn prepare(&self, state: &mut ClusterState, task: &TaskRef) -> Attempt {
        if !state.is_master() {
            tracing::debug!("No longer master, leaving task {} to the new master", task.id);
            return Attempt::Drop;
        }

        let Some(flow) = state.flows.get(&task.flow_id) else {
            tracing::debug!("Flow {} is gone, dropping task {}", task.flow_id, task.id);
            return Attempt::Drop;
        };
        if flow.is_terminal(&task.id) {
            return Attempt::Drop;
        }
        let Some(leaf) = flow.leaf_task(&task.id) else {
            return Attempt::Drop;
        };
        let results = flow.results.clone();

        let Some(worker) = state.peers.least_loaded().cloned() else {
            return Attempt::NoWorker;
        };
        if let Some(peer) = state.peers.get_mut(&worker) {
            peer.add_pending(task.clone());
        }

        Attempt::Send(worker, EngineRequest { task: leaf, results })
    }

    /// `POST /jobs`: stores, walks and relays (master), keeps a backup copy or
    /// forwards to the master (slave).
    pub async fn receive_flow(
        self: &Arc<Self>,
        request: SubmitFlowRequest,
        referer: Option<NodeAddr>,
    ) -> Result<SubmitFlowResponse, GraphError> {
        let flow_id = request.id.clone().unwrap_or_else(FlowId::generate);
        let flow = Flow::from_spec(flow_id.clone(), &request.flow)?;
        let relay = SubmitFlowRequest {
            id: Some(flow_id.clone()),
            flow: request.flow,
        };

        let mut state = self.node.state.lock().await;
        let local = state.local_addr().clone();

        if state.is_master() {
            if !state.flows.add(flow) {
                tracing::info!("Flow {} already registered, ignoring", flow_id);
            } else {
                tracing::info!("Flow {} received", flow_id);
                self.walk_flow(&mut state, &flow_id, None, false);

                let targets: Vec<NodeAddr> = state
                    .peers
                    .addrs()
                    .into_iter()
                    .filter(|addr| addr != &local)
                    .collect();
                for target in targets {
                    self.relay(target, &relay);
                }
            }
        } else if let Some(master) = state.current_master() {
            if referer.as_ref() == Some(&master) {
                tracing::debug!("Storing backup copy of flow {}", flow_id);
                state.flows.add(flow);
            } else {
                tracing::info!("Forwarding flow {} to master {}", flow_id, master);
                self.relay(master, &relay);
            }
        } else {
            tracing::warn!("No master known, keeping flow {} until one appears", flow_id);
            state.flows.add(flow);
        }

        Ok(SubmitFlowResponse {
            flow_id,
            ranking: state.ranking.clone(),
        })
    }

    fn relay(&self, target: NodeAddr, request: &SubmitFlowRequest) {
        let body = match serde_json::to_value(request) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Cannot encode flow relay: {}", e);
                return;
            }
        };
        let transport = self.node.transport.clone();
        let request = PeerRequest::post(&target, super::protocol::ENDPOINT_JOBS, body)
            .with_header(crate::manager::protocol::HEADER_REFERER, &self.node.addr);

        tokio::spawn(async move {
            if let Err(e) = transport.send(request).await {
                tracing::warn!("Relaying flow to {} failed: {}", target, e);
            }
        });
    }
}
