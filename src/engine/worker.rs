use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::protocol::{EngineRequest, EngineResponse};
use super::registry::ActionRegistry;
use super::substitution::Substitution;
use crate::aggregator::protocol::{ResultSubmission, result_path};
use crate::graph::types::{Action, TaskRef};
use crate::node::FogNode;
use crate::transport::PeerRequest;

/// Which action modules this node agrees to run.
///
/// Safe mode (the default once a whitelist is configured) only admits listed modules.
#[derive(Debug, Clone, PartialEq)]
pub struct ModulePolicy {
    safe_mode: bool,
    whitelist: Vec<String>,
}

impl ModulePolicy {
    pub fn unrestricted() -> Self {
        Self {
            safe_mode: false,
            whitelist: Vec::new(),
        }
    }

    /// `*` disables safe mode; anything else is a whitespace separated module list.
    pub fn from_whitelist(list: &str) -> Self {
        if list.trim() == "*" {
            return Self::unrestricted();
        }
        Self {
            safe_mode: true,
            whitelist: list.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn allows(&self, module: &str) -> bool {
        !self.safe_mode || self.whitelist.iter().any(|allowed| allowed == module)
    }
}

/// Worker side of `/engine`.
///
/// Leaves are acknowledged as soon as they arrive and then executed one at a time:
/// a long action delays every leaf queued behind it on this node.
pub struct Worker {
    node: Arc<FogNode>,
    actions: Arc<ActionRegistry>,
    policy: ModulePolicy,
    substitution: Substitution,
    lane: Mutex<()>,
}

impl Worker {
    pub fn new(
        node: Arc<FogNode>,
        actions: Arc<ActionRegistry>,
        policy: ModulePolicy,
    ) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            node,
            actions,
            policy,
            substitution: Substitution::new()?,
            lane: Mutex::new(()),
        }))
    }

    /// Books the leaf, answers with this node's report and runs the leaf in the
    /// background. The handle completes once the result has been delivered.
    pub async fn accept(self: &Arc<Self>, request: EngineRequest) -> (EngineResponse, JoinHandle<()>) {
        let task = request.task.task_ref();
        let report = {
            let mut state = self.node.state.lock().await;
            state.local.add_pending(task);
            state.local.snapshot()
        };

        tracing::debug!(
            "Accepted task {} of flow {} ({})",
            request.task.id,
            request.task.flow_id,
            request.task.action.module
        );

        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.run(request).await });

        (EngineResponse { node: report }, handle)
    }

    async fn run(self: Arc<Self>, request: EngineRequest) {
        let result = {
            let _lane = self.lane.lock().await;
            self.execute(&request).await
        };
        self.report(request.task.task_ref(), result).await;
    }

    /// Substitutes placeholders, checks the whitelist and runs the action.
    /// Failures become `{"error": ..}` values so the flow can still progress.
    pub async fn execute(&self, request: &EngineRequest) -> Value {
        let module = &request.task.action.module;
        if !self.policy.allows(module) {
            tracing::warn!("Refusing task {}: module '{}' is not whitelisted", request.task.id, module);
            return json!({ "error": format!("module '{}' is not whitelisted", module) });
        }

        let action = Action {
            module: module.clone(),
            payload: self
                .substitution
                .apply(&request.task.action.payload, &request.results),
        };

        match self.actions.execute(&action).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Task {} failed: {}", request.task.id, e);
                json!({ "error": e.to_string() })
            }
        }
    }

    /// Posts the result to whoever is master now, retrying until one accepts it.
    async fn report(&self, task: TaskRef, result: Value) {
        let submission = ResultSubmission {
            task_id: task.id.clone(),
            result,
        };
        let body = match serde_json::to_value(&submission) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Dropping result of task {}: {}", task.id, e);
                return;
            }
        };

        loop {
            let master = self.node.state.lock().await.current_master();

            match master {
                Some(master) => {
                    let request = PeerRequest::post(&master, result_path(&task.flow_id), body.clone());
                    match self.node.transport.send(request).await {
                        Ok(_) => {
                            tracing::debug!("Reported task {} to {}", task.id, master);
                            self.node.state.lock().await.local.remove_pending(&task);
                            return;
                        }
                        Err(e) => tracing::warn!("Reporting task {} to {} failed: {}", task.id, master, e),
                    }
                }
                None => tracing::warn!("No master known to report task {} to", task.id),
            }

            tokio::time::sleep(self.node.config.dispatch_retry_delay).await;
        }
    }
}
