//! Test doubles and fixtures. No sockets are opened.

use serde_json::{Value, json};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::NodeConfig;
use crate::graph::types::{Flow, FlowId, TaskRef, TaskSpec};
use crate::membership::scoring::DefaultScoring;
use crate::membership::types::{NodeAddr, NodeInfo};
use crate::node::FogNode;
use crate::system::StaticProbe;
use crate::transport::{PeerRequest, PeerTransport, TransportError, TransportFuture};

#[derive(Default)]
struct Script {
    down: HashSet<NodeAddr>,
    replies: HashMap<(NodeAddr, String), VecDeque<Value>>,
    calls: Vec<PeerRequest>,
}

/// Answers per `(address, path)` from queued replies. The last queued reply keeps
/// being returned once the queue is down to one entry. Addresses marked down fail
/// with [`TransportError::Unreachable`]; anything unscripted answers `null`.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, addr: &NodeAddr, path: &str, reply: Value) {
        let mut script = self.script.lock().unwrap();
        script
            .replies
            .entry((addr.clone(), path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn refuse(&self, addr: &NodeAddr) {
        self.script.lock().unwrap().down.insert(addr.clone());
    }

    pub fn restore(&self, addr: &NodeAddr) {
        self.script.lock().unwrap().down.remove(addr);
    }

    pub fn calls(&self) -> Vec<PeerRequest> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, addr: &NodeAddr) -> Vec<PeerRequest> {
        self.calls()
            .into_iter()
            .filter(|call| &call.addr == addr)
            .collect()
    }

    fn answer(&self, request: PeerRequest) -> Result<Value, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(request.clone());

        if script.down.contains(&request.addr) {
            return Err(TransportError::Unreachable {
                addr: request.addr,
                reason: "connection refused".to_string(),
            });
        }

        let key = (request.addr, request.path);
        let reply = match script.replies.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        Ok(reply.unwrap_or(Value::Null))
    }
}

impl PeerTransport for ScriptedTransport {
    fn send(&self, request: PeerRequest) -> TransportFuture<'_> {
        let result = self.answer(request);
        Box::pin(async move { result })
    }
}

// ============================================================
// FIXTURES
// ============================================================

pub fn addr(port: u16) -> NodeAddr {
    NodeAddr::new("127.0.0.1", port)
}

pub fn test_config(port: u16) -> NodeConfig {
    NodeConfig {
        port,
        peers_file: PathBuf::from("/nonexistent/slaves.properties"),
        modules_file: PathBuf::from("/nonexistent/modules.properties"),
        dispatch_retry_delay: Duration::from_millis(10),
        client_poll_period: Duration::from_millis(10),
        ..NodeConfig::default()
    }
}

/// Node on `127.0.0.1:<port>` without metrics, so its score is `0 + 1 + 1`.
pub fn test_node(port: u16, seeds: Vec<NodeAddr>, transport: Arc<ScriptedTransport>) -> Arc<FogNode> {
    FogNode::new(
        test_config(port),
        seeds,
        transport,
        Arc::new(DefaultScoring),
        Arc::new(StaticProbe::default()),
    )
}

pub fn reachable_peer(port: u16, candidate: bool) -> NodeInfo {
    let mut peer = NodeInfo::new_peer(addr(port), 0.0, false, candidate);
    peer.mark_reachable();
    peer
}

pub fn task_ref(flow: &str, id: &str) -> TaskRef {
    TaskRef {
        id: id.into(),
        flow_id: flow.into(),
    }
}

/// `/engine` acknowledgement from the worker at `port`.
pub fn engine_reply(port: u16, pending: &[TaskRef]) -> Value {
    json!({ "node": { "addr": addr(port).to_string(), "pending_tasks": pending } })
}

/// Flow whose root is a `mode` list of echo leaves.
pub fn list_flow(flow_id: &str, mode: &str, leaves: &[&str]) -> Flow {
    let tasks: Vec<Value> = leaves
        .iter()
        .map(|id| json!({ "element": "task", "id": id, "action": { "module": "echo", "payload": id } }))
        .collect();
    let spec: TaskSpec = serde_json::from_value(
        json!({ "element": "list", "id": "root", "type": mode, "tasks": tasks }),
    )
    .unwrap();
    Flow::from_spec(FlowId::from(flow_id), &spec).unwrap()
}

/// Polls `condition` until it holds or two seconds have passed.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
