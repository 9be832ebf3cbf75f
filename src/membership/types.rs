use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::graph::types::TaskRef;

/// Port assumed when a peer is configured as a bare host.
pub const DEFAULT_PORT: u16 = 3000;

/// Network identity of a node (`host:port`).
///
/// Two nodes are the same node if and only if their addresses are equal; this is
/// the identity used by the ranking, the peer map and the `referer` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AddrError {
    #[error("empty host in node address '{0}'")]
    EmptyHost(String),
    #[error("invalid port in node address '{0}'")]
    InvalidPort(String),
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = AddrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AddrError::InvalidPort(s.to_string()))?;
                (host, port)
            }
            None => (s, DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(AddrError::EmptyHost(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for NodeAddr {
    type Error = AddrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddr> for String {
    fn from(addr: NodeAddr) -> Self {
        addr.to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CpuInfo {
    /// Maximum clock speed in GHz, when the host reports it.
    #[serde(default)]
    pub speed_ghz: Option<f64>,
    pub cores: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemoryInfo {
    pub free: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatteryInfo {
    #[serde(default)]
    pub level: Option<f64>,
    #[serde(default)]
    pub charging: Option<bool>,
}

/// Host metrics as reported by a node. Used only as scoring input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    #[serde(default)]
    pub cpu: Option<CpuInfo>,
    #[serde(default)]
    pub memory: Option<MemoryInfo>,
    #[serde(default)]
    pub battery: Option<BatteryInfo>,
}

/// Distinguishes the record a node keeps about itself from the records it keeps
/// about the peers it tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NodeRole {
    Local,
    #[default]
    Peer,
}

/// Per-node record: identity, scoring inputs, and outstanding work.
///
/// `last_heartbeat_at == None` means the node has never been confirmed reachable
/// (or was marked unreachable after a transport failure); such nodes are never
/// chosen as dispatch targets. The timestamp is local to the process that tracks
/// the node and is not carried over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub addr: NodeAddr,
    pub score: f64,
    pub default_score: f64,
    pub on_battery: bool,
    /// Registered as eligible for the master role.
    #[serde(default)]
    pub candidate: bool,
    #[serde(default)]
    pub system: SystemInfo,
    #[serde(default)]
    pub pending_tasks: Vec<TaskRef>,

    #[serde(skip)]
    pub last_heartbeat_at: Option<Instant>,
    #[serde(skip)]
    pub role: NodeRole,
}

/// What a node reports about itself in replies to `/engine` and `/manager`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSnapshot {
    pub addr: NodeAddr,
    #[serde(default)]
    pub system: SystemInfo,
    #[serde(default)]
    pub pending_tasks: Vec<TaskRef>,
}

impl NodeInfo {
    pub fn new_local(addr: NodeAddr, default_score: f64, on_battery: bool, candidate: bool) -> Self {
        Self {
            addr,
            score: default_score,
            default_score,
            on_battery,
            candidate,
            system: SystemInfo::default(),
            pending_tasks: Vec::new(),
            last_heartbeat_at: None,
            role: NodeRole::Local,
        }
    }

    pub fn new_peer(addr: NodeAddr, default_score: f64, on_battery: bool, candidate: bool) -> Self {
        Self {
            role: NodeRole::Peer,
            ..Self::new_local(addr, default_score, on_battery, candidate)
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.last_heartbeat_at.is_some()
    }

    pub fn mark_reachable(&mut self) {
        self.last_heartbeat_at = Some(Instant::now());
    }

    pub fn mark_unreachable(&mut self) {
        self.last_heartbeat_at = None;
    }

    /// Records a task as outstanding on this node. Duplicates are ignored.
    pub fn add_pending(&mut self, task: TaskRef) {
        if !self.pending_tasks.contains(&task) {
            self.pending_tasks.push(task);
        }
    }

    pub fn remove_pending(&mut self, task: &TaskRef) -> bool {
        let before = self.pending_tasks.len();
        self.pending_tasks.retain(|pending| pending != task);
        before != self.pending_tasks.len()
    }

    /// Drains the pending set, returning what was outstanding.
    pub fn take_pending(&mut self) -> Vec<TaskRef> {
        std::mem::take(&mut self.pending_tasks)
    }

    pub fn outstanding(&self) -> usize {
        self.pending_tasks.len()
    }

    /// Refreshes metrics from a node's self-report and confirms it reachable.
    /// The pending set is left to the caller, which may need to reconcile it first.
    pub fn apply_system_report(&mut self, snapshot: &NodeSnapshot) {
        self.system = snapshot.system.clone();
        self.mark_reachable();
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            addr: self.addr.clone(),
            system: self.system.clone(),
            pending_tasks: self.pending_tasks.clone(),
        }
    }
}

/// Current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
