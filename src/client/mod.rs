//! Fog Client
//!
//! Submits a flow to any node, then follows the master around while polling for
//! results.
//!
//! The ranking returned with every answer doubles as the list of nodes to try next:
//! when the polled node stops answering, the client moves down the list. With the
//! list exhausted it falls back once to the node it originally submitted to, then
//! gives up.

use anyhow::{Context, Result, anyhow};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::aggregator::protocol::{ResultPollResponse, result_path};
use crate::config::ConfigError;
use crate::dispatcher::protocol::{ENDPOINT_JOBS, SubmitFlowRequest, SubmitFlowResponse};
use crate::graph::types::{FlowId, ResultsMap, TaskSpec};
use crate::membership::ranking::CandidateRanking;
use crate::membership::types::{DEFAULT_PORT, NodeAddr};
use crate::transport::{PeerRequest, PeerTransport, send_json};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub entry: NodeAddr,
    pub file: PathBuf,
    pub poll_period: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            entry: NodeAddr::new("127.0.0.1", DEFAULT_PORT),
            file: PathBuf::from("flow.json"),
            poll_period: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// `host=`, `port=`, `file=` and `poll_ms=` tokens over the defaults.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        for arg in args {
            let Some((key, value)) = arg.as_ref().split_once('=') else {
                continue;
            };
            let value = value.trim();
            let invalid = || ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key.trim() {
                "host" => config.entry.host = value.to_string(),
                "port" => config.entry.port = value.parse().map_err(|_| invalid())?,
                "file" => config.file = PathBuf::from(value),
                "poll_ms" => {
                    config.poll_period = Duration::from_millis(value.parse().map_err(|_| invalid())?)
                }
                _ => {}
            }
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The master answered; the flow is not finished yet.
    Pending,
    /// The polled node is no longer the master; poll the new head next period.
    MasterMoved(NodeAddr),
    /// The polled node was unreachable; the next candidate should be polled now.
    Retry,
    Completed(ResultsMap),
}

pub struct FogClient {
    transport: Arc<dyn PeerTransport>,
    entry: NodeAddr,
    candidates: VecDeque<NodeAddr>,
    poll_period: Duration,
    fell_back: bool,
}

impl FogClient {
    pub fn new(transport: Arc<dyn PeerTransport>, entry: NodeAddr, poll_period: Duration) -> Self {
        Self {
            transport,
            candidates: VecDeque::from([entry.clone()]),
            entry,
            poll_period,
            fell_back: false,
        }
    }

    pub fn load_flow(path: &Path) -> Result<TaskSpec> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read flow file {}", path.display()))?;
        let spec = serde_json::from_str(&text)
            .with_context(|| format!("{} is not a valid task flow", path.display()))?;
        Ok(spec)
    }

    /// Node currently polled.
    pub fn target(&self) -> Option<&NodeAddr> {
        self.candidates.front()
    }

    pub async fn submit(&mut self, flow: TaskSpec) -> Result<FlowId> {
        let body = serde_json::to_value(SubmitFlowRequest { id: None, flow })?;
        let response: SubmitFlowResponse = send_json(
            self.transport.as_ref(),
            PeerRequest::post(&self.entry, ENDPOINT_JOBS, body),
        )
        .await?;

        tracing::info!("Submitted flow {} to {}", response.flow_id, self.entry);
        self.adopt_ranking(&response.ranking);
        Ok(response.flow_id)
    }

    pub async fn poll_once(&mut self, flow_id: &FlowId) -> Result<PollOutcome> {
        let target = self
            .target()
            .cloned()
            .ok_or_else(|| anyhow!("no node left to poll"))?;

        let reply: Result<ResultPollResponse, _> = send_json(
            self.transport.as_ref(),
            PeerRequest::get(&target, result_path(flow_id)),
        )
        .await;

        match reply {
            Ok(reply) => {
                self.adopt_ranking(&reply.ranking);
                match self.target() {
                    Some(head) if *head != target => Ok(PollOutcome::MasterMoved(head.clone())),
                    _ if reply.completed => Ok(PollOutcome::Completed(reply.results.unwrap_or_default())),
                    _ => Ok(PollOutcome::Pending),
                }
            }
            Err(e) => {
                tracing::warn!("Polling {} failed: {}", target, e);
                if self.candidates.len() > 1 {
                    self.candidates.pop_front();
                    Ok(PollOutcome::Retry)
                } else if !self.fell_back && target != self.entry {
                    self.fell_back = true;
                    self.candidates = VecDeque::from([self.entry.clone()]);
                    Ok(PollOutcome::Retry)
                } else {
                    Err(anyhow!("no reachable node left to poll: {}", e))
                }
            }
        }
    }

    /// Submits the flow, waits for completion, acknowledges it and returns the results.
    pub async fn run(&mut self, flow: TaskSpec) -> Result<ResultsMap> {
        let flow_id = self.submit(flow).await?;

        loop {
            match self.poll_once(&flow_id).await? {
                PollOutcome::Completed(results) => {
                    self.delete(&flow_id).await;
                    return Ok(results);
                }
                PollOutcome::Retry => continue,
                PollOutcome::MasterMoved(master) => {
                    tracing::info!("Master moved to {}", master);
                    tokio::time::sleep(self.poll_period).await;
                }
                PollOutcome::Pending => tokio::time::sleep(self.poll_period).await,
            }
        }
    }

    async fn delete(&self, flow_id: &FlowId) {
        let Some(target) = self.target() else {
            return;
        };
        if let Err(e) = self
            .transport
            .send(PeerRequest::delete(target, result_path(flow_id)))
            .await
        {
            tracing::warn!("Could not acknowledge flow {}: {}", flow_id, e);
        }
    }

    fn adopt_ranking(&mut self, ranking: &CandidateRanking) {
        if !ranking.is_empty() {
            self.candidates = ranking.addrs().into();
        }
    }
}
