//! Peer Transport
//!
//! The only way nodes (and the client) talk to each other: send a JSON payload to an
//! address and get JSON back, or a failure. Callers treat every [`TransportError`] as
//! "peer unreachable for now" and recover by marking, rotating or reassigning.
//!
//! Outbound calls carry no timeout; a dead peer is detected through connection errors.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

use crate::membership::types::NodeAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// One outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerRequest {
    pub method: Method,
    pub addr: NodeAddr,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl PeerRequest {
    fn new(method: Method, addr: &NodeAddr, path: impl Into<String>) -> Self {
        Self {
            method,
            addr: addr.clone(),
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(addr: &NodeAddr, path: impl Into<String>) -> Self {
        Self::new(Method::Get, addr, path)
    }

    pub fn post(addr: &NodeAddr, path: impl Into<String>, body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::Post, addr, path)
        }
    }

    pub fn delete(addr: &NodeAddr, path: impl Into<String>) -> Self {
        Self::new(Method::Delete, addr, path)
    }

    pub fn with_header(mut self, name: &str, value: impl ToString) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, self.path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("peer {addr} unreachable: {reason}")]
    Unreachable { addr: NodeAddr, reason: String },
    #[error("peer {addr} answered with status {status}")]
    Status { addr: NodeAddr, status: u16 },
    #[error("undecodable reply: {0}")]
    Decode(String),
}

pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, TransportError>> + Send + 'a>>;

/// "Send JSON to address, receive JSON or failure."
pub trait PeerTransport: Send + Sync {
    fn send(&self, request: PeerRequest) -> TransportFuture<'_>;
}

/// Sends the request and decodes the reply into `T`.
pub async fn send_json<T: DeserializeOwned>(
    transport: &dyn PeerTransport,
    request: PeerRequest,
) -> Result<T, TransportError> {
    let value = transport.send(request).await?;
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

/// reqwest-backed transport used by running nodes and the client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    async fn execute(&self, request: PeerRequest) -> Result<Value, TransportError> {
        let url = request.url();
        let mut builder = match request.method {
            Method::Get => self.http_client.get(&url),
            Method::Post => self.http_client.post(&url),
            Method::Delete => self.http_client.delete(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Unreachable {
                addr: request.addr.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                addr: request.addr,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Unreachable {
                addr: request.addr.clone(),
                reason: e.to_string(),
            })?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

impl PeerTransport for HttpTransport {
    fn send(&self, request: PeerRequest) -> TransportFuture<'_> {
        tracing::debug!("{:?} {}", request.method, request.url());
        Box::pin(self.execute(request))
    }
}
