//! Node Configuration
//!
//! Resolves a [`NodeConfig`] from `key=value` command-line tokens and two optional
//! properties files:
//! - `config/slaves.properties`: `slaves.paths=host:port host:port ...`, the peers probed
//!   at startup.
//! - `config/modules.properties`: `modules.whitelist=*` (no restriction) or a
//!   space-separated list of action modules a worker may run.
//!
//! Missing files are not an error; malformed values are.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::worker::ModulePolicy;
use crate::membership::types::{AddrError, DEFAULT_PORT, NodeAddr};

pub const PEERS_KEY: &str = "slaves.paths";
pub const WHITELIST_KEY: &str = "modules.whitelist";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },
    #[error(transparent)]
    Addr(#[from] AddrError),
}

/// Subsystems whose logs can be switched to debug level with `debug=<component>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    Dispatcher,
    Engine,
    Aggregator,
    Manager,
    All,
}

impl DebugMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dispatcher" => Some(Self::Dispatcher),
            "engine" => Some(Self::Engine),
            "aggregator" => Some(Self::Aggregator),
            "manager" => Some(Self::Manager),
            "all" | "true" => Some(Self::All),
            _ => None,
        }
    }

    /// `tracing_subscriber::EnvFilter` directive enabling this component.
    pub fn filter_directive(&self) -> String {
        match self {
            Self::Dispatcher => "node_fog::dispatcher=debug".to_string(),
            Self::Engine => "node_fog::engine=debug".to_string(),
            Self::Aggregator => "node_fog::aggregator=debug".to_string(),
            Self::Manager => "node_fog::manager=debug".to_string(),
            Self::All => "node_fog=debug".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Extra peer to probe first at startup.
    pub link: Option<NodeAddr>,
    pub score: f64,
    pub battery: bool,
    pub debug: Option<DebugMode>,
    /// Never volunteer as master candidate.
    pub nomaster: bool,
    pub peers_file: PathBuf,
    pub modules_file: PathBuf,
    pub heartbeat_interval: Duration,
    pub deprecation_lapse: Duration,
    pub dispatch_retry_delay: Duration,
    pub client_poll_period: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            link: None,
            score: 0.0,
            battery: false,
            debug: None,
            nomaster: false,
            peers_file: PathBuf::from("config/slaves.properties"),
            modules_file: PathBuf::from("config/modules.properties"),
            heartbeat_interval: Duration::from_secs(10),
            deprecation_lapse: Duration::from_secs(30),
            dispatch_retry_delay: Duration::from_secs(10),
            client_poll_period: Duration::from_secs(5),
        }
    }
}

impl NodeConfig {
    /// Applies `key=value` tokens over the defaults. Tokens without `=` and unknown
    /// keys are ignored.
    pub fn from_args<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        for arg in args {
            if let Some((key, value)) = arg.as_ref().split_once('=') {
                config.apply(key.trim(), value.trim())?;
            }
        }
        Ok(config)
    }

    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "host" => self.host = value.to_string(),
            "port" => self.port = parse_value(key, value)?,
            "link" => self.link = Some(value.parse()?),
            "score" => self.score = parse_value(key, value)?,
            "battery" => self.battery = parse_value(key, value)?,
            "nomaster" => self.nomaster = parse_value(key, value)?,
            "debug" => {
                self.debug = Some(DebugMode::parse(value).ok_or_else(|| invalid(key, value))?)
            }
            "slaves" | "peers_file" => self.peers_file = PathBuf::from(value),
            "modules" | "modules_file" => self.modules_file = PathBuf::from(value),
            "heartbeat_ms" => self.heartbeat_interval = parse_millis(key, value)?,
            "lapse_ms" => self.deprecation_lapse = parse_millis(key, value)?,
            "retry_ms" => self.dispatch_retry_delay = parse_millis(key, value)?,
            "poll_ms" => self.client_poll_period = parse_millis(key, value)?,
            _ => tracing::debug!("Ignoring unknown config key '{}'", key),
        }
        Ok(())
    }

    pub fn local_addr(&self) -> NodeAddr {
        NodeAddr::new(self.host.clone(), self.port)
    }

    /// Peers probed at startup: `link` first, then the properties file, never self.
    pub fn load_peers(&self) -> anyhow::Result<Vec<NodeAddr>> {
        let mut peers = Vec::new();
        if let Some(link) = &self.link {
            peers.push(link.clone());
        }

        if let Some(properties) = read_properties(&self.peers_file)?
            && let Some(paths) = properties.get(PEERS_KEY)
        {
            for entry in paths.split_whitespace() {
                peers.push(entry.parse::<NodeAddr>()?);
            }
        }

        let local = self.local_addr();
        let mut unique: Vec<NodeAddr> = Vec::with_capacity(peers.len());
        for peer in peers {
            if peer != local && !unique.contains(&peer) {
                unique.push(peer);
            }
        }
        Ok(unique)
    }

    /// Without a whitelist file every module is allowed.
    pub fn load_module_policy(&self) -> anyhow::Result<ModulePolicy> {
        let whitelist = read_properties(&self.modules_file)?
            .and_then(|properties| properties.get(WHITELIST_KEY).cloned());

        Ok(match whitelist {
            Some(list) => ModulePolicy::from_whitelist(&list),
            None => ModulePolicy::unrestricted(),
        })
    }
}

/// Java-style `.properties` subset: `key=value` or `key: value` per line, `#`/`!` comments.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
        .collect()
}

fn read_properties(path: &Path) -> anyhow::Result<Option<HashMap<String, String>>> {
    if !path.exists() {
        tracing::debug!("No properties file at {}", path.display());
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)?;
    Ok(Some(parse_properties(&text)))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_value::<u64>(key, value).map(Duration::from_millis)
}
