//! Replica configuration.
//!
//! Loaded from a TOML file, then overridden by CLI flags and finally by the
//! `NODE_ID`, `PORT`, and `LOG_FILE` environment variables. Example:
//!
//! ```toml
//! [node]
//! id = "node1"
//! listen_addr = "0.0.0.0:5000"
//!
//! [cluster]
//! bootstrap_leader = "node1"
//!
//! [cluster.peers]
//! node2 = "http://node2:5000"
//! node3 = "http://node3:5000"
//! node4 = "http://node4:5000"
//!
//! [genesis]
//! timestamp = 1700000000.0
//! expected_hash = "..."
//!
//! [consensus]
//! max_block_transactions = 50
//! include_own_entropy = false
//! ```

use crate::fabric::FabricConfig;
use anyhow::{Context, Result};
use chaosledger_engine::EngineConfig;
use chaosledger_types::{Block, NodeId, DEFAULT_GENESIS_TIMESTAMP};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level replica configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSection,

    #[serde(default)]
    pub cluster: ClusterSection,

    #[serde(default)]
    pub genesis: GenesisSection,

    #[serde(default)]
    pub consensus: ConsensusSection,

    #[serde(default)]
    pub fabric: FabricSection,
}

/// Node identity.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSection {
    /// This replica's id within the cluster.
    pub id: String,

    /// Address the HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Optional log file; logs go to stderr when unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

/// Static cluster membership.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClusterSection {
    /// The replica that announces itself as leader at startup.
    #[serde(default)]
    pub bootstrap_leader: Option<String>,

    /// Peer base URLs keyed by node id; this replica must not appear.
    #[serde(default)]
    pub peers: BTreeMap<String, String>,
}

/// Cluster-agreed genesis parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct GenesisSection {
    /// Agreed genesis timestamp; identical on every replica.
    #[serde(default = "default_genesis_timestamp")]
    pub timestamp: f64,

    /// Expected genesis hash; boot fails loudly on mismatch when set.
    #[serde(default)]
    pub expected_hash: Option<String>,
}

impl Default for GenesisSection {
    fn default() -> Self {
        Self {
            timestamp: default_genesis_timestamp(),
            expected_hash: None,
        }
    }
}

fn default_genesis_timestamp() -> f64 {
    DEFAULT_GENESIS_TIMESTAMP
}

/// Consensus tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusSection {
    /// Maximum transactions per proposed block.
    #[serde(default = "default_max_block_transactions")]
    pub max_block_transactions: usize,

    /// Whether the leader includes its own sample at aggregation time.
    #[serde(default)]
    pub include_own_entropy: bool,

    /// Optional per-node aggregation weights.
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        Self {
            max_block_transactions: default_max_block_transactions(),
            include_own_entropy: false,
            weights: BTreeMap::new(),
        }
    }
}

fn default_max_block_transactions() -> usize {
    50
}

/// Outbound fabric tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct FabricSection {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff between retries in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Backoff for the infinite bootstrap leader announcement.
    #[serde(default = "default_announce_backoff_ms")]
    pub announce_backoff_ms: u64,
}

impl Default for FabricSection {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            announce_backoff_ms: default_announce_backoff_ms(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    2_000
}

fn default_announce_backoff_ms() -> u64 {
    5_000
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Parse a config from a TOML string (tests, embedded defaults).
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse config")
    }

    /// Apply `NODE_ID`, `PORT`, and `LOG_FILE` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(id) = std::env::var("NODE_ID") {
            if !id.is_empty() {
                self.node.id = id;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if !port.is_empty() {
                let port: u16 = port
                    .parse()
                    .with_context(|| format!("invalid PORT value {port:?}"))?;
                let host = self
                    .node
                    .listen_addr
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                self.node.listen_addr = format!("{host}:{port}");
            }
        }
        if let Ok(log_file) = std::env::var("LOG_FILE") {
            if !log_file.is_empty() {
                self.node.log_file = Some(PathBuf::from(log_file));
            }
        }
        Ok(())
    }

    /// The socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.node
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address {:?}", self.node.listen_addr))
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.node.id.clone())
    }

    /// Peer ids, excluding this replica if it was listed by mistake.
    pub fn peer_ids(&self) -> Vec<NodeId> {
        self.cluster
            .peers
            .keys()
            .filter(|id| **id != self.node.id)
            .map(|id| NodeId::new(id.clone()))
            .collect()
    }

    /// Peer map keyed by [`NodeId`] for the fabric.
    pub fn peer_map(&self) -> BTreeMap<NodeId, String> {
        self.cluster
            .peers
            .iter()
            .filter(|(id, _)| **id != self.node.id)
            .map(|(id, url)| (NodeId::new(id.clone()), url.trim_end_matches('/').to_string()))
            .collect()
    }

    /// The genesis block this replica starts from.
    pub fn genesis_block(&self) -> Block {
        Block::genesis(self.genesis.timestamp)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_block_transactions: self.consensus.max_block_transactions,
            include_own_entropy: self.consensus.include_own_entropy,
            weights: self
                .consensus
                .weights
                .iter()
                .map(|(id, w)| (NodeId::new(id.clone()), *w))
                .collect(),
        }
    }

    pub fn fabric_config(&self) -> FabricConfig {
        FabricConfig {
            request_timeout: Duration::from_millis(self.fabric.request_timeout_ms),
            max_retries: self.fabric.max_retries,
            retry_backoff: Duration::from_millis(self.fabric.retry_backoff_ms),
            announce_backoff: Duration::from_millis(self.fabric.announce_backoff_ms),
        }
    }

    /// Whether this replica is the configured bootstrap leader.
    pub fn is_bootstrap_leader(&self) -> bool {
        self.cluster.bootstrap_leader.as_deref() == Some(self.node.id.as_str())
    }
}
