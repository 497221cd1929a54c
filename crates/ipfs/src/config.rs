//! Configuration for the IPFS node.

use crate::error::{NodeError, Result};
use libp2p::Multiaddr;
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Default swarm port, the conventional IPFS port.
pub const DEFAULT_PORT: u16 = 4001;

/// Name of the repository directory created under the data directory.
pub const REPO_DIR: &str = "ipfs";

/// Configuration for the IPFS node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory the node repository is created in. Empty means the
    /// current directory.
    pub repo_root: PathBuf,
    /// TCP port the swarm listens on
    pub port: u16,
    /// Enable mDNS for local discovery
    pub mdns: bool,
    /// Bootstrap nodes, as multiaddress strings
    pub bootstrap_nodes: Vec<String>,
    /// Upper bound for network-bound requests (get, cat, resolve, publish)
    pub request_timeout_secs: u64,
    /// How often the checkpoint collector polls its source
    pub checkpoint_interval_secs: u64,
    /// Number of checkpoints kept in memory
    pub max_checkpoints: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::new(),
            port: DEFAULT_PORT,
            mdns: false,
            bootstrap_nodes: default_bootstrap_nodes(),
            request_timeout_secs: 60,
            checkpoint_interval_secs: 20,
            max_checkpoints: 10,
        }
    }
}

impl Config {
    /// Create a new config rooted at the given data directory
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            ..Self::default()
        }
    }

    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml(&raw)
    }

    /// Parse a config from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Set the swarm port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Enable/disable mDNS
    pub fn mdns(mut self, enabled: bool) -> Self {
        self.mdns = enabled;
        self
    }

    /// Set the bootstrap nodes
    pub fn bootstrap_nodes(mut self, nodes: Vec<String>) -> Self {
        self.bootstrap_nodes = nodes;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Directory holding the node repository.
    pub fn repo_path(&self) -> PathBuf {
        self.repo_root.join(REPO_DIR)
    }

    /// Addresses the swarm listens on.
    pub fn listen_addrs(&self) -> Result<Vec<Multiaddr>> {
        [
            format!("/ip4/0.0.0.0/tcp/{}", self.port),
            format!("/ip6/::/tcp/{}", self.port),
        ]
        .iter()
        .map(|addr| parse_multiaddr(addr))
        .collect()
    }

    /// Bootstrap nodes parsed and checked for a trailing `/p2p/` component.
    pub fn bootstrap_addrs(&self) -> Result<Vec<Multiaddr>> {
        self.bootstrap_nodes
            .iter()
            .map(|addr| crate::naming::parse_bootstrap_addr(addr))
            .collect()
    }

    /// Request timeout as a `Duration`, at least one second.
    pub fn request_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Checkpoint poll interval as a `Duration`, at least one second.
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs.max(1))
    }
}

pub(crate) fn parse_multiaddr(addr: &str) -> Result<Multiaddr> {
    addr.trim()
        .parse()
        .map_err(|_| NodeError::InvalidMultiaddr(addr.to_string()))
}

/// Public libp2p bootstrap peers.
fn default_bootstrap_nodes() -> Vec<String> {
    [
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN",
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa",
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmbLHAnMoJPWSCR5Zhtx6BHJX9KiKNN6tpvbUcqanj75Nb",
        "/dnsaddr/bootstrap.libp2p.io/p2p/QmcZf59bWwK5XFi76CZX8cbJ4BhTzzA3gU1ZjYZcYW3dwt",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
