//! Node lifecycle, content and naming operations.
//!
//! [`IpfsService`] owns at most one running node. Content and naming calls
//! share a read lock on the running state so they can proceed concurrently;
//! `start` and `stop` take the write lock, so a call never observes a node
//! that is half started or half stopped.

use crate::{
    backend::{LaunchOptions, NodeBackend, NodeLauncher},
    checkpoints::ContentSource,
    config::Config,
    error::{NodeError, Result},
    naming::parse_bootstrap_addr,
    path::{parse_cid, ContentPath},
    repo::Repo,
};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use std::{
    fmt,
    future::Future,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::RwLock;

/// Facts about a freshly started node.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    /// Local peer id.
    pub peer_id: PeerId,
    /// Addresses the swarm listens on.
    pub listen_addrs: Vec<Multiaddr>,
    /// TCP port the swarm is bound to.
    pub port: u16,
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IPFS node started on port {}", self.port)
    }
}

struct Running<N> {
    node: N,
    config: Config,
}

/// An embeddable IPFS node with an explicit start/stop lifecycle.
pub struct IpfsService<L: NodeLauncher> {
    launcher: L,
    state: RwLock<Option<Running<L::Node>>>,
}

impl<L: NodeLauncher> IpfsService<L> {
    /// Create a service. No node runs until [`IpfsService::start`].
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            state: RwLock::new(None),
        }
    }

    /// Prepare the repository and launch a node.
    pub async fn start(&self, config: Config) -> Result<NodeInfo> {
        let mut state = self.state.write().await;
        if state.is_some() {
            return Err(NodeError::AlreadyRunning);
        }

        let repo = Repo::open(config.repo_path())?;
        let keypair = repo.identity()?;
        let options = LaunchOptions {
            repo,
            keypair,
            listen_addrs: config.listen_addrs()?,
            bootstrap: config.bootstrap_addrs()?,
            mdns: config.mdns,
        };

        let node = self.launcher.launch(options).await?;
        let listen_addrs = match node.listen_addrs().await {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::warn!(error = %e, "could not read listen addresses");
                Vec::new()
            }
        };
        let info = NodeInfo {
            peer_id: node.peer_id(),
            port: bound_tcp_port(&listen_addrs).unwrap_or(config.port),
            listen_addrs,
        };

        tracing::info!(
            peer_id = %info.peer_id,
            port = info.port,
            repo = %config.repo_path().display(),
            "IPFS node started"
        );
        *state = Some(Running { node, config });
        Ok(info)
    }

    /// Shut the running node down.
    ///
    /// If the node reports a failure while shutting down it is kept as the
    /// running node so the caller can retry.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let running = state.take().ok_or(NodeError::NotRunning)?;
        if let Err(e) = running.node.shutdown().await {
            tracing::error!(error = %e, "IPFS node could not be stopped");
            *state = Some(running);
            return Err(e);
        }
        tracing::info!("IPFS node stopped");
        Ok(())
    }

    /// Whether a node is running.
    pub async fn is_running(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Local peer id.
    pub async fn peer_id(&self) -> Result<PeerId> {
        let state = self.state.read().await;
        Ok(running(&state)?.node.peer_id())
    }

    /// Add a file or directory, returning its root CID.
    pub async fn add(&self, path: impl AsRef<Path>) -> Result<Cid> {
        let path = path.as_ref();
        let state = self.state.read().await;
        let running = running(&state)?;
        let absolute = std::fs::canonicalize(path)
            .map_err(|_| NodeError::PathNotFound(path.to_path_buf()))?;
        tracing::debug!(
            path = %absolute.display(),
            directory = absolute.is_dir(),
            "adding to IPFS"
        );
        let cid = running.node.add(&absolute).await?;
        tracing::info!(%cid, path = %absolute.display(), "added to IPFS");
        Ok(cid)
    }

    /// Fetch the content at `target` (a CID or `/ipfs/` path) into `dest`.
    pub async fn get(&self, target: &str, dest: impl AsRef<Path>) -> Result<PathBuf> {
        let path = parse_content_ref(target)?;
        let dest = dest.as_ref().to_path_buf();
        let state = self.state.read().await;
        let running = running(&state)?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::debug!(%path, dest = %dest.display(), "fetching from IPFS");
        with_timeout(
            running.config.request_timeout_duration(),
            "get",
            running.node.get(&path, &dest),
        )
        .await?;
        Ok(dest)
    }

    /// Read the bytes of the file at `target`.
    pub async fn cat(&self, target: &str) -> Result<Bytes> {
        self.cat_path(&parse_content_ref(target)?).await
    }

    async fn cat_path(&self, path: &ContentPath) -> Result<Bytes> {
        let state = self.state.read().await;
        let running = running(&state)?;
        tracing::debug!(%path, "reading from IPFS");
        with_timeout(
            running.config.request_timeout_duration(),
            "cat",
            running.node.cat(path),
        )
        .await
    }

    /// Resolve an IPNS name or path to an `/ipfs/` path.
    ///
    /// Bare names are treated as `/ipns/<name>`; `/ipfs/` paths are returned
    /// as they are.
    pub async fn resolve(&self, name: &str) -> Result<ContentPath> {
        let path = ContentPath::parse_name(name)?;
        let state = self.state.read().await;
        let running = running(&state)?;
        if !path.is_ipns() {
            return Ok(path);
        }
        tracing::debug!(%path, "resolving IPNS name");
        with_timeout(
            running.config.request_timeout_duration(),
            "resolve",
            running.node.resolve(&path),
        )
        .await
    }

    /// Publish `target` under this node's IPNS name.
    pub async fn publish(&self, target: &str) -> Result<ContentPath> {
        let path = parse_content_ref(target)?;
        let state = self.state.read().await;
        let running = running(&state)?;
        let published = with_timeout(
            running.config.request_timeout_duration(),
            "publish",
            running.node.publish(&path),
        )
        .await?;
        tracing::info!(%path, name = %published, "published to IPNS");
        Ok(published)
    }

    /// Add a peer to the bootstrap list.
    pub async fn bootstrap_add(&self, addr: &str) -> Result<Multiaddr> {
        let addr = parse_bootstrap_addr(addr)?;
        let state = self.state.read().await;
        let added = running(&state)?.node.add_bootstrap(addr).await?;
        tracing::info!(addr = %added, "added bootstrap peer");
        Ok(added)
    }

    /// Fetch a JSON array of seed addresses stored at `target`.
    pub async fn seedlist(&self, target: &str) -> Result<Vec<String>> {
        let content = self.cat(target).await?;
        serde_json::from_slice(&content).map_err(|e| NodeError::InvalidSeedlist(e.to_string()))
    }

    /// Config of the running node.
    pub async fn config(&self) -> Result<Config> {
        let state = self.state.read().await;
        Ok(running(&state)?.config.clone())
    }
}

#[async_trait]
impl<L: NodeLauncher> ContentSource for IpfsService<L> {
    async fn fetch(&self, path: &ContentPath) -> Result<Bytes> {
        self.cat_path(path).await
    }
}

fn running<N>(state: &Option<Running<N>>) -> Result<&Running<N>> {
    state.as_ref().ok_or(NodeError::NotRunning)
}

/// A full `/ipfs/` or `/ipns/` path, or a CID with an optional sub-path.
fn parse_content_ref(text: &str) -> Result<ContentPath> {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        let root = trimmed.split('/').next().unwrap_or_default();
        parse_cid(root)?;
    }
    ContentPath::parse(trimmed)
}

async fn with_timeout<T>(
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| NodeError::Timeout { operation })?
}

fn bound_tcp_port(addrs: &[Multiaddr]) -> Option<u16> {
    addrs.iter().find_map(|addr| {
        addr.iter().find_map(|protocol| match protocol {
            Protocol::Tcp(port) if port != 0 => Some(port),
            _ => None,
        })
    })
}
