//! The seam between the service and the IPFS implementation it drives.

use crate::{error::Result, path::ContentPath, repo::Repo};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use libp2p::{identity::Keypair, Multiaddr, PeerId};
use std::path::Path;

/// Everything a launcher needs to bring a node online.
#[derive(Debug)]
pub struct LaunchOptions {
    /// Prepared repository directory.
    pub repo: Repo,
    /// Node identity loaded from the repository.
    pub keypair: Keypair,
    /// Swarm listen addresses.
    pub listen_addrs: Vec<Multiaddr>,
    /// Peers dialled when the node comes up.
    pub bootstrap: Vec<Multiaddr>,
    /// Whether mDNS discovery is enabled.
    pub mdns: bool,
}

/// Starts nodes. Kept separate from [`NodeBackend`] so a service can be
/// created before any node exists.
#[async_trait]
pub trait NodeLauncher: Send + Sync + 'static {
    /// The running node type.
    type Node: NodeBackend;

    /// Launch a node with the given options.
    async fn launch(&self, options: LaunchOptions) -> Result<Self::Node>;
}

/// A running IPFS node.
///
/// Inputs arrive validated; implementations only translate them to the
/// underlying node and report its failures as [`crate::NodeError::Backend`].
#[async_trait]
pub trait NodeBackend: Send + Sync + 'static {
    /// Local peer id.
    fn peer_id(&self) -> PeerId;

    /// Addresses the swarm is currently listening on.
    async fn listen_addrs(&self) -> Result<Vec<Multiaddr>>;

    /// Add a file or directory and return its root CID.
    async fn add(&self, path: &Path) -> Result<Cid>;

    /// Write the UnixFS content at `path` to `dest`.
    async fn get(&self, path: &ContentPath, dest: &Path) -> Result<()>;

    /// Read the bytes of the file at `path`.
    async fn cat(&self, path: &ContentPath) -> Result<Bytes>;

    /// Resolve an `/ipns/` path to an `/ipfs/` path, recursively.
    async fn resolve(&self, path: &ContentPath) -> Result<ContentPath>;

    /// Publish `path` under the node's own key, returning the `/ipns/` path.
    async fn publish(&self, path: &ContentPath) -> Result<ContentPath>;

    /// Add a peer to the bootstrap list.
    async fn add_bootstrap(&self, addr: Multiaddr) -> Result<Multiaddr>;

    /// Shut the node down.
    async fn shutdown(&self) -> Result<()>;
}
