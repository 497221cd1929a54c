//! Node backend built on the `rust-ipfs` crate.
//!
//! Values cross into `rust-ipfs` through their textual forms so the service
//! does not depend on which `cid`/`multiaddr` releases `rust-ipfs` pins.

use crate::{
    backend::{LaunchOptions, NodeBackend, NodeLauncher},
    error::{NodeError, Result},
    path::ContentPath,
};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use libp2p::{Multiaddr, PeerId};
use rust_ipfs::{Ipfs, IpfsPath, UninitializedIpfsDefault as UninitializedIpfs};
use std::path::Path;

/// Launches [`EmbeddedNode`]s in the current tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedLauncher;

#[async_trait]
impl NodeLauncher for EmbeddedLauncher {
    type Node = EmbeddedNode;

    async fn launch(&self, options: LaunchOptions) -> Result<EmbeddedNode> {
        let LaunchOptions {
            repo,
            keypair,
            listen_addrs,
            bootstrap,
            mdns,
        } = options;
        let peer_id = keypair.public().to_peer_id();

        let listen_addrs = listen_addrs
            .iter()
            .map(to_backend_addr)
            .collect::<Result<Vec<_>>>()?;
        let bootstrap = bootstrap
            .iter()
            .map(to_backend_addr)
            .collect::<Result<Vec<_>>>()?;

        let mut builder = UninitializedIpfs::new()
            .with_default()
            .set_path(repo.path())
            .set_keypair(&keypair)
            .add_listening_addrs(listen_addrs);
        if mdns {
            builder = builder.with_mdns();
        }

        tracing::debug!(repo = %repo.path().display(), %peer_id, mdns, "launching embedded node");
        let ipfs = builder.start().await.map_err(NodeError::backend)?;

        for addr in bootstrap.iter().cloned() {
            if let Err(e) = ipfs.add_bootstrap(addr).await {
                // The service never receives this node, so it is stopped here.
                ipfs.clone().exit_daemon().await;
                return Err(NodeError::backend(e));
            }
        }
        if !bootstrap.is_empty() {
            if let Err(e) = ipfs.bootstrap().await {
                tracing::warn!(error = %e, "initial bootstrap failed");
            }
        }

        Ok(EmbeddedNode { ipfs, peer_id })
    }
}

/// A running `rust-ipfs` node.
pub struct EmbeddedNode {
    ipfs: Ipfs,
    peer_id: PeerId,
}

#[async_trait]
impl NodeBackend for EmbeddedNode {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn listen_addrs(&self) -> Result<Vec<Multiaddr>> {
        let addrs = self
            .ipfs
            .listening_addresses()
            .await
            .map_err(NodeError::backend)?;
        addrs.iter().map(from_backend_addr).collect()
    }

    async fn add(&self, path: &Path) -> Result<Cid> {
        let added = self
            .ipfs
            .add_unixfs(path.to_path_buf())
            .await
            .map_err(NodeError::backend)?;
        let added = from_ipfs_path(&added)?;
        added
            .cid()
            .copied()
            .ok_or_else(|| NodeError::Backend(format!("add returned non-IPFS path {added}")))
    }

    async fn get(&self, path: &ContentPath, dest: &Path) -> Result<()> {
        self.ipfs
            .get_unixfs(to_ipfs_path(path)?, dest.to_path_buf())
            .await
            .map_err(NodeError::backend)
    }

    async fn cat(&self, path: &ContentPath) -> Result<Bytes> {
        self.ipfs
            .cat_unixfs(to_ipfs_path(path)?)
            .await
            .map(Bytes::from)
            .map_err(NodeError::backend)
    }

    async fn resolve(&self, path: &ContentPath) -> Result<ContentPath> {
        let resolved = self
            .ipfs
            .resolve_ipns(&to_ipfs_path(path)?, true)
            .await
            .map_err(NodeError::backend)?;
        from_ipfs_path(&resolved)
    }

    async fn publish(&self, path: &ContentPath) -> Result<ContentPath> {
        let published = self
            .ipfs
            .publish_ipns(&to_ipfs_path(path)?)
            .await
            .map_err(NodeError::backend)?;
        from_ipfs_path(&published)
    }

    async fn add_bootstrap(&self, addr: Multiaddr) -> Result<Multiaddr> {
        let added = self
            .ipfs
            .add_bootstrap(to_backend_addr(&addr)?)
            .await
            .map_err(NodeError::backend)?;
        from_backend_addr(&added)
    }

    async fn shutdown(&self) -> Result<()> {
        self.ipfs.clone().exit_daemon().await;
        Ok(())
    }
}

fn to_ipfs_path(path: &ContentPath) -> Result<IpfsPath> {
    path.to_string()
        .parse::<IpfsPath>()
        .map_err(|e| NodeError::InvalidPath(format!("{path}: {e}")))
}

fn from_ipfs_path(path: &IpfsPath) -> Result<ContentPath> {
    ContentPath::parse(&path.to_string())
}

fn to_backend_addr(addr: &Multiaddr) -> Result<rust_ipfs::Multiaddr> {
    addr.to_string()
        .parse()
        .map_err(|_| NodeError::InvalidMultiaddr(addr.to_string()))
}

fn from_backend_addr(addr: &rust_ipfs::Multiaddr) -> Result<Multiaddr> {
    crate::config::parse_multiaddr(&addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_bootstrap_addrs_convert_before_launch() {
        let addrs = Config::default().bootstrap_addrs().unwrap();
        for addr in &addrs {
            let converted = to_backend_addr(addr).unwrap();
            assert_eq!(from_backend_addr(&converted).unwrap(), *addr);
        }
    }
}
