//! Embeddable IPFS node.
//!
//! This crate wraps an embedded IPFS implementation behind a small service
//! with an explicit lifecycle: start a node on a repository, add and fetch
//! content, resolve and publish IPNS names, manage bootstrap peers, then stop
//! it again. Peer routing, block exchange and IPNS records are left to the
//! embedded node; this crate prepares the repository, validates input and
//! reports results.
//!
//! ```no_run
//! use ipfs_node::{Config, EmbeddedLauncher, IpfsService};
//!
//! # async fn demo() -> ipfs_node::Result<()> {
//! let service = IpfsService::new(EmbeddedLauncher);
//! let info = service.start(Config::new("./data")).await?;
//! println!("peer id: {}", info.peer_id);
//!
//! let cid = service.add("./photo.jpg").await?;
//! service.get(&cid.to_string(), "./photo-copy.jpg").await?;
//!
//! let name = service.publish(&cid.to_string()).await?;
//! println!("published under {name}");
//!
//! service.stop().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod checkpoints;
pub mod config;
pub mod embedded;
pub mod envelope;
pub mod error;
pub mod naming;
pub mod path;
pub mod repo;
pub mod service;

use std::path::PathBuf;

/// Re-export commonly used types.
pub use backend::{LaunchOptions, NodeBackend, NodeLauncher};
pub use checkpoints::{
    parse_checkpoint, Checkpoint, CheckpointCache, CheckpointCollector, ContentSource,
};
pub use cid::Cid;
pub use config::Config;
pub use embedded::{EmbeddedLauncher, EmbeddedNode};
pub use envelope::{Status, StatusReport};
pub use error::{NodeError, Result};
pub use libp2p::{Multiaddr, PeerId};
pub use path::ContentPath;
pub use service::{IpfsService, NodeInfo};

/// The default data directory for the node.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("libipfs")
}
