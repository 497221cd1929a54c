//! Helpers for IPNS names and bootstrap peers.

use crate::{
    config::parse_multiaddr,
    error::{NodeError, Result},
    path::ContentPath,
};
use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};

/// Parse a bootstrap multiaddress. The last component must be
/// `/p2p/<peer-id>` so the node knows whom it is dialling.
pub fn parse_bootstrap_addr(text: &str) -> Result<Multiaddr> {
    let addr = parse_multiaddr(text)?;
    match addr.iter().last() {
        Some(Protocol::P2p(_)) => Ok(addr),
        _ => Err(NodeError::InvalidBootstrapAddr(text.trim().to_string())),
    }
}

/// The IPNS path a node publishes under.
pub fn self_name(peer_id: &PeerId) -> ContentPath {
    ContentPath::ipns(peer_id.to_string())
}
