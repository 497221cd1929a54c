//! Error types for the IPFS node.

use std::path::PathBuf;

/// A specialized `Result` type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// The error type for node operations.
#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    /// An operation needed a running node but none was started.
    #[error("IPFS node is not running")]
    NotRunning,
    /// `start` was called while a node was already running.
    #[error("IPFS node is already running")]
    AlreadyRunning,
    /// Text that should have been a CID could not be parsed.
    #[error("invalid CID '{0}'")]
    InvalidCid(String),
    /// An IPFS or IPNS path was malformed.
    #[error("invalid path '{0}'")]
    InvalidPath(String),
    /// A multiaddress could not be parsed.
    #[error("invalid multiaddress '{0}'")]
    InvalidMultiaddr(String),
    /// A bootstrap address did not name the peer to dial.
    #[error("bootstrap address '{0}' must end with /p2p/<peer-id>")]
    InvalidBootstrapAddr(String),
    /// A local file or directory does not exist.
    #[error("path {} does not exist", .0.display())]
    PathNotFound(PathBuf),
    /// The repository directory cannot be created or written to.
    #[error("{} is not writable: {reason}", path.display())]
    RepoNotWritable {
        /// Repository directory.
        path: PathBuf,
        /// Underlying cause.
        reason: String,
    },
    /// The node identity could not be loaded or stored.
    #[error("identity error: {0}")]
    Identity(String),
    /// An operation did not finish within the request timeout.
    #[error("{operation} timed out")]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
    },
    /// Seed list content was not a JSON array of strings.
    #[error("Invalid seedlist format: {0}")]
    InvalidSeedlist(String),
    /// Checkpoint content was not `height:hash`.
    #[error("invalid checkpoint: {0}")]
    InvalidCheckpoint(String),
    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The embedded IPFS implementation reported a failure.
    #[error("{0}")]
    Backend(String),
}

impl NodeError {
    /// Wrap any displayable backend failure.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        NodeError::Backend(err.to_string())
    }
}
