//! IPFS repository management.
//!
//! The repository is the on-disk directory the embedded node keeps its
//! blocks and keys in. Before a node is launched the directory must exist and
//! be writable, and the node identity stored in it is loaded so the peer id
//! stays the same across restarts.

use crate::error::{NodeError, Result};
use libp2p::identity::Keypair;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

/// File holding the protobuf-encoded node keypair.
pub const IDENTITY_FILE: &str = "identity.key";

const WRITE_PROBE: &str = ".write-probe";

/// An opened, writable repository directory.
#[derive(Debug, Clone)]
pub struct Repo {
    path: PathBuf,
}

impl Repo {
    /// Open the repository at `path`, creating the directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_writable(&path)?;
        Ok(Self { path })
    }

    /// Repository directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the node keypair, generating and storing an ed25519 one on first
    /// use.
    pub fn identity(&self) -> Result<Keypair> {
        let key_path = self.path.join(IDENTITY_FILE);
        match fs::read(&key_path) {
            Ok(bytes) => Keypair::from_protobuf_encoding(&bytes).map_err(|e| {
                NodeError::Identity(format!("corrupt {}: {e}", key_path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let keypair = Keypair::generate_ed25519();
                let encoded = keypair
                    .to_protobuf_encoding()
                    .map_err(|e| NodeError::Identity(e.to_string()))?;
                fs::write(&key_path, encoded)?;
                restrict_permissions(&key_path)?;
                tracing::info!(
                    peer_id = %keypair.public().to_peer_id(),
                    path = %key_path.display(),
                    "generated new node identity"
                );
                Ok(keypair)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Make sure `dir` exists and the current user can write to it.
pub fn ensure_writable(dir: &Path) -> Result<()> {
    let not_writable = |reason: String| NodeError::RepoNotWritable {
        path: dir.to_path_buf(),
        reason,
    };

    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => Err(not_writable("not a directory".into())),
        Ok(_) => {
            let probe = dir.join(WRITE_PROBE);
            fs::File::create(&probe).map_err(|e| not_writable(e.to_string()))?;
            fs::remove_file(&probe).map_err(|e| not_writable(e.to_string()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(dir).map_err(|e| not_writable(e.to_string()))
        }
        Err(e) => Err(not_writable(e.to_string())),
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
