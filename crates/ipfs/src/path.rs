//! Parsing and normalisation of `/ipfs/` and `/ipns/` paths.
//!
//! Callers hand the node loosely formatted text: a bare CID, a DNSLink name
//! such as `ipfs.io`, or a fully qualified path with sub-path segments.
//! [`ContentPath`] turns all of these into one canonical form before any of
//! it reaches the embedded node.

use crate::error::{NodeError, Result};
use cid::Cid;
use std::{fmt, str::FromStr};

/// A parsed IPFS or IPNS path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPath {
    /// Immutable content: `/ipfs/<cid>/<rest...>`
    Ipfs {
        /// Root CID.
        cid: Cid,
        /// Sub-path segments below the root.
        rest: Vec<String>,
    },
    /// Mutable name: `/ipns/<name>/<rest...>`
    Ipns {
        /// Peer id, DNSLink domain or key name.
        name: String,
        /// Sub-path segments below the name.
        rest: Vec<String>,
    },
}

impl ContentPath {
    /// Path to the root of a CID.
    pub fn ipfs(cid: Cid) -> Self {
        ContentPath::Ipfs {
            cid,
            rest: Vec::new(),
        }
    }

    /// Path to the root of an IPNS name.
    pub fn ipns(name: impl Into<String>) -> Self {
        ContentPath::Ipns {
            name: name.into(),
            rest: Vec::new(),
        }
    }

    /// Parse `text`.
    ///
    /// A bare CID becomes `/ipfs/<cid>`, any other bare name becomes
    /// `/ipns/<name>`.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let invalid = || NodeError::InvalidPath(text.to_string());

        let mut segments = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
        let first = segments.next().ok_or_else(invalid)?;

        let namespace = match first.as_str() {
            "ipfs" | "ipns" => Some(first.clone()),
            _ if trimmed.starts_with('/') => return Err(invalid()),
            _ => None,
        };

        match namespace.as_deref() {
            Some("ipfs") => {
                let root = segments.next().ok_or_else(invalid)?;
                Ok(ContentPath::Ipfs {
                    cid: parse_cid(&root)?,
                    rest: segments.collect(),
                })
            }
            Some(_) => {
                let name = segments.next().ok_or_else(invalid)?;
                Ok(ContentPath::Ipns {
                    name,
                    rest: segments.collect(),
                })
            }
            None => match first.parse::<Cid>() {
                Ok(cid) => Ok(ContentPath::Ipfs {
                    cid,
                    rest: segments.collect(),
                }),
                Err(_) => Ok(ContentPath::Ipns {
                    name: first,
                    rest: segments.collect(),
                }),
            },
        }
    }

    /// Parse `text` as something to resolve.
    ///
    /// Unlike [`ContentPath::parse`], bare text is always a name, even when
    /// it looks like a CID (older peer ids do), so only an explicit `/ipfs/`
    /// prefix yields an immutable path.
    pub fn parse_name(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.starts_with('/') {
            return ContentPath::parse(trimmed);
        }
        let mut segments = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);
        let name = segments
            .next()
            .ok_or_else(|| NodeError::InvalidPath(text.to_string()))?;
        Ok(ContentPath::Ipns {
            name,
            rest: segments.collect(),
        })
    }

    /// Root CID of an `/ipfs/` path.
    pub fn cid(&self) -> Option<&Cid> {
        match self {
            ContentPath::Ipfs { cid, .. } => Some(cid),
            ContentPath::Ipns { .. } => None,
        }
    }

    /// Whether this path still needs name resolution.
    pub fn is_ipns(&self) -> bool {
        matches!(self, ContentPath::Ipns { .. })
    }

    /// Sub-path segments below the root.
    pub fn rest(&self) -> &[String] {
        match self {
            ContentPath::Ipfs { rest, .. } | ContentPath::Ipns { rest, .. } => rest,
        }
    }
}

impl FromStr for ContentPath {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self> {
        ContentPath::parse(s)
    }
}

impl From<Cid> for ContentPath {
    fn from(cid: Cid) -> Self {
        ContentPath::ipfs(cid)
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentPath::Ipfs { cid, .. } => write!(f, "/ipfs/{cid}")?,
            ContentPath::Ipns { name, .. } => write!(f, "/ipns/{name}")?,
        }
        for segment in self.rest() {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Parse a CID, reporting the offending text on failure.
pub fn parse_cid(text: &str) -> Result<Cid> {
    let trimmed = text.trim();
    trimmed
        .parse::<Cid>()
        .map_err(|_| NodeError::InvalidCid(trimmed.to_string()))
}
