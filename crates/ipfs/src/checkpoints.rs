//! Background collection of `height:hash` checkpoints.
//!
//! A publisher keeps a small text object of the form `height:hash` behind an
//! IPNS name and updates it as the chain advances. The collector polls that
//! name, keeps the most recent checkpoints in memory and lets embedders look
//! them up by height without waiting on the network.

use crate::{
    error::{NodeError, Result},
    path::ContentPath,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Anything that can read content by path.
#[async_trait]
pub trait ContentSource: Send + Sync + 'static {
    /// Read the bytes at `path`.
    async fn fetch(&self, path: &ContentPath) -> Result<Bytes>;
}

/// A block height and the hash published for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Block height.
    pub height: u64,
    /// Block hash at that height.
    pub hash: String,
}

/// Parse `height:hash`.
pub fn parse_checkpoint(raw: &str) -> Result<Checkpoint> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    let [height, hash] = parts.as_slice() else {
        return Err(NodeError::InvalidCheckpoint(
            "expected exactly one ':' separating height and hash".into(),
        ));
    };
    let height = height
        .trim()
        .parse::<u64>()
        .map_err(|_| NodeError::InvalidCheckpoint(format!("height '{height}' is not a number")))?;
    let hash = hash.trim();
    if hash.is_empty() {
        return Err(NodeError::InvalidCheckpoint("empty hash".into()));
    }
    Ok(Checkpoint {
        height,
        hash: hash.to_string(),
    })
}

/// Bounded height → hash map. When full, the lowest height is dropped.
#[derive(Debug)]
pub struct CheckpointCache {
    capacity: usize,
    entries: RwLock<BTreeMap<u64, String>>,
}

impl CheckpointCache {
    /// Cache holding at most `capacity` checkpoints (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Store a checkpoint. Returns `false` if the height was already known,
    /// in which case the stored hash is kept.
    pub fn insert(&self, checkpoint: Checkpoint) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&checkpoint.height) {
            return false;
        }
        entries.insert(checkpoint.height, checkpoint.hash);
        while entries.len() > self.capacity {
            entries.pop_first();
        }
        true
    }

    /// Hash stored for `height`.
    pub fn get(&self, height: u64) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&height)
            .cloned()
    }

    /// Number of stored checkpoints.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is stored yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored heights, lowest first.
    pub fn heights(&self) -> Vec<u64> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

/// Handle to a running collection task. Dropping it stops the task.
pub struct CheckpointCollector {
    cache: Arc<CheckpointCache>,
    path: ContentPath,
    handle: JoinHandle<()>,
}

impl CheckpointCollector {
    /// Poll `path` on `source` every `interval`, starting immediately.
    /// Intervals below one second are raised to one second.
    pub fn spawn<S: ContentSource>(
        source: Arc<S>,
        path: ContentPath,
        cache: Arc<CheckpointCache>,
        interval: Duration,
    ) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        tracing::info!(%path, interval_secs = interval.as_secs(), "starting checkpoint collection");
        let task_cache = Arc::clone(&cache);
        let task_path = path.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match collect_once(source.as_ref(), &task_path, &task_cache).await {
                    Ok(Some(checkpoint)) => tracing::info!(
                        height = checkpoint.height,
                        hash = %checkpoint.hash,
                        cached = task_cache.len(),
                        "cached new checkpoint"
                    ),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, path = %task_path, "checkpoint poll failed")
                    }
                }
            }
        });
        Self {
            cache,
            path,
            handle,
        }
    }

    /// The cache this collector fills.
    pub fn cache(&self) -> &Arc<CheckpointCache> {
        &self.cache
    }

    /// The polled path.
    pub fn path(&self) -> &ContentPath {
        &self.path
    }

    /// Stop polling.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for CheckpointCollector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One poll: fetch, parse and store. Returns the checkpoint if it was new.
pub async fn collect_once<S: ContentSource + ?Sized>(
    source: &S,
    path: &ContentPath,
    cache: &CheckpointCache,
) -> Result<Option<Checkpoint>> {
    let content = source.fetch(path).await?;
    let text = std::str::from_utf8(&content)
        .map_err(|_| NodeError::InvalidCheckpoint("content is not UTF-8".into()))?;
    let checkpoint = parse_checkpoint(text)?;
    Ok(cache.insert(checkpoint.clone()).then_some(checkpoint))
}
