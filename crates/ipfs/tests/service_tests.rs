use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use ipfs_node::{
    checkpoints::collect_once, naming::self_name, CheckpointCache, Config, ContentPath,
    IpfsService, LaunchOptions, Multiaddr, NodeBackend, NodeError, NodeLauncher, PeerId, Result,
    StatusReport,
};
use multihash_codetable::{Code, MultihashDigest};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};
use tempfile::{tempdir, TempDir};

const RAW: u64 = 0x55;
const DAG_PB: u64 = 0x70;

/// State shared between a launcher and every node it starts.
#[derive(Default)]
struct Network {
    blocks: Mutex<HashMap<Cid, Vec<u8>>>,
    links: Mutex<HashMap<(Cid, String), Cid>>,
    names: Mutex<HashMap<String, ContentPath>>,
    bootstrap: Mutex<Vec<Multiaddr>>,
    launched_with_bootstrap: Mutex<Vec<usize>>,
    shutdowns: Mutex<usize>,
    refuse_shutdown: Mutex<bool>,
}

#[derive(Clone, Default)]
struct MemoryLauncher {
    network: Arc<Network>,
    fail_launch: bool,
    delay: Option<Duration>,
}

impl MemoryLauncher {
    fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }
}

#[async_trait]
impl NodeLauncher for MemoryLauncher {
    type Node = MemoryNode;

    async fn launch(&self, options: LaunchOptions) -> Result<MemoryNode> {
        if self.fail_launch {
            return Err(NodeError::Backend("swarm failed to bind".into()));
        }
        self.network
            .launched_with_bootstrap
            .lock()
            .unwrap()
            .push(options.bootstrap.len());
        Ok(MemoryNode {
            network: Arc::clone(&self.network),
            peer_id: options.keypair.public().to_peer_id(),
            delay: self.delay,
        })
    }
}

struct MemoryNode {
    network: Arc<Network>,
    peer_id: PeerId,
    delay: Option<Duration>,
}

impl MemoryNode {
    fn published(&self, name: &str) -> Result<ContentPath> {
        self.network
            .names
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::Backend(format!("could not resolve {name}")))
    }

    fn lookup(&self, path: &ContentPath) -> Result<Vec<u8>> {
        let root = match path {
            ContentPath::Ipns { name, .. } => self.published(name)?,
            ipfs => ipfs.clone(),
        };
        let mut segments = root.rest().to_vec();
        if path.is_ipns() {
            segments.extend_from_slice(path.rest());
        }

        let mut cid = *root.cid().expect("resolved path");
        for segment in segments {
            cid = *self
                .network
                .links
                .lock()
                .unwrap()
                .get(&(cid, segment.clone()))
                .ok_or_else(|| NodeError::Backend(format!("no link named {segment}")))?;
        }
        self.network
            .blocks
            .lock()
            .unwrap()
            .get(&cid)
            .cloned()
            .ok_or_else(|| NodeError::Backend(format!("block {cid} not found")))
    }

    fn store(&self, codec: u64, data: Vec<u8>) -> Cid {
        let cid = Cid::new_v1(codec, Code::Sha2_256.digest(&data));
        self.network.blocks.lock().unwrap().insert(cid, data);
        cid
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl NodeBackend for MemoryNode {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    async fn listen_addrs(&self) -> Result<Vec<Multiaddr>> {
        Ok(vec!["/ip4/127.0.0.1/tcp/4101".parse().unwrap()])
    }

    async fn add(&self, path: &Path) -> Result<Cid> {
        if !path.is_dir() {
            return Ok(self.store(RAW, std::fs::read(path)?));
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = self.store(RAW, std::fs::read(entry.path())?);
            entries.push((name, child));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let listing = entries
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let dir = self.store(DAG_PB, listing.into_bytes());
        let mut links = self.network.links.lock().unwrap();
        for (name, child) in entries {
            links.insert((dir, name), child);
        }
        Ok(dir)
    }

    async fn get(&self, path: &ContentPath, dest: &Path) -> Result<()> {
        self.pause().await;
        let data = self.lookup(path)?;
        std::fs::write(dest, data)?;
        Ok(())
    }

    async fn cat(&self, path: &ContentPath) -> Result<Bytes> {
        self.pause().await;
        self.lookup(path).map(Bytes::from)
    }

    async fn resolve(&self, path: &ContentPath) -> Result<ContentPath> {
        self.pause().await;
        let ContentPath::Ipns { name, .. } = path else {
            return Ok(path.clone());
        };
        self.published(name)
    }

    async fn publish(&self, path: &ContentPath) -> Result<ContentPath> {
        self.pause().await;
        self.network
            .names
            .lock()
            .unwrap()
            .insert(self.peer_id.to_string(), path.clone());
        Ok(self_name(&self.peer_id))
    }

    async fn add_bootstrap(&self, addr: Multiaddr) -> Result<Multiaddr> {
        self.network.bootstrap.lock().unwrap().push(addr.clone());
        Ok(addr)
    }

    async fn shutdown(&self) -> Result<()> {
        if *self.network.refuse_shutdown.lock().unwrap() {
            return Err(NodeError::Backend("swarm still draining".into()));
        }
        *self.network.shutdowns.lock().unwrap() += 1;
        Ok(())
    }
}

fn config_in(dir: &TempDir) -> Config {
    Config::new(dir.path())
}

async fn started(launcher: MemoryLauncher) -> (IpfsService<MemoryLauncher>, TempDir) {
    let dir = tempdir().expect("tempdir");
    let service = IpfsService::new(launcher);
    service
        .start(config_in(&dir))
        .await
        .expect("node starts");
    (service, dir)
}

fn peer_addr() -> String {
    let peer = libp2p::identity::Keypair::generate_ed25519()
        .public()
        .to_peer_id();
    format!("/ip4/127.0.0.1/tcp/4001/p2p/{peer}")
}

#[tokio::test]
async fn test_start_reports_node_and_prepares_repo() {
    let dir = tempdir().unwrap();
    let launcher = MemoryLauncher::default();
    let service = IpfsService::new(launcher.clone());

    let info = service.start(config_in(&dir)).await.unwrap();
    assert_eq!(info.port, 4101);
    assert_eq!(info.to_string(), "IPFS node started on port 4101");
    assert!(dir.path().join("ipfs").join("identity.key").exists());
    assert_eq!(*launcher.network.launched_with_bootstrap.lock().unwrap(), vec![4]);
    assert!(service.is_running().await);
    assert_eq!(service.peer_id().await.unwrap(), info.peer_id);
}

#[tokio::test]
async fn test_peer_id_survives_restart() {
    let dir = tempdir().unwrap();
    let service = IpfsService::new(MemoryLauncher::default());

    let first = service.start(config_in(&dir)).await.unwrap().peer_id;
    service.stop().await.unwrap();
    let second = service.start(config_in(&dir)).await.unwrap().peer_id;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let dir = tempdir().unwrap();
    let launcher = MemoryLauncher::default();
    let service = IpfsService::new(launcher.clone());

    assert!(matches!(service.peer_id().await, Err(NodeError::NotRunning)));
    assert!(matches!(service.stop().await, Err(NodeError::NotRunning)));
    assert!(matches!(
        service.resolve("/ipns/ipfs.io").await,
        Err(NodeError::NotRunning)
    ));

    service.start(config_in(&dir)).await.unwrap();
    assert!(matches!(
        service.start(config_in(&dir)).await,
        Err(NodeError::AlreadyRunning)
    ));
    assert!(service.is_running().await);

    service.stop().await.unwrap();
    assert_eq!(*launcher.network.shutdowns.lock().unwrap(), 1);
    assert!(!service.is_running().await);
    assert!(matches!(service.stop().await, Err(NodeError::NotRunning)));
    assert!(matches!(
        service.add(dir.path()).await,
        Err(NodeError::NotRunning)
    ));
}

#[tokio::test]
async fn test_failed_launch_leaves_service_stopped() {
    let dir = tempdir().unwrap();
    let service = IpfsService::new(MemoryLauncher::failing());

    let report = StatusReport::from_result_with(
        service.start(config_in(&dir)).await,
        "Unable to start IPFS node",
    );
    assert!(!report.is_ok());
    assert_eq!(report.message, "Unable to start IPFS node: swarm failed to bind");
    assert!(!service.is_running().await);
}

#[tokio::test]
async fn test_start_after_failed_launch_reuses_repo() {
    let dir = tempdir().unwrap();
    let failing = IpfsService::new(MemoryLauncher::failing());
    assert!(failing.start(config_in(&dir)).await.is_err());

    let service = IpfsService::new(MemoryLauncher::default());
    service.start(config_in(&dir)).await.unwrap();
    assert!(service.is_running().await);
}

#[tokio::test]
async fn test_failed_stop_keeps_node_for_retry() {
    let launcher = MemoryLauncher::default();
    let (service, _dir) = started(launcher.clone()).await;
    let peer_id = service.peer_id().await.unwrap();

    *launcher.network.refuse_shutdown.lock().unwrap() = true;
    assert!(matches!(service.stop().await, Err(NodeError::Backend(_))));
    assert!(service.is_running().await);
    assert_eq!(service.peer_id().await.unwrap(), peer_id);
    assert_eq!(*launcher.network.shutdowns.lock().unwrap(), 0);

    *launcher.network.refuse_shutdown.lock().unwrap() = false;
    service.stop().await.unwrap();
    assert!(!service.is_running().await);
    assert_eq!(*launcher.network.shutdowns.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_unwritable_repo_is_rejected() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("ipfs"), b"a file where the repo should be").unwrap();
    let service = IpfsService::new(MemoryLauncher::default());

    assert!(matches!(
        service.start(config_in(&dir)).await,
        Err(NodeError::RepoNotWritable { .. })
    ));
}

#[tokio::test]
async fn test_add_then_get_round_trip() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let source = dir.path().join("test-file.jpg");
    std::fs::write(&source, b"\xff\xd8 not really a jpeg").unwrap();

    let cid = service.add(&source).await.unwrap();
    assert_eq!(cid.codec(), RAW);

    let dest = dir.path().join("downloads").join("nested").join("copy.jpg");
    let written = service.get(&cid.to_string(), &dest).await.unwrap();
    assert_eq!(written, dest);
    assert_eq!(std::fs::read(&dest).unwrap(), std::fs::read(&source).unwrap());

    let via_path = dir.path().join("via-path.jpg");
    service
        .get(&format!("/ipfs/{cid}"), &via_path)
        .await
        .unwrap();
    assert!(via_path.exists());
}

#[tokio::test]
async fn test_add_directory() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let tree = dir.path().join("test-dir");
    std::fs::create_dir_all(&tree).unwrap();
    std::fs::write(tree.join("a.txt"), b"a").unwrap();
    std::fs::write(tree.join("b.txt"), b"b").unwrap();

    let cid = service.add(&tree).await.unwrap();
    assert_eq!(cid.codec(), DAG_PB);
}

#[tokio::test]
async fn test_bare_cid_keeps_sub_path() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let site = dir.path().join("site");
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(site.join("checkpoints.json"), b"428610:9c1f0a").unwrap();
    std::fs::write(site.join("seeds.json"), br#"["10.0.0.2:11812"]"#).unwrap();
    let root = service.add(&site).await.unwrap();

    let content = service
        .cat(&format!("{root}/checkpoints.json"))
        .await
        .unwrap();
    assert_eq!(&content[..], b"428610:9c1f0a");

    let dest = dir.path().join("copy.json");
    service
        .get(&format!("{root}/checkpoints.json"), &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"428610:9c1f0a");

    let seeds = service.seedlist(&format!("{root}/seeds.json")).await.unwrap();
    assert_eq!(seeds, vec!["10.0.0.2:11812"]);

    assert!(matches!(
        service.cat("ipfs.io/checkpoints.json").await,
        Err(NodeError::InvalidCid(text)) if text == "ipfs.io"
    ));
}

#[tokio::test]
async fn test_add_missing_path() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let missing = dir.path().join("nope.bin");
    match service.add(&missing).await {
        Err(NodeError::PathNotFound(path)) => assert_eq!(path, missing),
        other => panic!("expected PathNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_rejects_bad_cid_and_reports_missing_content() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let dest = dir.path().join("out");

    assert!(matches!(
        service.get("not-a-cid", &dest).await,
        Err(NodeError::InvalidCid(_))
    ));

    let absent = Cid::new_v1(RAW, Code::Sha2_256.digest(b"never added"));
    assert!(matches!(
        service.get(&absent.to_string(), &dest).await,
        Err(NodeError::Backend(_))
    ));
}

#[tokio::test]
async fn test_publish_then_resolve() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let file = dir.path().join("site.html");
    std::fs::write(&file, b"<h1>hi</h1>").unwrap();
    let cid = service.add(&file).await.unwrap();

    let name = service.publish(&cid.to_string()).await.unwrap();
    let peer_id = service.peer_id().await.unwrap();
    assert_eq!(name.to_string(), format!("/ipns/{peer_id}"));

    let resolved = service.resolve(&name.to_string()).await.unwrap();
    assert_eq!(resolved, ContentPath::ipfs(cid));

    assert_eq!(
        String::from_utf8(service.cat(&name.to_string()).await.unwrap().to_vec()).unwrap(),
        "<h1>hi</h1>"
    );
}

#[tokio::test]
async fn test_resolve_passes_ipfs_paths_through() {
    let (service, _dir) = started(MemoryLauncher::slow(Duration::from_secs(3600))).await;
    let cid = Cid::new_v1(RAW, Code::Sha2_256.digest(b"already immutable"));

    let resolved = service.resolve(&format!("/ipfs/{cid}")).await.unwrap();
    assert_eq!(resolved, ContentPath::ipfs(cid));
}

#[tokio::test]
async fn test_resolve_treats_bare_cid_shaped_text_as_name() {
    let launcher = MemoryLauncher::default();
    let (service, _dir) = started(launcher.clone()).await;
    let peer = "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";
    let target = Cid::new_v1(RAW, Code::Sha2_256.digest(b"published by an rsa peer"));

    assert!(matches!(
        service.resolve(peer).await,
        Err(NodeError::Backend(message)) if message == format!("could not resolve {peer}")
    ));

    launcher
        .network
        .names
        .lock()
        .unwrap()
        .insert(peer.to_string(), ContentPath::ipfs(target));
    assert_eq!(service.resolve(peer).await.unwrap(), ContentPath::ipfs(target));
}

#[tokio::test]
async fn test_resolve_failure_is_prefixed() {
    let (service, _dir) = started(MemoryLauncher::default()).await;
    let report = StatusReport::from_result_with(
        service.resolve("alpha.scalaproject.io").await,
        "Could not resolve peer ID",
    );
    assert!(!report.is_ok());
    assert_eq!(
        report.message,
        "Could not resolve peer ID: could not resolve alpha.scalaproject.io"
    );
}

#[tokio::test]
async fn test_bootstrap_add_validates_before_forwarding() {
    let launcher = MemoryLauncher::default();
    let (service, _dir) = started(launcher.clone()).await;

    let addr = peer_addr();
    let added = service.bootstrap_add(&addr).await.unwrap();
    assert_eq!(added.to_string(), addr);

    assert!(matches!(
        service.bootstrap_add("/ip4/127.0.0.1/tcp/4001").await,
        Err(NodeError::InvalidBootstrapAddr(_))
    ));
    assert!(matches!(
        service.bootstrap_add("not an address").await,
        Err(NodeError::InvalidMultiaddr(_))
    ));
    assert_eq!(launcher.network.bootstrap.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_requests_time_out() {
    let dir = tempdir().unwrap();
    let service = IpfsService::new(MemoryLauncher::slow(Duration::from_secs(120)));
    service
        .start(config_in(&dir).request_timeout(Duration::from_secs(5)))
        .await
        .unwrap();
    let cid = Cid::new_v1(RAW, Code::Sha2_256.digest(b"slow"));

    assert!(matches!(
        service.cat(&cid.to_string()).await,
        Err(NodeError::Timeout { operation: "cat" })
    ));
    assert!(matches!(
        service.resolve("/ipns/ipfs.io").await,
        Err(NodeError::Timeout { operation: "resolve" })
    ));
    assert!(matches!(
        service.get(&cid.to_string(), dir.path().join("slow.bin")).await,
        Err(NodeError::Timeout { operation: "get" })
    ));
    assert!(matches!(
        service.publish(&cid.to_string()).await,
        Err(NodeError::Timeout { operation: "publish" })
    ));
}

#[tokio::test]
async fn test_seedlist() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let list = dir.path().join("seeds.json");
    std::fs::write(&list, br#"["seed1.example:11812","10.0.0.2:11812"]"#).unwrap();
    let cid = service.add(&list).await.unwrap();

    let seeds = service.seedlist(&cid.to_string()).await.unwrap();
    assert_eq!(seeds, vec!["seed1.example:11812", "10.0.0.2:11812"]);

    let report = StatusReport::seedlist(seeds);
    assert_eq!(report.seedlist.as_ref().map(Vec::len), Some(2));

    let bogus = dir.path().join("bogus.json");
    std::fs::write(&bogus, b"{\"seeds\": 1}").unwrap();
    let cid = service.add(&bogus).await.unwrap();
    assert!(matches!(
        service.seedlist(&cid.to_string()).await,
        Err(NodeError::InvalidSeedlist(_))
    ));
}

#[tokio::test]
async fn test_service_feeds_checkpoint_cache() {
    let (service, dir) = started(MemoryLauncher::default()).await;
    let file = dir.path().join("index.html");
    std::fs::write(&file, b"428610:9c1f0a\n").unwrap();
    let cid = service.add(&file).await.unwrap();
    service.publish(&cid.to_string()).await.unwrap();
    let name = self_name(&service.peer_id().await.unwrap());

    let cache = CheckpointCache::new(10);
    let fresh = collect_once(&service, &name, &cache).await.unwrap();
    assert_eq!(fresh.map(|c| c.height), Some(428610));
    assert_eq!(cache.get(428610).as_deref(), Some("9c1f0a"));
}

#[tokio::test]
async fn test_not_running_envelope() {
    let service = IpfsService::new(MemoryLauncher::default());
    let report = StatusReport::from_result(service.peer_id().await);
    assert_eq!(
        report.to_json().unwrap(),
        r#"{"Status":"err","Message":"IPFS node is not running"}"#
    );
}
