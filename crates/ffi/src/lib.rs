//! C ABI for the embedded IPFS node.
//!
//! Every call takes NUL-terminated UTF-8 strings and returns a heap string
//! owned by the caller, which must hand it back to [`IpfsFreeString`]. Unless
//! noted otherwise the string is a JSON envelope such as
//! `{"Status":"ok","Message":"..."}`.
//!
//! One node per process. The library keeps its own tokio runtime and blocks
//! the calling thread for the duration of each call, so these functions must
//! not be called from inside an async runtime.

use ipfs_node::{
    CheckpointCache, CheckpointCollector, Config, ContentPath, EmbeddedLauncher, IpfsService,
    NodeError, NodeLauncher, StatusReport,
};
use std::{
    any::Any,
    ffi::{c_char, c_int, CStr, CString},
    panic::{self, AssertUnwindSafe},
    ptr,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};
use tokio::runtime::{Builder, Runtime};
use tracing_subscriber::EnvFilter;

/// Env var holding a tracing filter; logging stays off when it is unset.
const LOG_ENV: &str = "LIBIPFS_LOG";

struct Library {
    runtime: Runtime,
    service: Arc<IpfsService<EmbeddedLauncher>>,
    checkpoints: Arc<CheckpointCache>,
    collector: Mutex<Option<CheckpointCollector>>,
}

static LIBRARY: OnceLock<Library> = OnceLock::new();

fn library() -> Result<&'static Library, String> {
    if let Some(library) = LIBRARY.get() {
        return Ok(library);
    }
    init_logging();
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("libipfs")
        .build()
        .map_err(|e| format!("Unable to start runtime: {e}"))?;
    Ok(LIBRARY.get_or_init(|| Library {
        runtime,
        service: Arc::new(IpfsService::new(EmbeddedLauncher)),
        checkpoints: Arc::new(CheckpointCache::new(Config::default().max_checkpoints)),
        collector: Mutex::new(None),
    }))
}

fn init_logging() {
    if let Ok(filter) = std::env::var(LOG_ENV) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(filter))
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Run `call` against the library and encode its report. Panics become an
/// `err` envelope instead of unwinding into C.
fn guarded(call: impl FnOnce(&'static Library) -> StatusReport) -> *mut c_char {
    let report = panic::catch_unwind(AssertUnwindSafe(|| match library() {
        Ok(library) => call(library),
        Err(message) => StatusReport::err(message),
    }))
    .unwrap_or_else(|payload| {
        let reason = panic_reason(payload.as_ref());
        tracing::error!(%reason, "panic inside libipfs");
        StatusReport::err(format!("Internal error: {reason}"))
    });
    let json = report.to_json().unwrap_or_else(|e| {
        format!(r#"{{"Status":"err","Message":"could not encode result: {e}"}}"#)
    });
    into_c_string(json)
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        (*reason).to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn into_c_string(text: String) -> *mut c_char {
    CString::new(text.replace('\0', ""))
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Borrow a required string argument.
///
/// # Safety
/// `raw` must be NULL or point to a NUL-terminated string that outlives the call.
unsafe fn arg<'a>(raw: *const c_char, name: &str) -> Result<&'a str, StatusReport> {
    if raw.is_null() {
        return Err(StatusReport::err(format!("{name} is NULL")));
    }
    CStr::from_ptr(raw)
        .to_str()
        .map_err(|_| StatusReport::err(format!("{name} is not valid UTF-8")))
}

/// Start the node in `<repo_path>/ipfs`, listening on `port`.
///
/// A NULL or empty `repo_path` uses the current directory; `port <= 0` uses
/// 4001.
///
/// # Safety
/// `repo_path` must be NULL or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn IPFSStartNode(repo_path: *const c_char, port: c_int) -> *mut c_char {
    guarded(|lib| {
        let root = if repo_path.is_null() {
            ""
        } else {
            match arg(repo_path, "repo path") {
                Ok(root) => root,
                Err(report) => return report,
            }
        };
        let mut config = Config::new(root);
        if port > 0 {
            match u16::try_from(port) {
                Ok(port) => config = config.port(port),
                Err(_) => return StatusReport::err(format!("invalid port {port}")),
            }
        }
        StatusReport::from_result_with(
            lib.runtime.block_on(lib.service.start(config)),
            "Unable to start IPFS node",
        )
    })
}

/// Stop the node and any checkpoint collection.
#[no_mangle]
pub extern "C" fn IPFSStopNode() -> *mut c_char {
    guarded(|lib| stop_node(&lib.runtime, &lib.service, &lib.collector))
}

/// Checkpoint collection keeps running if the node refuses to stop.
fn stop_node<L: NodeLauncher>(
    runtime: &Runtime,
    service: &IpfsService<L>,
    collector: &Mutex<Option<CheckpointCollector>>,
) -> StatusReport {
    let report = match runtime.block_on(service.stop()) {
        Ok(()) => StatusReport::ok("IPFS node stopped"),
        Err(NodeError::NotRunning) => StatusReport::err(NodeError::NotRunning.to_string()),
        Err(_) => return StatusReport::err("IPFS node could not be stopped"),
    };
    if let Some(collector) = collector
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        collector.stop();
    }
    report
}

/// Peer id of the running node.
#[no_mangle]
pub extern "C" fn GetPeerID() -> *mut c_char {
    guarded(|lib| StatusReport::from_result(lib.runtime.block_on(lib.service.peer_id())))
}

/// Add a file or directory; the message is the root CID.
///
/// # Safety
/// `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn IpfsAdd(path: *const c_char) -> *mut c_char {
    guarded(|lib| match arg(path, "path") {
        Ok(path) => StatusReport::from_result(lib.runtime.block_on(lib.service.add(path))),
        Err(report) => report,
    })
}

/// Download `cid` into `dest`; the message is the written path.
///
/// # Safety
/// `cid` and `dest` must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn IpfsGet(cid: *const c_char, dest: *const c_char) -> *mut c_char {
    guarded(|lib| {
        let (cid, dest) = match (arg(cid, "cid"), arg(dest, "destination")) {
            (Ok(cid), Ok(dest)) => (cid, dest),
            (Err(report), _) | (_, Err(report)) => return report,
        };
        let fetched = lib
            .runtime
            .block_on(lib.service.get(cid, dest))
            .map(|written| written.display().to_string());
        StatusReport::from_result(fetched)
    })
}

/// Resolve an IPNS name to an `/ipfs/` path.
///
/// # Safety
/// `name` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ResolveIPNSName(name: *const c_char) -> *mut c_char {
    guarded(|lib| match arg(name, "name") {
        Ok(name) => StatusReport::from_result_with(
            lib.runtime.block_on(lib.service.resolve(name)),
            "Could not resolve peer ID",
        ),
        Err(report) => report,
    })
}

/// Publish `cid` under this node's IPNS name.
///
/// # Safety
/// `cid` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn PublishIPFSName(cid: *const c_char) -> *mut c_char {
    guarded(|lib| match arg(cid, "cid") {
        Ok(cid) => StatusReport::from_result(lib.runtime.block_on(lib.service.publish(cid))),
        Err(report) => report,
    })
}

/// Add a bootstrap peer given as a multiaddress ending in `/p2p/<peer-id>`.
///
/// # Safety
/// `addr` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn BootstrapAdd(addr: *const c_char) -> *mut c_char {
    guarded(|lib| match arg(addr, "address") {
        Ok(addr) => {
            StatusReport::from_result(lib.runtime.block_on(lib.service.bootstrap_add(addr)))
        }
        Err(report) => report,
    })
}

/// Content of a file as the message. Invalid UTF-8 is replaced.
///
/// # Safety
/// `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn IpfsCat(path: *const c_char) -> *mut c_char {
    guarded(|lib| match arg(path, "path") {
        Ok(path) => {
            let content = lib
                .runtime
                .block_on(lib.service.cat(path))
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            StatusReport::from_result(content)
        }
        Err(report) => report,
    })
}

/// Fetch a JSON array of seed addresses into the `Seedlist` field.
///
/// # Safety
/// `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn IpfsGetSeedList(path: *const c_char) -> *mut c_char {
    guarded(|lib| match arg(path, "path") {
        Ok(path) => StatusReport::from_seedlist(lib.runtime.block_on(lib.service.seedlist(path))),
        Err(report) => report,
    })
}

/// Poll `path` for `height:hash` checkpoints in the background. Replaces any
/// collection already running.
///
/// # Safety
/// `path` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn IpfsStartCheckpointCollection(path: *const c_char) -> *mut c_char {
    guarded(|lib| {
        let path = match arg(path, "path").and_then(|raw| {
            ContentPath::parse(raw).map_err(|e| StatusReport::err(e.to_string()))
        }) {
            Ok(path) => path,
            Err(report) => return report,
        };
        let config = match lib.runtime.block_on(lib.service.config()) {
            Ok(config) => config,
            Err(e) => return StatusReport::err(e.to_string()),
        };

        let _entered = lib.runtime.enter();
        let collector = CheckpointCollector::spawn(
            Arc::clone(&lib.service),
            path.clone(),
            Arc::clone(&lib.checkpoints),
            config.checkpoint_interval(),
        );
        *lib.collector.lock().unwrap_or_else(PoisonError::into_inner) = Some(collector);
        StatusReport::ok(format!("Collecting checkpoints from {path}"))
    })
}

/// Hash of the cached checkpoint at `height`, or an empty string.
///
/// Returns a plain string, not an envelope.
#[no_mangle]
pub extern "C" fn IpfsGetCheckpointAt(height: c_int) -> *mut c_char {
    let hash = panic::catch_unwind(|| {
        let height = u64::try_from(height).ok()?;
        LIBRARY.get()?.checkpoints.get(height)
    })
    .ok()
    .flatten()
    .unwrap_or_default();
    into_c_string(hash)
}

/// Release a string returned by this library. NULL is ignored.
///
/// # Safety
/// `text` must be NULL or a pointer returned by this library that has not
/// been freed yet.
#[no_mangle]
pub unsafe extern "C" fn IpfsFreeString(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}
