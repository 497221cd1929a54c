//! Command-line front end for the embedded IPFS node.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ipfs_node::{default_data_dir, Config, EmbeddedLauncher, IpfsService, StatusReport};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory the node repository lives in
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// TCP port for the swarm
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long, env = "IPFS_NODE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable mDNS for local discovery
    #[arg(long, default_value_t = false)]
    mdns: bool,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    debug: bool,

    /// Print JSON status envelopes instead of plain text
    #[arg(long, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node until interrupted
    Daemon,
    /// Print the local peer id
    Id,
    /// Add a file or directory and print its CID
    Add {
        /// File or directory to add
        path: PathBuf,
    },
    /// Download content to a local path
    Get {
        /// CID or /ipfs/ path
        target: String,
        /// Destination file
        dest: PathBuf,
    },
    /// Print the content of a file
    Cat {
        /// CID or /ipfs/ or /ipns/ path
        target: String,
    },
    /// Resolve an IPNS name to an /ipfs/ path
    Resolve {
        /// Name such as /ipns/ipfs.io or a bare domain
        name: String,
    },
    /// Publish content under this node's IPNS name
    Publish {
        /// CID or /ipfs/ path
        target: String,
    },
    /// Add a bootstrap peer
    BootstrapAdd {
        /// Multiaddress ending in /p2p/<peer-id>
        addr: String,
    },
    /// Fetch a JSON seed list
    Seedlist {
        /// CID or /ipfs/ or /ipns/ path of the list
        target: String,
    },
    /// Run through every operation once, stopping at the first failure
    Walkthrough {
        /// File to add, fetch back and publish
        #[arg(long)]
        file: Option<PathBuf>,
        /// Directory to add
        #[arg(long)]
        dir: Option<PathBuf>,
        /// IPNS name to resolve
        #[arg(long, default_value = "/ipns/ipfs.io")]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("debug,ipfs_node=debug")
        } else {
            EnvFilter::new("info,ipfs_node=info")
        }
    });
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = load_config(&cli)?;
    let service = IpfsService::new(EmbeddedLauncher);

    let info = match service.start(config.clone()).await {
        Ok(info) => info,
        Err(e) => {
            emit(&StatusReport::err(format!("Unable to start IPFS node: {e}")), cli.json)?;
            std::process::exit(1);
        }
    };

    let ok = match cli.command {
        Commands::Daemon => {
            emit(&StatusReport::ok(info.to_string()), cli.json)?;
            tracing::info!(peer_id = %info.peer_id, "IPFS node running. Press Ctrl+C to exit.");
            for addr in &info.listen_addrs {
                tracing::info!(%addr, "listening");
            }
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl+C")?;
            true
        }
        Commands::Id => emit(&StatusReport::from_result(service.peer_id().await), cli.json)?,
        Commands::Add { path } => {
            emit(&StatusReport::from_result(service.add(&path).await), cli.json)?
        }
        Commands::Get { target, dest } => {
            let fetched = service.get(&target, &dest).await.map(|p| p.display().to_string());
            emit(&StatusReport::from_result(fetched), cli.json)?
        }
        Commands::Cat { target } => {
            let content = service
                .cat(&target)
                .await
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());
            emit(&StatusReport::from_result(content), cli.json)?
        }
        Commands::Resolve { name } => emit(
            &StatusReport::from_result_with(
                service.resolve(&name).await,
                "Could not resolve peer ID",
            ),
            cli.json,
        )?,
        Commands::Publish { target } => {
            emit(&StatusReport::from_result(service.publish(&target).await), cli.json)?
        }
        Commands::BootstrapAdd { addr } => emit(
            &StatusReport::from_result(service.bootstrap_add(&addr).await),
            cli.json,
        )?,
        Commands::Seedlist { target } => emit(
            &StatusReport::from_seedlist(service.seedlist(&target).await),
            cli.json,
        )?,
        Commands::Walkthrough { file, dir, name } => {
            walkthrough(&service, &config, file, dir, &name).await?
        }
    };

    if service.stop().await.is_err() {
        emit(&StatusReport::err("IPFS node could not be stopped"), cli.json)?;
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.repo_root = dir.clone();
    } else if config.repo_root.as_os_str().is_empty() {
        config.repo_root = default_data_dir();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if cli.mdns {
        config.mdns = true;
    }
    Ok(config)
}

/// Print a report and return whether it was a success.
fn emit(report: &StatusReport, json: bool) -> Result<bool> {
    if json {
        println!("{}", report.to_json()?);
    } else if report.is_ok() {
        println!("{}", report.message);
        if let Some(seeds) = &report.seedlist {
            for seed in seeds {
                println!("{seed}");
            }
        }
    } else {
        eprintln!("error: {}", report.message);
    }
    Ok(report.is_ok())
}

async fn walkthrough(
    service: &IpfsService<EmbeddedLauncher>,
    config: &Config,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    name: &str,
) -> Result<bool> {
    println!("Getting peer ID");
    if !emit(&StatusReport::from_result(service.peer_id().await), true)? {
        return Ok(false);
    }

    let mut added = None;
    if let Some(file) = file {
        println!("Adding file to IPFS");
        let report = StatusReport::from_result(service.add(&file).await);
        if !emit(&report, true)? {
            return Ok(false);
        }
        added = Some(report.message);
    }

    if let Some(dir) = dir {
        println!("Adding directory to IPFS");
        if !emit(&StatusReport::from_result(service.add(&dir).await), true)? {
            return Ok(false);
        }
    }

    if let Some(cid) = &added {
        println!("Downloading file from IPFS");
        let dest = config.repo_root.join("downloads").join(cid);
        let fetched = service.get(cid, &dest).await.map(|p| p.display().to_string());
        if !emit(&StatusReport::from_result(fetched), true)? {
            return Ok(false);
        }
    }

    println!("Resolving {name} to IPFS hash");
    let resolved =
        StatusReport::from_result_with(service.resolve(name).await, "Could not resolve peer ID");
    if !emit(&resolved, true)? {
        return Ok(false);
    }

    if let Some(cid) = &added {
        println!("Publishing to IPNS");
        if !emit(&StatusReport::from_result(service.publish(cid).await), true)? {
            return Ok(false);
        }
    }

    Ok(true)
}
