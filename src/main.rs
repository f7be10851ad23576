//! popq — directory-backed download queue
//!
//! Usage:
//!   popq serve  --port 8666 --root /srv/outbox     # serve the pool over HTTP
//!   popq status --root /srv/outbox [--json]        # count waiting / in-transit files
//!
//! Clients claim with `curl -OJ -X POP http://host:8666/dir/` and resume an
//! interrupted transfer with `curl -C - -O http://host:8666/dir/<name>`.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use popq::config::Config;
use popq::server::{self, AppState};
use popq::storage::logical_path::LogicalPath;
use popq::storage::pool_store::PoolStore;

#[derive(Parser)]
#[command(name = "popq", about = "Directory-backed download queue", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the pool over HTTP.
    Serve {
        /// Optional TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Port to listen on (overrides the config file).
        #[arg(short, long)]
        port: Option<u16>,
        /// Address to bind (overrides the config file).
        #[arg(long)]
        bind: Option<IpAddr>,
        /// Pool root directory (overrides the config file).
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Print how many files are waiting and in transit, per directory.
    Status {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        root: Option<PathBuf>,
        /// Logical directory to start from.
        #[arg(long, default_value = "/")]
        dir: String,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Serve { config, port, bind, root } => {
            run_serve(config.as_deref(), port, bind, root).await
        }
        Command::Status { config, root, dir, json } => {
            run_status(config.as_deref(), root, &dir, json)
        }
    };

    if let Err(e) = outcome {
        error!(error = ?e, "Fatal");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> Result<Config> {
    let mut cfg = Config::load(path).context("Failed to load config")?;
    if let Some(root) = root {
        cfg.pool.root = root;
    }
    cfg.validate().context("Invalid configuration")?;
    Ok(cfg)
}

async fn run_serve(
    config_path: Option<&Path>,
    port: Option<u16>,
    bind: Option<IpAddr>,
    root: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = load_config(config_path, root)?;
    if let Some(port) = port {
        cfg.server.port = port;
    }
    if let Some(bind) = bind {
        cfg.server.bind = bind;
    }

    let store = PoolStore::new(&cfg.pool.root)?;
    info!(
        root = ?cfg.pool.root,
        addr = %cfg.listen_addr(),
        "Starting popq"
    );

    let state = Arc::new(AppState { store });
    server::start_server(state, cfg.listen_addr())
        .await
        .with_context(|| format!("HTTP server on {}", cfg.listen_addr()))
}

fn run_status(
    config_path: Option<&Path>,
    root: Option<PathBuf>,
    dir: &str,
    json: bool,
) -> Result<()> {
    let cfg = load_config(config_path, root)?;
    let store = PoolStore::new(&cfg.pool.root)?;
    let dir = LogicalPath::parse(dir)?;
    let census = store.census(&dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&census.report())?);
        return Ok(());
    }

    println!("=== popq status ===");
    println!("Root        : {}", cfg.pool.root.display());
    println!("{:<40} {:>10} {:>14} {:>10} {:>14}", "DIRECTORY", "WAITING", "BYTES", "CLAIMED", "BYTES");
    for d in census.dirs() {
        println!(
            "{:<40} {:>10} {:>14} {:>10} {:>14}",
            d.dir, d.unclaimed, d.unclaimed_bytes, d.claimed, d.claimed_bytes
        );
    }
    let t = census.totals();
    println!(
        "{:<40} {:>10} {:>14} {:>10} {:>14}",
        "TOTAL", t.unclaimed, t.unclaimed_bytes, t.claimed, t.claimed_bytes
    );
    Ok(())
}
