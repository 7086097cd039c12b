//! Chaosledger replica.
//!
//! A long-running server participating in Proof of Chaos consensus.
//!
//! # Usage
//!
//! ```bash
//! chaosledger-replica --config node1.toml
//! chaosledger-replica --config node1.toml --log-level debug
//! NODE_ID=node2 PORT=5001 chaosledger-replica --config cluster.toml
//! ```
//!
//! Exits 0 on clean shutdown, non-zero on genesis mismatch or bind failure.

use anyhow::{Context, Result};
use chaosledger_engine::EngineState;
use chaosledger_node::{create_router, spawn_dispatcher, AppState, NodeConfig, PeerFabric};
use clap::Parser;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Chaosledger replica node.
#[derive(Parser, Debug)]
#[command(name = "chaosledger-replica")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Node id (overrides config and NODE_ID)
    #[arg(long)]
    node_id: Option<String>,

    /// Log level filter (overrides RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(cli: &Cli, config: &NodeConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    match &config.node.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::load(&cli.config)?;
    config.apply_env_overrides()?;
    if let Some(ref node_id) = cli.node_id {
        config.node.id = node_id.clone();
    }

    init_logging(&cli, &config)?;
    info!(
        node_id = %config.node.id,
        listen_addr = %config.node.listen_addr,
        peers = config.peer_ids().len(),
        "Chaosledger replica starting"
    );

    // All replicas must agree on the genesis block bit-for-bit; refuse to
    // serve otherwise.
    let genesis = config.genesis_block();
    chaosledger_engine::verify_genesis(&genesis, config.genesis.expected_hash.as_deref())
        .context("genesis verification failed")?;
    info!(genesis_hash = %genesis.hash, "Genesis verified");

    let engine = EngineState::new(
        config.node_id(),
        config.peer_ids(),
        genesis,
        config.engine_config(),
    )
    .context("failed to initialize engine")?;
    let engine = Arc::new(Mutex::new(engine));

    // Outbound fabric and its dispatcher.
    let fabric = Arc::new(
        PeerFabric::new(config.peer_map(), config.fabric_config())
            .context("failed to build peer fabric")?,
    );
    let (outbox, outbox_rx) = tokio::sync::mpsc::channel(1024);
    let dispatcher = spawn_dispatcher(Arc::clone(&fabric), outbox_rx);

    // Bootstrap: the configured leader claims leadership locally and
    // announces itself to every peer until each acknowledges.
    if config.is_bootstrap_leader() {
        let leader_id = config.node_id();
        engine.lock().set_leader(leader_id.clone());
        for peer in config.peer_ids() {
            let fabric = Arc::clone(&fabric);
            let leader_id = leader_id.clone();
            tokio::spawn(async move {
                fabric.announce_leader(&peer, &leader_id).await;
            });
        }
        info!(leader = %leader_id, "Bootstrap leader announced");
    }

    let state = AppState::new(engine, outbox, fabric.peer_urls());
    let router = create_router(state);

    let addr = config.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Replica listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    dispatcher.abort();
    info!("Replica shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
    warn!("Shutting down");
}
