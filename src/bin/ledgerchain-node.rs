#![forbid(unsafe_code)]
//! LedgerChain node: ledger, miner and HTTP API in one process

use clap::Parser;
use ledgerchain::api::run_api_server;
use ledgerchain::config::{load_config, DEFAULT_CONFIG_PATH};
use ledgerchain::node::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ledgerchain-node", version, about = "Run a LedgerChain node")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Port for the HTTP API (overrides network.api_port)
    #[arg(short, long)]
    port: Option<u16>,

    /// Proof-of-work hex prefix (overrides miner.difficulty_prefix)
    #[arg(long)]
    difficulty: Option<String>,

    /// Peer to register at startup, may be repeated
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Proof search threads, 0 for all cores (overrides miner.threads)
    #[arg(long)]
    threads: Option<usize>,

    /// Resolve conflicts against the registered peers before serving
    #[arg(long)]
    resolve: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(port) = args.port {
        config.network.api_port = port;
    }
    if let Some(difficulty) = args.difficulty {
        config.miner.difficulty_prefix = difficulty;
    }
    if let Some(threads) = args.threads {
        config.miner.threads = threads;
    }
    config.network.bootstrap_peers.extend(args.peers);
    config.network.resolve_on_start |= args.resolve;
    config.validate()?;

    let node = Arc::new(Node::from_config(&config)?);
    info!(
        node_id = node.identifier(),
        port = config.network.api_port,
        "starting LedgerChain node"
    );

    if config.network.resolve_on_start {
        if node.resolve_consensus().await {
            info!(length = node.chain_length().await, "adopted a peer chain at startup");
        } else if !node.peers().is_empty() {
            warn!("no longer valid peer chain found at startup");
        }
    }

    run_api_server(node, config.network.api_port).await
}
