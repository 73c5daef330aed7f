#![forbid(unsafe_code)]
//! Fetch a node's chain and verify it locally

use clap::Parser;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use ledgerchain::blockchain::check_chain;
use ledgerchain::miner::PowTarget;
use ledgerchain::network::{normalize_peer_address, ChainFetcher, HttpChainFetcher};

#[derive(Parser, Debug)]
#[command(name = "ledgerchain-inspect", version, about = "Inspect and validate a node's chain")]
struct Args {
    /// Node address, e.g. http://127.0.0.1:5000
    node: String,

    /// Proof-of-work hex prefix the chain was mined with
    #[arg(long, default_value = ledgerchain::miner::DEFAULT_TARGET_PREFIX)]
    difficulty: String,

    /// Request timeout
    #[arg(long, default_value = "5s")]
    timeout: humantime::Duration,

    /// Show at most this many of the latest blocks
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let peer = normalize_peer_address(&args.node)?;
    let target = PowTarget::new(&args.difficulty)?;
    let fetcher = HttpChainFetcher::new(*args.timeout)?;

    let snapshot = fetcher.fetch_chain(&peer).await?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Index",
        "Timestamp",
        "Transactions",
        "Proof",
        "Previous hash",
    ]);
    for block in snapshot.chain.iter().rev().take(args.limit) {
        let when = chrono::DateTime::from_timestamp(block.timestamp as i64, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| block.timestamp.to_string());
        table.add_row(vec![
            Cell::new(block.index),
            Cell::new(when),
            Cell::new(block.transactions.len()),
            Cell::new(block.proof),
            Cell::new(&block.previous_hash),
        ]);
    }

    println!("{} {}", "Chain from".bright_cyan().bold(), peer.bright_white());
    println!("{}", table);
    println!("Reported length: {}  Blocks received: {}", snapshot.length, snapshot.chain.len());

    let verdict = check_chain(&snapshot.chain, &target);
    if verdict.is_valid() && snapshot.length == snapshot.chain.len() {
        println!("{}", "✅ Chain is valid".bright_green().bold());
    } else {
        println!("{} {:?}", "❌ Chain is invalid:".bright_red().bold(), verdict);
        std::process::exit(1);
    }
    Ok(())
}
