#![forbid(unsafe_code)]

use colored::*;

fn main() {
    println!("{}", "LedgerChain CLI".bright_cyan().bold());
    println!("{}", "---------------".bright_cyan());
    println!();
    println!(
        "{}",
        "Use 'cargo run --bin <binary_name>' to run a specific command.".yellow()
    );
    println!();
    println!("{}", "Available binaries:".bright_green().underline());
    println!("  - {}  {}", "ledgerchain-node".bright_white(), "run a node with its HTTP API");
    println!("  - {}  {}", "ledgerchain-inspect".bright_white(), "fetch and validate a node's chain");
    println!();
    println!("{}", "Example:".bright_green().underline());
    println!("{}", "  cargo run --bin ledgerchain-node -- --port 5001 --peer http://127.0.0.1:5000".italic());
}
