//! historyctl - voting contract history CLI tool
//!
//! Reconstructs the contract's transaction history in one pass and prints
//! it as pretty JSON.

use ballotscan::{cli, config};

#[tokio::main]
async fn main() {
    config::init_tracing();

    if let Err(e) = cli::run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
