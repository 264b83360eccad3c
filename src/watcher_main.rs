//! Voting history watcher binary
//!
//! Keeps the contract's history feed current: rebuilds it whenever the
//! contract emits a log and prints the refreshed feed.

use anyhow::{Context, Result};
use ballotscan::config::{self, NodeArgs};
use ballotscan::{HistoryBuilder, HistoryEntry, HistoryStore, LiveSubscriber, VotingContract};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// Voting history watcher
#[derive(Parser)]
#[command(name = "watcher")]
#[command(about = "Follow a voting contract and print its history feed after each change")]
struct Args {
    #[command(flatten)]
    node: NodeArgs,

    /// Print entries as JSON lines instead of text
    #[arg(long)]
    json: bool,
}

fn print_feed(entries: &[HistoryEntry], as_json: bool) -> Result<()> {
    if as_json {
        for entry in entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }

    println!("--- {} transactions ---", entries.len());
    for entry in entries {
        println!(
            "[{}] {} | {} | {} | from 0x{:x} | tx {:?}",
            entry.timestamp, entry.label, entry.status, entry.details, entry.from, entry.hash
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing();

    let args = Args::parse();
    let contract = args.node.contract()?;

    info!("Starting voting history watcher");
    info!("RPC URL: {}", args.node.rpc_url);
    info!("Contract: 0x{:x}", contract);
    info!("Start block: {}", args.node.start_block);

    let rpc = args.node.rpc();
    let directory = Arc::new(VotingContract::new(rpc.clone(), contract));
    let builder =
        Arc::new(HistoryBuilder::new(Arc::new(rpc), directory).with_workers(args.node.workers()));
    let store = Arc::new(HistoryStore::new());
    let mut changes = store.changes();

    let handle = LiveSubscriber::new(builder, store.clone(), contract)
        .with_start_block(args.node.start_block)
        .start()
        .await
        .context("Failed to subscribe to contract logs")?;

    // Initial load
    handle.request_rebuild();

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = changes.borrow_and_update().clone();
                print_feed(&snapshot, args.json)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                break;
            }
        }
    }

    handle.stop().await;
    info!("Watcher stopped");
    Ok(())
}
