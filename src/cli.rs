//! CLI implementation for historyctl
//!
//! One-shot queries against the voting contract. All commands output
//! pretty JSON on stdout; logs go to stderr.

use crate::config::NodeArgs;
use crate::contract::VotingContract;
use crate::history::HistoryBuilder;
use crate::registry::{CallFields, MethodRegistry, UNKNOWN_LABEL};
use crate::session::SessionState;
use crate::types::pad_hex_string;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::sync::Arc;

/// Voting contract history tool
#[derive(Parser)]
#[command(name = "historyctl")]
#[command(about = "Reconstruct the transaction history of a voting contract")]
pub struct Cli {
    #[command(flatten)]
    node: NodeArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the chain and print the history feed, newest first
    History {
        /// Last block to scan (defaults to the current head)
        #[arg(long)]
        to_block: Option<u64>,
    },
    /// Show the owner, voting phase and candidates
    Session,
    /// Classify raw calldata without contacting the node
    Decode {
        /// Calldata in hex (with or without 0x prefix)
        calldata: String,
    },
}

/// Run the CLI with the given arguments.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let result = execute(&cli.node, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn execute(node: &NodeArgs, command: Commands) -> Result<Value> {
    match command {
        Commands::History { to_block } => {
            let contract = node.contract()?;
            let rpc = node.rpc();
            let directory = Arc::new(VotingContract::new(rpc.clone(), contract));
            let builder =
                HistoryBuilder::new(Arc::new(rpc), directory).with_workers(node.workers());

            let entries = match to_block {
                Some(to) => builder.scan(node.start_block, to, contract).await,
                None => builder.scan_to_head(node.start_block, contract).await,
            }
            .context("History scan failed")?;

            Ok(json!({
                "contract": format!("0x{:x}", contract),
                "count": entries.len(),
                "entries": entries,
            }))
        }
        Commands::Session => {
            let contract = VotingContract::new(node.rpc(), node.contract()?);
            let session = SessionState::load(&contract)
                .await
                .context("Failed to read session state")?;
            Ok(serde_json::to_value(session)?)
        }
        Commands::Decode { calldata } => decode_calldata(&calldata),
    }
}

fn decode_calldata(calldata_hex: &str) -> Result<Value> {
    let s = calldata_hex.strip_prefix("0x").unwrap_or(calldata_hex);
    let calldata = hex::decode(pad_hex_string(s))
        .with_context(|| format!("Invalid hex calldata: {}", calldata_hex))?;

    let registry = MethodRegistry::voting();
    let method = match registry.resolve_calldata(&calldata) {
        Ok(method) => method,
        Err(unknown) => {
            return Ok(json!({
                "label": UNKNOWN_LABEL,
                "selector": format!("0x{}", hex::encode(unknown.0)),
            }))
        }
    };

    let args = match method.decode(&calldata)? {
        CallFields::None => json!({}),
        CallFields::Vote { candidate_index } => json!({ "candidate_index": candidate_index }),
        CallFields::AddCandidate {
            name,
            avatar,
            program,
        } => json!({ "name": name, "avatar": avatar, "program": program }),
    };

    Ok(json!({
        "method": method.name,
        "label": method.label,
        "selector": format!("0x{}", hex::encode(method.selector)),
        "args": args,
    }))
}
