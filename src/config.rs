//! Configuration shared by the binaries
//!
//! Node and contract selection, scan tuning and logging setup.

use crate::history::DEFAULT_WORKERS;
use crate::rpc::RpcClient;
use crate::types::pad_hex_string;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Local development node.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Address the voting contract is deployed at.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x897058DfB39113d0F4F1E5081f0C06721B7BDEd9";

/// Seconds between log polls.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 12;

/// Node connection and scan options.
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// RPC endpoint URL
    #[arg(short, long, default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Voting contract address (hex, with or without 0x prefix)
    #[arg(short, long, default_value = DEFAULT_CONTRACT_ADDRESS)]
    pub contract: String,

    /// Read the contract address from a file instead (first non-comment line)
    #[arg(long)]
    pub contract_file: Option<PathBuf>,

    /// First block included in the history
    #[arg(long, default_value_t = 0)]
    pub start_block: u64,

    /// Number of blocks fetched concurrently
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Seconds between polls for new contract logs
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,
}

impl NodeArgs {
    /// Contract address, from `--contract-file` when given.
    pub fn contract(&self) -> Result<Address> {
        match &self.contract_file {
            Some(path) => load_contract_address(path),
            None => parse_address(&self.contract)
                .with_context(|| format!("Invalid contract address: {}", self.contract)),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }

    pub fn rpc(&self) -> RpcClient {
        RpcClient::new(self.rpc_url.clone()).with_poll_interval(self.poll_interval())
    }
}

/// Read a contract address from a deployment file.
///
/// The first line that is neither empty nor a `#` comment must hold the
/// address; anything after it is ignored.
pub fn load_contract_address(path: &Path) -> Result<Address> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read contract address file: {:?}", path))?;

    let (line_num, line) = contents
        .lines()
        .map(str::trim)
        .enumerate()
        .find(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .with_context(|| format!("No contract address found in {:?}", path))?;

    parse_address(line)
        .with_context(|| format!("Invalid address on line {}: {}", line_num + 1, line))
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix, in any letter case.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!(
            "Address must be 20 bytes (40 hex chars), got {} bytes",
            bytes.len()
        );
    }

    Ok(Address::from_slice(&bytes))
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
