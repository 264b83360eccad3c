//! Transaction history reconstruction
//!
//! Scans a block range for transactions sent to the voting contract,
//! classifies each one by selector and turns it into a `HistoryEntry`.
//! Blocks are fetched by a bounded pool of concurrent workers; the final
//! sort makes fetch order irrelevant to the result.

use crate::cache::CandidateCache;
use crate::chain::ChainReader;
use crate::contract::CandidateDirectory;
use crate::error::ChainError;
use crate::registry::{CallFields, MethodRegistry, UNKNOWN_LABEL};
use crate::types::Block;
use alloy_primitives::{Address, B256};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Default number of blocks fetched concurrently.
pub const DEFAULT_WORKERS: usize = 8;

/// Execution outcome of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Success,
    Failure,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Success => write!(f, "Success"),
            TxStatus::Failure => write!(f, "Failure"),
        }
    }
}

/// One line of the history feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Method label, e.g. "Voting has begun"
    pub label: String,
    pub hash: B256,
    /// Block timestamp (seconds since epoch)
    pub timestamp: u64,
    pub block_number: u64,
    pub from: Address,
    pub status: TxStatus,
    /// Label plus block number plus any decoded field
    pub details: String,
}

/// Sort newest first; equal timestamps by ascending hash.
pub fn sort_entries(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.hash.cmp(&b.hash))
    });
}

fn with_block(text: &str, block: u64) -> String {
    format!("{} (Block: {})", text, block)
}

/// Builds the history feed for one contract from chain data.
pub struct HistoryBuilder {
    chain: Arc<dyn ChainReader>,
    directory: Arc<dyn CandidateDirectory>,
    registry: MethodRegistry,
    workers: usize,
}

impl HistoryBuilder {
    /// Create a builder for the voting contract's method set.
    pub fn new(chain: Arc<dyn ChainReader>, directory: Arc<dyn CandidateDirectory>) -> Self {
        Self {
            chain,
            directory,
            registry: MethodRegistry::voting(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Limit how many blocks are fetched concurrently (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn chain(&self) -> &Arc<dyn ChainReader> {
        &self.chain
    }

    /// Scan `from..=head` where head is the chain's current height.
    pub async fn scan_to_head(
        &self,
        from: u64,
        contract: Address,
    ) -> Result<Vec<HistoryEntry>, ChainError> {
        let head = self.chain.current_height().await?;
        self.scan(from, head, contract).await
    }

    /// Scan `from..=to` and return entries sorted newest first.
    ///
    /// Only connectivity errors abort the scan. Missing blocks,
    /// transactions or receipts are logged and skipped.
    pub async fn scan(
        &self,
        from: u64,
        to: u64,
        contract: Address,
    ) -> Result<Vec<HistoryEntry>, ChainError> {
        if from > to {
            return Ok(Vec::new()); // Nothing to scan
        }

        info!(
            "Scanning blocks {} to {} for contract 0x{:x} ({} workers)",
            from, to, contract, self.workers
        );
        let cache = Mutex::new(CandidateCache::new());

        let per_block: Vec<Vec<HistoryEntry>> = stream::iter(from..=to)
            .map(|number| self.scan_block(number, contract, &cache))
            .buffered(self.workers)
            .try_collect()
            .await?;

        let mut entries: Vec<HistoryEntry> = per_block.into_iter().flatten().collect();
        sort_entries(&mut entries);

        info!(
            "Scan of blocks {} to {} complete: {} entries",
            from,
            to,
            entries.len()
        );
        Ok(entries)
    }

    async fn scan_block(
        &self,
        number: u64,
        contract: Address,
        cache: &Mutex<CandidateCache>,
    ) -> Result<Vec<HistoryEntry>, ChainError> {
        let block = match self.chain.block_at(number).await {
            Ok(block) => block,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Skipping block {}: {}", number, e);
                return Ok(Vec::new());
            }
        };

        debug!(
            "Processing block {} ({} transactions)",
            number,
            block.transactions.len()
        );

        let mut entries = Vec::new();
        for tx_hash in &block.transactions {
            match self.scan_transaction(&block, *tx_hash, contract, cache).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Skipping TX {:?} in block {}: {}", tx_hash, number, e),
            }
        }
        Ok(entries)
    }

    async fn scan_transaction(
        &self,
        block: &Block,
        tx_hash: B256,
        contract: Address,
        cache: &Mutex<CandidateCache>,
    ) -> Result<Option<HistoryEntry>, ChainError> {
        let tx = self.chain.transaction(tx_hash).await?;
        if !tx.calls(contract) {
            return Ok(None);
        }

        let receipt = self.chain.receipt(tx_hash).await?;
        let (label, details) = self.describe(&tx.input, block.number, cache).await;

        debug!("Found TX {:?} in block {}: {}", tx.hash, block.number, details);

        Ok(Some(HistoryEntry {
            label,
            hash: tx.hash,
            timestamp: block.timestamp,
            block_number: block.number,
            from: tx.from,
            status: if receipt.is_success() {
                TxStatus::Success
            } else {
                TxStatus::Failure
            },
            details,
        }))
    }

    /// Label and details for a call. Never fails: unknown selectors and
    /// undecodable arguments fall back to the generic label.
    async fn describe(
        &self,
        calldata: &[u8],
        block: u64,
        cache: &Mutex<CandidateCache>,
    ) -> (String, String) {
        let method = match self.registry.resolve_calldata(calldata) {
            Ok(method) => method,
            Err(unknown) => {
                debug!("{} in block {}", unknown, block);
                return (UNKNOWN_LABEL.to_string(), with_block(UNKNOWN_LABEL, block));
            }
        };

        let details = match method.decode(calldata) {
            Ok(CallFields::Vote { candidate_index }) => {
                match self.candidate_name(candidate_index, cache).await {
                    Ok(name) => with_block(&format!("Vote for candidate: {}", name), block),
                    Err(e) => {
                        warn!("Failed to resolve candidate {}: {}", candidate_index, e);
                        with_block(method.label, block)
                    }
                }
            }
            Ok(CallFields::AddCandidate { name, .. }) => {
                with_block(&format!("Candidate added: {}", name), block)
            }
            Ok(CallFields::None) => with_block(method.label, block),
            Err(e) => {
                warn!("Failed to decode {} call in block {}: {}", method.name, block, e);
                with_block(method.label, block)
            }
        };

        (method.label.to_string(), details)
    }

    async fn candidate_name(
        &self,
        index: u64,
        cache: &Mutex<CandidateCache>,
    ) -> Result<String, ChainError> {
        let cached = cache
            .lock()
            .ok()
            .and_then(|c| c.get(index).map(str::to_owned));
        if let Some(name) = cached {
            return Ok(name);
        }

        let name = self.directory.candidate_name(index).await?;
        if let Ok(mut c) = cache.lock() {
            c.insert(index, name.clone());
        }
        Ok(name)
    }
}
