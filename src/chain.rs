//! Read-only chain access
//!
//! `ChainReader` is the seam between history reconstruction and a chain
//! node. The production implementation is `RpcClient`; tests use an
//! in-memory chain.

use crate::error::ChainError;
use crate::rpc::RpcClient;
use crate::types::{Block, Log, Receipt, Transaction};
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Buffered log events per subscription before the producer waits.
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Which logs a subscription delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
}

impl LogFilter {
    pub fn address(address: Address) -> Self {
        Self { address }
    }

    pub fn matches(&self, log: &Log) -> bool {
        log.address == self.address
    }
}

/// Infinite, cancellable stream of log events.
///
/// Cancelling (or dropping) the subscription stops the producer; no
/// further events are delivered afterwards.
pub struct LogSubscription {
    rx: mpsc::Receiver<Log>,
    producer: Option<JoinHandle<()>>,
}

impl LogSubscription {
    /// Subscription fed by a spawned producer task.
    pub fn new(rx: mpsc::Receiver<Log>, producer: JoinHandle<()>) -> Self {
        Self {
            rx,
            producer: Some(producer),
        }
    }

    /// Subscription fed directly by whoever holds the sender.
    pub fn from_channel(rx: mpsc::Receiver<Log>) -> Self {
        Self { rx, producer: None }
    }

    /// Next log event, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Log> {
        self.rx.recv().await
    }

    /// Stop delivery.
    pub fn cancel(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
        self.rx.close();
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Read access to a chain node.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current block height.
    async fn current_height(&self) -> Result<u64, ChainError>;

    /// Block by number, with its ordered transaction hashes.
    async fn block_at(&self, number: u64) -> Result<Block, ChainError>;

    /// Transaction by hash.
    async fn transaction(&self, hash: B256) -> Result<Transaction, ChainError>;

    /// Receipt by transaction hash.
    async fn receipt(&self, hash: B256) -> Result<Receipt, ChainError>;

    /// Subscribe to logs matching `filter`, starting after the current head.
    async fn subscribe(&self, filter: LogFilter) -> Result<LogSubscription, ChainError>;
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        self.get_block_number().await
    }

    async fn block_at(&self, number: u64) -> Result<Block, ChainError> {
        self.get_block_by_number(number).await
    }

    async fn transaction(&self, hash: B256) -> Result<Transaction, ChainError> {
        self.get_transaction_by_hash(hash).await
    }

    async fn receipt(&self, hash: B256) -> Result<Receipt, ChainError> {
        self.get_transaction_receipt(hash).await
    }

    async fn subscribe(&self, filter: LogFilter) -> Result<LogSubscription, ChainError> {
        let start = self.get_block_number().await?;
        let (tx, rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let producer = tokio::spawn(poll_logs(self.clone(), filter, start + 1, tx));
        Ok(LogSubscription::new(rx, producer))
    }
}

/// Poll `eth_getLogs` for new blocks until the receiver goes away.
async fn poll_logs(rpc: RpcClient, filter: LogFilter, mut next_block: u64, tx: mpsc::Sender<Log>) {
    let mut ticker = tokio::time::interval(rpc.poll_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let head = match rpc.get_block_number().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Log poll failed to read head: {}", e);
                continue;
            }
        };
        if head < next_block {
            continue;
        }

        let logs = match rpc.get_logs(filter.address, next_block, head).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!("Log poll failed for blocks {}..={}: {}", next_block, head, e);
                continue;
            }
        };
        debug!("Polled blocks {}..={}: {} logs", next_block, head, logs.len());

        for log in logs.into_iter().filter(|log| filter.matches(log)) {
            if tx.send(log).await.is_err() {
                return;
            }
        }
        next_block = head + 1;
    }
}
