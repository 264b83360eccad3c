//! In-memory chain used by unit tests.

use crate::bindings::{addCandidateCall, voteCall};
use crate::chain::{ChainReader, LogFilter, LogSubscription};
use crate::error::ChainError;
use crate::types::{Block, Log, Receipt, Transaction};
use alloy_primitives::{address, Address, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

pub const CONTRACT: Address = address!("c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0c0");
pub const OTHER: Address = address!("0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d0d");
pub const SENDER: Address = address!("eeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee");
pub const GENESIS_TIME: u64 = 1_700_000_000;

pub fn hash(n: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    B256::from(bytes)
}

pub fn vote_calldata(index: u64) -> Vec<u8> {
    voteCall {
        candidateIndex: U256::from(index),
    }
    .abi_encode()
}

pub fn add_candidate_calldata(name: &str) -> Vec<u8> {
    addCandidateCall {
        name: name.into(),
        avatar: "QmAvatar".into(),
        program: "A program".into(),
    }
    .abi_encode()
}

pub fn contract_log(block: u64) -> Log {
    Log {
        address: CONTRACT,
        topics: vec![],
        data: vec![],
        block_number: Some(block),
        transaction_hash: None,
    }
}

/// Chain with blocks `0..=height`, 12 seconds apart.
pub struct MockChain {
    height: u64,
    blocks: BTreeMap<u64, Block>,
    txs: HashMap<B256, Transaction>,
    receipts: HashMap<B256, Receipt>,
    next_hash: u64,
    unreachable_blocks: HashSet<u64>,
    missing_blocks: HashSet<u64>,
    log_feed: Mutex<Option<mpsc::Receiver<Log>>>,
    gate: Option<Arc<Semaphore>>,
    height_calls: AtomicUsize,
}

impl MockChain {
    pub fn new(height: u64) -> Self {
        let blocks = (0..=height)
            .map(|n| {
                (
                    n,
                    Block {
                        number: n,
                        timestamp: GENESIS_TIME + n * 12,
                        transactions: vec![],
                    },
                )
            })
            .collect();
        Self {
            height,
            blocks,
            txs: HashMap::new(),
            receipts: HashMap::new(),
            next_hash: 1,
            unreachable_blocks: HashSet::new(),
            missing_blocks: HashSet::new(),
            log_feed: Mutex::new(None),
            gate: None,
            height_calls: AtomicUsize::new(0),
        }
    }

    /// Append a transaction with an auto-assigned hash.
    pub fn add_tx(
        &mut self,
        block: u64,
        to: Option<Address>,
        input: Vec<u8>,
        success: bool,
    ) -> B256 {
        let h = hash(self.next_hash);
        self.next_hash += 1;
        self.add_tx_with_hash(block, h, to, input, success);
        h
    }

    pub fn add_tx_with_hash(
        &mut self,
        block: u64,
        h: B256,
        to: Option<Address>,
        input: Vec<u8>,
        success: bool,
    ) {
        if let Some(b) = self.blocks.get_mut(&block) {
            b.transactions.push(h);
        }
        self.txs.insert(
            h,
            Transaction {
                hash: h,
                from: SENDER,
                to,
                input,
                block_number: Some(block),
            },
        );
        self.receipts.insert(
            h,
            Receipt {
                transaction_hash: h,
                status: Some(success as u64),
            },
        );
    }

    pub fn set_timestamp(&mut self, block: u64, timestamp: u64) {
        if let Some(b) = self.blocks.get_mut(&block) {
            b.timestamp = timestamp;
        }
    }

    pub fn remove_receipt(&mut self, h: B256) {
        self.receipts.remove(&h);
    }

    /// Keep the hash in its block but forget the transaction body.
    pub fn remove_transaction(&mut self, h: B256) {
        self.txs.remove(&h);
    }

    /// Receipt as a pre-Byzantium node returns it, without `status`.
    pub fn clear_receipt_status(&mut self, h: B256) {
        if let Some(receipt) = self.receipts.get_mut(&h) {
            receipt.status = None;
        }
    }

    pub fn make_unreachable(&mut self, block: u64) {
        self.unreachable_blocks.insert(block);
    }

    pub fn make_missing(&mut self, block: u64) {
        self.missing_blocks.insert(block);
    }

    /// Deliver logs sent on the returned sender to the next subscriber.
    pub fn log_feed(&self) -> mpsc::Sender<Log> {
        let (tx, rx) = mpsc::channel(64);
        if let Ok(mut feed) = self.log_feed.lock() {
            *feed = Some(rx);
        }
        tx
    }

    /// Every `current_height` call waits for one permit.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Number of `current_height` calls (one per rebuild).
    pub fn height_calls(&self) -> usize {
        self.height_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn current_height(&self) -> Result<u64, ChainError> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ChainError::Connectivity(e.to_string()))?;
            permit.forget();
        }
        Ok(self.height)
    }

    async fn block_at(&self, number: u64) -> Result<Block, ChainError> {
        if self.unreachable_blocks.contains(&number) {
            return Err(ChainError::Connectivity(format!("block {} timed out", number)));
        }
        if self.missing_blocks.contains(&number) {
            return Err(ChainError::not_found("block", number));
        }
        self.blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| ChainError::not_found("block", number))
    }

    async fn transaction(&self, h: B256) -> Result<Transaction, ChainError> {
        self.txs
            .get(&h)
            .cloned()
            .ok_or_else(|| ChainError::not_found("transaction", h))
    }

    async fn receipt(&self, h: B256) -> Result<Receipt, ChainError> {
        self.receipts
            .get(&h)
            .cloned()
            .ok_or_else(|| ChainError::not_found("receipt", h))
    }

    async fn subscribe(&self, _filter: LogFilter) -> Result<LogSubscription, ChainError> {
        let rx = self
            .log_feed
            .lock()
            .ok()
            .and_then(|mut feed| feed.take())
            .ok_or_else(|| ChainError::Connectivity("no log feed".into()))?;
        Ok(LogSubscription::from_channel(rx))
    }
}

/// Answer to one JSON-RPC request: `Ok(result)` or `Err(error message)`.
pub type RpcReply = Result<Value, String>;

type Handler = Arc<dyn Fn(&str, &Value) -> RpcReply + Send + Sync>;

/// JSON-RPC node over plain HTTP on a random local port.
///
/// Every request is recorded and answered by the handler; the connection
/// is closed after each response.
pub struct RpcStub {
    url: String,
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    server: JoinHandle<()>,
}

impl RpcStub {
    pub async fn start(handler: impl Fn(&str, &Value) -> RpcReply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let recorded = requests.clone();
        let server = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, handler, recorded).await;
                });
            }
        });

        Self {
            url,
            requests,
            server,
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Params of every request for `method`, in arrival order.
    pub fn params(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.params(method).len()
    }
}

impl Drop for RpcStub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    handler: Handler,
    recorded: Arc<Mutex<Vec<(String, Value)>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let body_start = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..body_start]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < body_start + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request: Value =
        serde_json::from_slice(&buf[body_start..body_start + content_length]).unwrap_or_default();
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let params = request["params"].clone();
    recorded.lock().unwrap().push((method.clone(), params.clone()));

    let reply = match handler(&method, &params) {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }),
        Err(message) => json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": { "code": -32000, "message": message }
        }),
    };
    let body = reply.to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Hex quantity as a node returns it.
pub fn quantity(n: u64) -> Value {
    json!(format!("0x{:x}", n))
}

/// Parse a hex quantity from request params.
pub fn param_u64(value: &Value) -> u64 {
    let s = value.as_str().unwrap_or_default();
    u64::from_str_radix(s.trim_start_matches("0x"), 16).unwrap()
}
