//! JSON-RPC client for Ethereum nodes
//!
//! Provides a typed interface to the handful of Ethereum JSON-RPC
//! endpoints history reconstruction needs. Transport failures and RPC
//! error objects surface as `ChainError::Connectivity`; `null` results
//! for entity lookups surface as `ChainError::NotFound`.

use crate::error::ChainError;
use crate::types::{parse_hex_bytes, parse_hex_u64, Block, Log, Receipt, Transaction};
use alloy_primitives::{Address, B256};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

/// Default cadence for log polling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

/// JSON-RPC client for Ethereum nodes.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    poll_interval: Duration,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set how often log subscriptions poll the node.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChainError::Connectivity(format!("{} request failed: {}", method, e)))?;

        let json: Value = response
            .json()
            .await
            .map_err(|e| ChainError::Connectivity(format!("{} response unreadable: {}", method, e)))?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            return Err(ChainError::Connectivity(format!("{} RPC error: {}", method, error)));
        }

        json.get("result").cloned().ok_or_else(|| {
            ChainError::InvalidResponse(format!("{} response missing 'result' field", method))
        })
    }

    /// Call and deserialize an entity, mapping a `null` result to `NotFound`.
    async fn fetch<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        kind: &'static str,
        id: String,
    ) -> Result<T, ChainError> {
        let result = self.call(method, params).await?;
        if result.is_null() {
            return Err(ChainError::NotFound { kind, id });
        }
        serde_json::from_value(result)
            .map_err(|e| ChainError::InvalidResponse(format!("Failed to deserialize {}: {}", kind, e)))
    }

    /// Get the latest block number.
    pub async fn get_block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number_str = result.as_str().ok_or_else(|| {
            ChainError::InvalidResponse("Block number response is not a string".into())
        })?;
        parse_hex_u64(number_str).map_err(ChainError::InvalidResponse)
    }

    /// Get a block by number with transaction hashes only.
    pub async fn get_block_by_number(&self, number: u64) -> Result<Block, ChainError> {
        let block_str = format!("0x{:x}", number);
        self.fetch(
            "eth_getBlockByNumber",
            json!([block_str, false]),
            "block",
            number.to_string(),
        )
        .await
    }

    /// Get a transaction by hash.
    pub async fn get_transaction_by_hash(&self, tx_hash: B256) -> Result<Transaction, ChainError> {
        let hash_str = format!("0x{:x}", tx_hash);
        self.fetch(
            "eth_getTransactionByHash",
            json!([hash_str.clone()]),
            "transaction",
            hash_str,
        )
        .await
    }

    /// Get a transaction receipt by hash.
    pub async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Receipt, ChainError> {
        let hash_str = format!("0x{:x}", tx_hash);
        self.fetch(
            "eth_getTransactionReceipt",
            json!([hash_str.clone()]),
            "receipt",
            hash_str,
        )
        .await
    }

    /// Get logs emitted by `address` in `[from, to]`.
    pub async fn get_logs(&self, address: Address, from: u64, to: u64) -> Result<Vec<Log>, ChainError> {
        let filter = json!({
            "address": format!("0x{:x}", address),
            "fromBlock": format!("0x{:x}", from),
            "toBlock": format!("0x{:x}", to),
        });
        let result = self.call("eth_getLogs", json!([filter])).await?;
        serde_json::from_value(result)
            .map_err(|e| ChainError::InvalidResponse(format!("Failed to deserialize logs: {}", e)))
    }

    /// Execute a read-only contract call against the latest block.
    pub async fn eth_call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, ChainError> {
        let call = json!({
            "to": format!("0x{:x}", to),
            "data": format!("0x{}", hex::encode(data)),
        });
        let result = self.call("eth_call", json!([call, "latest"])).await?;
        let data_str = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse("eth_call response is not a string".into()))?;
        parse_hex_bytes(data_str).map_err(ChainError::InvalidResponse)
    }
}
