//! Minimal Ethereum JSON-RPC client over reqwest.
//!
//! Covers exactly what the pipeline needs: `eth_blockNumber`, `eth_getLogs`,
//! `eth_getBlockByNumber` and `eth_call`.

use alloy_primitives::{Address, Bytes, B256, U64};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::etl::event::RawLog;

/// Error object returned by a JSON-RPC node.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// `eth_getLogs` filter.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub from_block: U64,
    pub to_block: U64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub address: Vec<Address>,
    /// Topic positions; each position is an OR-list.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Vec<B256>>,
}

/// Log as returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: U64,
    #[serde(default)]
    pub block_hash: Option<B256>,
    pub transaction_hash: B256,
    pub log_index: U64,
    #[serde(default)]
    pub removed: bool,
}

impl RpcLog {
    pub fn into_raw(self, chain_id: u64) -> RawLog {
        RawLog {
            chain_id,
            address: self.address,
            topics: self.topics,
            data: self.data,
            block_number: self.block_number.to::<u64>(),
            block_hash: self.block_hash,
            block_timestamp: None,
            transaction_hash: self.transaction_hash,
            log_index: self.log_index.to::<u64>(),
        }
    }
}

/// Header fields of `eth_getBlockByNumber`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcBlockHeader {
    pub number: U64,
    pub hash: B256,
    #[serde(rename = "parentHash")]
    pub parent_hash: B256,
    pub timestamp: U64,
}

pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send one request and decode its `result`.
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(target: "credindex::rpc", method, id, "JSON-RPC request");

        let response: Value = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .error_for_status()
            .with_context(|| format!("{method} returned an HTTP error"))?
            .json()
            .await
            .with_context(|| format!("{method} returned invalid JSON"))?;

        parse_response(method, response)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let number: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(number.to::<u64>())
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RpcLog>> {
        self.request("eth_getLogs", json!([filter])).await
    }

    pub async fn get_block_header(&self, number: u64) -> Result<RpcBlockHeader> {
        let header: Option<RpcBlockHeader> = self
            .request("eth_getBlockByNumber", json!([U64::from(number), false]))
            .await?;
        header.with_context(|| format!("block {number} not found"))
    }

    /// `eth_call` against the state at `block_number`.
    pub async fn call(&self, to: Address, data: Bytes, block_number: u64) -> Result<Bytes> {
        self.request("eth_call", call_params(to, data, block_number))
            .await
    }
}

fn call_params(to: Address, data: Bytes, block_number: u64) -> Value {
    json!([{ "to": to, "data": data }, U64::from(block_number)])
}

fn parse_response<T: DeserializeOwned>(method: &str, response: Value) -> Result<T> {
    let response: RpcResponse<Value> =
        serde_json::from_value(response).with_context(|| format!("{method}: malformed JSON-RPC envelope"))?;

    if let Some(error) = response.error {
        anyhow::bail!("{method} failed with code {}: {}", error.code, error.message);
    }

    // `null` is a legitimate result (e.g. unknown block), let T decide.
    let result = response.result.unwrap_or(Value::Null);
    serde_json::from_value(result).with_context(|| format!("{method}: unexpected result shape"))
}
