//! Best-effort on-chain reads.
//!
//! Reconciliation enriches some events with view calls against the registry (label from
//! hash, expiration, resolver pointer). Reads are bounded by a timeout and a failure only
//! means "unknown": it never aborts the event that triggered it.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use anyhow::{Context, Result};
use async_trait::async_trait;
use credindex::rpc::JsonRpcClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::abi::registry::{getExpirationCall, getLabelCall, resolverCall};

/// Default bound for one read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Raw `eth_call` capability, evaluated against the state at `block_number`.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(&self, chain_id: u64, block_number: u64, to: Address, calldata: Bytes) -> Result<Bytes>;
}

/// Reads through one JSON-RPC client per chain.
#[derive(Default)]
pub struct RpcChainReader {
    clients: HashMap<u64, Arc<JsonRpcClient>>,
}

impl RpcChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, chain_id: u64, client: Arc<JsonRpcClient>) -> Self {
        self.clients.insert(chain_id, client);
        self
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn call(&self, chain_id: u64, block_number: u64, to: Address, calldata: Bytes) -> Result<Bytes> {
        let client = self
            .clients
            .get(&chain_id)
            .with_context(|| format!("no RPC client for chain {chain_id}"))?;
        client.call(to, calldata, block_number).await
    }
}

/// Reader for offline replays: every call fails, so every enrichment degrades.
pub struct NoopChainReader;

#[async_trait]
impl ChainReader for NoopChainReader {
    async fn call(&self, chain_id: u64, _block_number: u64, _to: Address, _calldata: Bytes) -> Result<Bytes> {
        anyhow::bail!("on-chain reads are disabled for chain {chain_id}")
    }
}

/// Typed, bounded view calls that turn every failure into `None`.
#[derive(Clone)]
pub struct BestEffortReader {
    inner: Arc<dyn ChainReader>,
    timeout: Duration,
}

impl BestEffortReader {
    pub fn new(inner: Arc<dyn ChainReader>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopChainReader), DEFAULT_READ_TIMEOUT)
    }

    async fn read<C: SolCall>(
        &self,
        chain_id: u64,
        block_number: u64,
        to: Address,
        call: C,
        what: &'static str,
    ) -> Option<C::Return> {
        let calldata = Bytes::from(call.abi_encode());
        let pending = self.inner.call(chain_id, block_number, to, calldata);
        let result = match tokio::time::timeout(self.timeout, pending).await {
            Ok(Ok(output)) => C::abi_decode_returns(&output, true)
                .with_context(|| format!("undecodable {what} return data")),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(anyhow::anyhow!("timed out after {:?}", self.timeout)),
        };

        match result {
            Ok(value) => Some(value),
            Err(e) => {
                metrics::counter!("credindex_ecs_reads_failed_total", "read" => what).increment(1);
                tracing::warn!(
                    target: "credindex_ecs::reader",
                    chain_id,
                    block_number,
                    contract = %to,
                    read = what,
                    error = %e,
                    "On-chain read failed, field left unknown"
                );
                None
            }
        }
    }

    /// Plaintext label for a hash. An empty string counts as unknown.
    pub async fn label(&self, chain_id: u64, block_number: u64, registry: Address, labelhash: B256) -> Option<String> {
        self.read(chain_id, block_number, registry, getLabelCall { labelhash }, "getLabel")
            .await
            .map(|ret| ret._0)
            .filter(|label| !label.is_empty())
    }

    pub async fn expiration(&self, chain_id: u64, block_number: u64, registry: Address, labelhash: B256) -> Option<U256> {
        self.read(chain_id, block_number, registry, getExpirationCall { labelhash }, "getExpiration")
            .await
            .map(|ret| ret._0)
    }

    /// Resolver pointer as stored by the registry. `Some(Address::ZERO)` means the read
    /// succeeded and no resolver is set.
    pub async fn resolver(&self, chain_id: u64, block_number: u64, registry: Address, labelhash: B256) -> Option<Address> {
        self.read(chain_id, block_number, registry, resolverCall { labelhash }, "resolver")
            .await
            .map(|ret| ret._0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use alloy_sol_types::SolValue;

    struct FixedReader(Bytes);

    #[async_trait]
    impl ChainReader for FixedReader {
        async fn call(&self, _chain_id: u64, _block_number: u64, _to: Address, _calldata: Bytes) -> Result<Bytes> {
            Ok(self.0.clone())
        }
    }

    /// Answers every call with the block it was evaluated at.
    struct BlockEchoReader;

    #[async_trait]
    impl ChainReader for BlockEchoReader {
        async fn call(&self, _chain_id: u64, block_number: u64, _to: Address, _calldata: Bytes) -> Result<Bytes> {
            Ok(Bytes::from(U256::from(block_number).abi_encode()))
        }
    }

    struct SlowReader;

    #[async_trait]
    impl ChainReader for SlowReader {
        async fn call(&self, _chain_id: u64, _block_number: u64, _to: Address, _calldata: Bytes) -> Result<Bytes> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Bytes::new())
        }
    }

    const REGISTRY: Address = address!("1Cc0E6c3B645D7751DE7Ff7ce7d17cD228e4a4F2");

    #[tokio::test]
    async fn test_label_read_decodes_string() {
        let output = Bytes::from(("alice".to_string(),).abi_encode_params());
        let reader = BestEffortReader::new(Arc::new(FixedReader(output)), DEFAULT_READ_TIMEOUT);
        assert_eq!(
            reader.label(1, 10, REGISTRY, B256::ZERO).await.as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_resolver_read_keeps_zero_address() {
        let output = Bytes::from(Address::ZERO.abi_encode());
        let reader = BestEffortReader::new(Arc::new(FixedReader(output)), DEFAULT_READ_TIMEOUT);
        assert_eq!(reader.resolver(1, 10, REGISTRY, B256::ZERO).await, Some(Address::ZERO));
    }

    #[tokio::test]
    async fn test_failures_degrade_to_none() {
        let reader = BestEffortReader::disabled();
        assert_eq!(reader.label(1, 10, REGISTRY, B256::ZERO).await, None);
        assert_eq!(reader.expiration(1, 10, REGISTRY, B256::ZERO).await, None);

        // Garbage return data.
        let reader = BestEffortReader::new(
            Arc::new(FixedReader(Bytes::from_static(&[1, 2, 3]))),
            DEFAULT_READ_TIMEOUT,
        );
        assert_eq!(reader.expiration(1, 10, REGISTRY, B256::ZERO).await, None);
    }

    #[tokio::test]
    async fn test_reads_are_pinned_to_the_event_block() {
        let reader = BestEffortReader::new(Arc::new(BlockEchoReader), DEFAULT_READ_TIMEOUT);
        assert_eq!(
            reader.expiration(1, 9_900_601, REGISTRY, B256::ZERO).await,
            Some(U256::from(9_900_601u64))
        );
    }

    #[tokio::test]
    async fn test_slow_read_times_out() {
        let reader = BestEffortReader::new(Arc::new(SlowReader), Duration::from_millis(100));
        assert_eq!(reader.resolver(1, 10, REGISTRY, B256::ZERO).await, None);
    }
}
