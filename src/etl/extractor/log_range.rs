//! Log range extractor for EVM JSON-RPC nodes.
//!
//! Each batch covers a block range and issues up to two `eth_getLogs` queries:
//! - every log of the statically known contracts (registry, registrar, factory),
//! - logs matching the dynamic event signatures from any address.
//!
//! Contracts deployed at runtime cannot be listed in an address filter, so the second
//! query is unfiltered by address and the sink discards logs from contracts it has not
//! admitted. The two result sets are merged, deduplicated and sorted by position.

use alloy_primitives::{Address, B256, U64};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use crate::etl::engine_db::EngineDb;
use crate::etl::event::RawLog;
use crate::rpc::{JsonRpcClient, LogFilter, RpcLog};

use super::{BlockContext, ExtractionBatch, Extractor, RetryPolicy};

const STATE_KEY: &str = "last_block";

#[derive(Debug, Clone)]
pub struct LogRangeConfig {
    pub chain_id: u64,

    /// Contracts whose every log is fetched.
    pub addresses: Vec<Address>,

    /// Event signatures (`topic0`) fetched from any address.
    pub dynamic_topics: Vec<B256>,

    pub from_block: u64,

    /// Ending block (None = follow chain head indefinitely)
    pub to_block: Option<u64>,

    /// Blocks per `eth_getLogs` range. Public nodes commonly cap ranges around 1k-10k.
    pub batch_size: u64,

    /// Stay this many blocks behind the head.
    pub confirmations: u64,

    pub retry_policy: RetryPolicy,
}

impl Default for LogRangeConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            addresses: Vec::new(),
            dynamic_topics: Vec::new(),
            from_block: 0,
            to_block: None,
            batch_size: 1000,
            confirmations: 0,
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Fetches logs range by range.
///
/// The cursor is `block:N` where N is the last block whose logs were applied; it is
/// persisted per chain so several chains can share one engine database.
pub struct LogRangeExtractor {
    client: Arc<JsonRpcClient>,
    config: LogRangeConfig,
    current_block: u64,
    initialized: bool,
    reached_end: bool,
}

impl LogRangeExtractor {
    pub fn new(client: Arc<JsonRpcClient>, config: LogRangeConfig) -> Self {
        Self {
            client,
            config,
            current_block: 0,
            initialized: false,
            reached_end: false,
        }
    }

    fn state_key(&self) -> String {
        format!("log_range:{}", self.config.chain_id)
    }

    fn parse_cursor(cursor: &str) -> Result<u64> {
        cursor
            .strip_prefix("block:")
            .with_context(|| format!("Invalid cursor format: expected 'block:N', got '{cursor}'"))?
            .parse::<u64>()
            .context("Invalid cursor format")
    }

    async fn initialize(&mut self, cursor: Option<String>, engine_db: &EngineDb) -> Result<()> {
        // Priority: cursor > saved state > config.from_block
        self.current_block = if let Some(cursor) = cursor {
            Self::parse_cursor(&cursor)?.saturating_add(1)
        } else if let Some(saved) = engine_db
            .get_extractor_state(&self.state_key(), STATE_KEY)
            .await?
        {
            saved.parse::<u64>().context("Invalid saved state")?.saturating_add(1)
        } else {
            self.config.from_block
        };

        tracing::info!(
            target: "credindex::etl::log_range",
            chain_id = self.config.chain_id,
            from_block = self.current_block,
            static_addresses = self.config.addresses.len(),
            dynamic_topics = self.config.dynamic_topics.len(),
            "Log range extractor initialized"
        );

        self.initialized = true;
        Ok(())
    }

    async fn fetch_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<RpcLog>> {
        let policy = &self.config.retry_policy;
        let client = &self.client;
        let mut logs = Vec::new();

        if !self.config.addresses.is_empty() {
            let filter = LogFilter {
                from_block: U64::from(from_block),
                to_block: U64::from(to_block),
                address: self.config.addresses.clone(),
                topics: Vec::new(),
            };
            let filter = &filter;
            logs.extend(
                policy
                    .execute("eth_getLogs", || async move { client.get_logs(filter).await })
                    .await?,
            );
        }

        if !self.config.dynamic_topics.is_empty() {
            let filter = LogFilter {
                from_block: U64::from(from_block),
                to_block: U64::from(to_block),
                address: Vec::new(),
                topics: vec![self.config.dynamic_topics.clone()],
            };
            let filter = &filter;
            logs.extend(
                policy
                    .execute("eth_getLogs", || async move { client.get_logs(filter).await })
                    .await?,
            );
        }

        Ok(logs)
    }

    async fn fetch_blocks(&self, numbers: Vec<u64>) -> Result<HashMap<u64, BlockContext>> {
        let policy = &self.config.retry_policy;
        let client = &self.client;

        let headers = futures::future::try_join_all(numbers.into_iter().map(|number| async move {
            policy
                .execute("eth_getBlockByNumber", || async move {
                    client.get_block_header(number).await
                })
                .await
        }))
        .await?;

        Ok(headers
            .into_iter()
            .map(|header| {
                let number = header.number.to::<u64>();
                (
                    number,
                    BlockContext {
                        number,
                        hash: Some(header.hash),
                        timestamp: header.timestamp.to::<u64>(),
                    },
                )
            })
            .collect())
    }
}

/// Last block of the next range, or None when nothing is safe to fetch yet.
fn plan_range_end(
    current_block: u64,
    batch_size: u64,
    to_block: Option<u64>,
    chain_head: u64,
    confirmations: u64,
) -> Option<u64> {
    let safe_head = chain_head.checked_sub(confirmations)?;
    let mut end = current_block
        .saturating_add(batch_size.max(1) - 1)
        .min(safe_head);
    if let Some(to_block) = to_block {
        end = end.min(to_block);
    }
    (end >= current_block).then_some(end)
}

/// Merge both query results into chain-ordered logs, dropping reorged and duplicate entries.
fn merge_logs(chain_id: u64, logs: Vec<RpcLog>) -> Vec<RawLog> {
    let mut merged = BTreeMap::new();
    for log in logs {
        if log.removed {
            continue;
        }
        let raw = log.into_raw(chain_id);
        merged.entry((raw.block_number, raw.log_index)).or_insert(raw);
    }
    merged.into_values().collect()
}

#[async_trait]
impl Extractor for LogRangeExtractor {
    fn name(&self) -> String {
        self.state_key()
    }

    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    fn is_finished(&self) -> bool {
        self.reached_end
    }

    async fn extract(&mut self, cursor: Option<String>, engine_db: &EngineDb) -> Result<ExtractionBatch> {
        // The cursor only matters for the first call, after that the extractor keeps its own state.
        if !self.initialized {
            self.initialize(cursor, engine_db).await?;
        }

        if self.reached_end {
            return Ok(ExtractionBatch::empty(self.config.chain_id));
        }

        if matches!(self.config.to_block, Some(to_block) if self.current_block > to_block) {
            tracing::info!(
                target: "credindex::etl::log_range",
                chain_id = self.config.chain_id,
                "Reached configured end block"
            );
            self.reached_end = true;
            return Ok(ExtractionBatch::empty(self.config.chain_id));
        }

        let total_start = Instant::now();
        let client = &self.client;
        let chain_head = self
            .config
            .retry_policy
            .execute("eth_blockNumber", || async move { client.block_number().await })
            .await?;

        let Some(batch_end) = plan_range_end(
            self.current_block,
            self.config.batch_size,
            self.config.to_block,
            chain_head,
            self.config.confirmations,
        ) else {
            tracing::trace!(
                target: "credindex::etl::log_range",
                chain_id = self.config.chain_id,
                chain_head,
                next_block = self.current_block,
                "Waiting for new blocks"
            );
            let mut batch = ExtractionBatch::empty(self.config.chain_id);
            batch.chain_head = Some(chain_head);
            return Ok(batch);
        };

        let fetch_start = Instant::now();
        let logs = self.fetch_logs(self.current_block, batch_end).await?;
        let mut events = merge_logs(self.config.chain_id, logs);
        let fetch_ms = fetch_start.elapsed().as_millis();

        let mut block_numbers: Vec<u64> = events.iter().map(|event| event.block_number).collect();
        block_numbers.dedup();
        let blocks = self.fetch_blocks(block_numbers).await?;
        for event in &mut events {
            if let Some(block) = blocks.get(&event.block_number) {
                event.block_timestamp = Some(block.timestamp);
                event.block_hash = event.block_hash.or(block.hash);
            }
        }

        tracing::info!(
            target: "credindex::etl::log_range",
            chain_id = self.config.chain_id,
            from_block = self.current_block,
            to_block = batch_end,
            chain_head,
            logs = events.len(),
            blocks = blocks.len(),
            fetch_ms,
            total_ms = total_start.elapsed().as_millis(),
            "Fetched log range"
        );
        metrics::gauge!("credindex_chain_head", "chain_id" => self.config.chain_id.to_string())
            .set(chain_head as f64);

        self.current_block = batch_end + 1;

        Ok(ExtractionBatch {
            chain_id: self.config.chain_id,
            events,
            blocks,
            cursor: Some(format!("block:{batch_end}")),
            chain_head: Some(chain_head),
        })
    }

    async fn commit_cursor(&mut self, cursor: &str, engine_db: &EngineDb) -> Result<()> {
        let block_num = Self::parse_cursor(cursor)?;
        engine_db
            .set_extractor_state(&self.state_key(), STATE_KEY, &block_num.to_string())
            .await
            .context("Failed to commit cursor")?;
        tracing::debug!(
            target: "credindex::etl::log_range",
            chain_id = self.config.chain_id,
            "Committed cursor: block {}",
            block_num
        );
        Ok(())
    }
}
