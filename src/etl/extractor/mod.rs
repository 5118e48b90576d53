//! Extractor trait for fetching logs from EVM nodes or recorded fixtures

pub mod log_range;
pub mod replay;
pub mod retry;

use crate::etl::engine_db::EngineDb;
use crate::etl::event::RawLog;
use alloy_primitives::B256;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub use log_range::{LogRangeConfig, LogRangeExtractor};
pub use replay::ReplayExtractor;
pub use retry::RetryPolicy;

/// Block context information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    pub hash: Option<B256>,
    pub timestamp: u64,
}

/// Logs of one chain plus the blocks they belong to.
///
/// Block context is deduplicated: many logs from the same block share one
/// [`BlockContext`]. Sinks look timestamps up with [`ExtractionBatch::timestamp_of`]
/// instead of scanning `events`.
#[derive(Debug, Clone)]
pub struct ExtractionBatch {
    pub chain_id: u64,

    /// Logs in chain order (block number, then log index).
    pub events: Vec<RawLog>,

    /// Block context keyed by block number.
    pub blocks: HashMap<u64, BlockContext>,

    /// Opaque cursor to commit once the batch has been applied.
    pub cursor: Option<String>,

    /// Latest block the node reported when this batch was built.
    pub chain_head: Option<u64>,
}

impl ExtractionBatch {
    pub fn empty(chain_id: u64) -> Self {
        Self {
            chain_id,
            events: Vec::new(),
            blocks: HashMap::new(),
            cursor: None,
            chain_head: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Timestamp of a block, from the block map or the log itself.
    pub fn timestamp_of(&self, block_number: u64) -> Option<u64> {
        if let Some(block) = self.blocks.get(&block_number) {
            return Some(block.timestamp);
        }
        self.events
            .iter()
            .find(|event| event.block_number == block_number)
            .and_then(|event| event.block_timestamp)
    }

    /// Highest block number carried by the batch.
    pub fn last_block(&self) -> Option<u64> {
        self.events.iter().map(|event| event.block_number).max()
    }
}

/// Extractor trait for fetching enriched log batches
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name for logs and metrics (e.g. `"log_range:11155111"`).
    fn name(&self) -> String;

    fn chain_id(&self) -> u64;

    /// Extract the next batch.
    ///
    /// - Non-empty batch: process it, then call `extract()` again
    /// - Empty batch + `is_finished() = false`: waiting for new blocks, sleep and retry
    /// - Empty batch + `is_finished() = true`: reached the configured end, stop calling
    async fn extract(&mut self, cursor: Option<String>, engine_db: &EngineDb) -> Result<ExtractionBatch>;

    fn is_finished(&self) -> bool;

    /// Persist a cursor once the sinks have applied the batch it belongs to.
    async fn commit_cursor(&mut self, _cursor: &str, _engine_db: &EngineDb) -> Result<()> {
        Ok(())
    }
}
