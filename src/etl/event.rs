//! Raw EVM log as delivered by extractors.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single contract log with its chain position.
///
/// Logs are always handed to decoders in ascending `(block_number, log_index)` order
/// for a given chain. Extractors that know the block timestamp fill `block_timestamp`
/// directly; otherwise sinks look it up in `ExtractionBatch::blocks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub chain_id: u64,
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    pub block_number: u64,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_timestamp: Option<u64>,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl RawLog {
    /// Event signature hash (`topics[0]`), if any.
    pub fn selector(&self) -> Option<B256> {
        self.topics.first().copied()
    }

    /// Position of this log inside its chain.
    pub fn position(&self) -> LogPosition {
        LogPosition {
            chain_id: self.chain_id,
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    /// String metadata decoders copy onto envelopes.
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("chain_id".to_string(), self.chain_id.to_string());
        metadata.insert("address".to_string(), format!("{:#x}", self.address));
        metadata.insert("tx_hash".to_string(), format!("{:#x}", self.transaction_hash));
        metadata.insert("block_number".to_string(), self.block_number.to_string());
        metadata.insert("log_index".to_string(), self.log_index.to_string());
        if let Some(block_hash) = self.block_hash {
            metadata.insert("block_hash".to_string(), format!("{block_hash:#x}"));
        }
        metadata
    }
}

/// `(chain, block, log index)` triple identifying one log occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LogPosition {
    pub chain_id: u64,
    pub block_number: u64,
    pub log_index: u64,
}
