//! Replays a recorded, finite list of logs.
//!
//! Used for fixtures, backfills from exported log dumps and the reconciliation tests.
//! Logs are delivered in chain order regardless of the order they were recorded in.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

use crate::etl::engine_db::EngineDb;
use crate::etl::event::RawLog;

use super::{BlockContext, ExtractionBatch, Extractor};

const STATE_KEY: &str = "next_index";

pub struct ReplayExtractor {
    chain_id: u64,
    logs: Vec<RawLog>,
    next_index: usize,
    batch_size: usize,
    initialized: bool,
}

impl ReplayExtractor {
    /// Logs of other chains are dropped.
    pub fn new(chain_id: u64, mut logs: Vec<RawLog>, batch_size: usize) -> Self {
        logs.retain(|log| log.chain_id == chain_id);
        logs.sort_by_key(RawLog::position);
        Self {
            chain_id,
            logs,
            next_index: 0,
            batch_size: batch_size.max(1),
            initialized: false,
        }
    }

    /// Load a JSON array of logs (camelCase fields, hex quantities as in [`RawLog`]).
    pub fn from_file(path: impl AsRef<Path>, chain_id: u64, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let logs: Vec<RawLog> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid replay file {}", path.display()))?;

        tracing::info!(
            target: "credindex::etl::replay",
            path = %path.display(),
            chain_id,
            logs = logs.len(),
            "Loaded replay file"
        );

        Ok(Self::new(chain_id, logs, batch_size))
    }

    fn state_key(&self) -> String {
        format!("replay:{}", self.chain_id)
    }

    fn parse_cursor(cursor: &str) -> Result<usize> {
        cursor
            .strip_prefix("log:")
            .with_context(|| format!("Invalid cursor format: expected 'log:N', got '{cursor}'"))?
            .parse::<usize>()
            .context("Invalid cursor format")
    }

    async fn initialize(&mut self, cursor: Option<String>, engine_db: &EngineDb) -> Result<()> {
        self.next_index = if let Some(cursor) = cursor {
            Self::parse_cursor(&cursor)?
        } else if let Some(saved) = engine_db.get_extractor_state(&self.state_key(), STATE_KEY).await? {
            saved.parse::<usize>().context("Invalid saved state")?
        } else {
            0
        };

        if self.next_index > 0 {
            tracing::info!(
                target: "credindex::etl::replay",
                chain_id = self.chain_id,
                next_index = self.next_index,
                "Resuming replay"
            );
        }
        self.initialized = true;
        Ok(())
    }
}

#[async_trait]
impl Extractor for ReplayExtractor {
    fn name(&self) -> String {
        self.state_key()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn is_finished(&self) -> bool {
        self.initialized && self.next_index >= self.logs.len()
    }

    async fn extract(&mut self, cursor: Option<String>, engine_db: &EngineDb) -> Result<ExtractionBatch> {
        if !self.initialized {
            self.initialize(cursor, engine_db).await?;
        }

        if self.next_index >= self.logs.len() {
            return Ok(ExtractionBatch::empty(self.chain_id));
        }

        let end = (self.next_index + self.batch_size).min(self.logs.len());
        let events = self.logs[self.next_index..end].to_vec();
        self.next_index = end;

        let mut blocks = HashMap::new();
        for event in &events {
            if let Some(timestamp) = event.block_timestamp {
                blocks.entry(event.block_number).or_insert_with(|| BlockContext {
                    number: event.block_number,
                    hash: event.block_hash,
                    timestamp,
                });
            }
        }

        tracing::debug!(
            target: "credindex::etl::replay",
            chain_id = self.chain_id,
            logs = events.len(),
            blocks = blocks.len(),
            remaining = self.logs.len() - end,
            "Replayed batch"
        );

        Ok(ExtractionBatch {
            chain_id: self.chain_id,
            events,
            blocks,
            cursor: Some(format!("log:{end}")),
            chain_head: None,
        })
    }

    async fn commit_cursor(&mut self, cursor: &str, engine_db: &EngineDb) -> Result<()> {
        let next_index = Self::parse_cursor(cursor)?;
        engine_db
            .set_extractor_state(&self.state_key(), STATE_KEY, &next_index.to_string())
            .await
            .context("Failed to commit cursor")
    }
}
