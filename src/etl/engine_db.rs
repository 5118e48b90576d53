//! Engine database.
//!
//! Tracks per-chain heads, free-form stats and extractor cursors. Domain data lives in the
//! sinks' own databases; this file only holds what the pipeline needs to resume.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS head (
    chain_id INTEGER PRIMARY KEY,
    block_number INTEGER NOT NULL DEFAULT 0,
    event_count INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS stats (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS extractor_state (
    extractor_type TEXT NOT NULL,
    state_key TEXT NOT NULL,
    state_value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (extractor_type, state_key)
);
";

/// Engine database configuration
#[derive(Debug, Clone)]
pub struct EngineDbConfig {
    /// File path, or `:memory:`.
    pub path: String,
}

/// Engine database for tracking pipeline state
pub struct EngineDb {
    conn: Mutex<Connection>,
}

/// Head of one chain's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChainHead {
    pub chain_id: u64,
    pub block_number: u64,
    pub event_count: u64,
}

/// Engine statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineStats {
    pub heads: Vec<ChainHead>,
    pub total_events: u64,
    pub start_time: String,
}

impl EngineDb {
    pub async fn new(config: EngineDbConfig) -> Result<Self> {
        let conn = if config.path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(&config.path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
                }
            }
            Connection::open(&config.path)
                .with_context(|| format!("Failed to open engine database at {}", config.path))?
        };

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        conn.execute_batch(SCHEMA_SQL)
            .context("Failed to initialize engine schema")?;

        tracing::info!(target: "credindex::etl::engine_db", path = %config.path, "Engine database schema initialized");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("engine database lock poisoned"))
    }

    /// Current head for a chain, `(block_number, event_count)`; zeros when unseen.
    pub async fn get_head(&self, chain_id: u64) -> Result<(u64, u64)> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT block_number, event_count FROM head WHERE chain_id = ?1",
                params![chain_id as i64],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        Ok(row.map_or((0, 0), |(block, count)| (block as u64, count as u64)))
    }

    /// Move a chain's head forward and add to its event count.
    pub async fn update_head(&self, chain_id: u64, block_number: u64, events_processed: u64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO head (chain_id, block_number, event_count) VALUES (?1, ?2, ?3)
             ON CONFLICT(chain_id) DO UPDATE SET
                block_number = MAX(head.block_number, excluded.block_number),
                event_count = head.event_count + excluded.event_count",
            params![chain_id as i64, block_number as i64, events_processed as i64],
        )?;
        Ok(())
    }

    pub async fn get_stat(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row("SELECT value FROM stats WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?)
    }

    pub async fn set_stat(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stats (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<EngineStats> {
        let heads = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT chain_id, block_number, event_count FROM head ORDER BY chain_id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ChainHead {
                    chain_id: row.get::<_, i64>(0)? as u64,
                    block_number: row.get::<_, i64>(1)? as u64,
                    event_count: row.get::<_, i64>(2)? as u64,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let start_time = self.get_stat("start_time").await?.unwrap_or_default();

        Ok(EngineStats {
            total_events: heads.iter().map(|h| h.event_count).sum(),
            heads,
            start_time,
        })
    }

    /// Get extractor state value
    ///
    /// # Arguments
    /// * `extractor_type` - Extractor instance (e.g. `"log_range:11155111"`)
    /// * `state_key` - State key (e.g. `"last_block"`)
    pub async fn get_extractor_state(&self, extractor_type: &str, state_key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT state_value FROM extractor_state WHERE extractor_type = ?1 AND state_key = ?2",
                params![extractor_type, state_key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub async fn set_extractor_state(&self, extractor_type: &str, state_key: &str, state_value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO extractor_state (extractor_type, state_key, state_value, updated_at)
             VALUES (?1, ?2, ?3, strftime('%s', 'now'))
             ON CONFLICT(extractor_type, state_key)
             DO UPDATE SET state_value = excluded.state_value, updated_at = strftime('%s', 'now')",
            params![extractor_type, state_key, state_value],
        )?;
        Ok(())
    }

    pub async fn delete_extractor_state(&self, extractor_type: &str, state_key: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM extractor_state WHERE extractor_type = ?1 AND state_key = ?2",
            params![extractor_type, state_key],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_db() -> EngineDb {
        EngineDb::new(EngineDbConfig {
            path: ":memory:".to_string(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_heads_are_per_chain() {
        let db = memory_db().await;
        assert_eq!(db.get_head(1).await.unwrap(), (0, 0));

        db.update_head(1, 100, 5).await.unwrap();
        db.update_head(11155111, 9_900_700, 3).await.unwrap();
        db.update_head(1, 101, 2).await.unwrap();

        assert_eq!(db.get_head(1).await.unwrap(), (101, 7));
        assert_eq!(db.get_head(11155111).await.unwrap(), (9_900_700, 3));

        let stats = db.get_stats().await.unwrap();
        assert_eq!(stats.heads.len(), 2);
        assert_eq!(stats.total_events, 10);
    }

    #[tokio::test]
    async fn test_head_never_moves_backwards() {
        let db = memory_db().await;
        db.update_head(1, 200, 1).await.unwrap();
        // Replayed range after a restart.
        db.update_head(1, 150, 1).await.unwrap();
        assert_eq!(db.get_head(1).await.unwrap(), (200, 2));
    }

    #[tokio::test]
    async fn test_extractor_state_round_trip() {
        let db = memory_db().await;
        assert!(db.get_extractor_state("log_range:1", "last_block").await.unwrap().is_none());

        db.set_extractor_state("log_range:1", "last_block", "42").await.unwrap();
        db.set_extractor_state("log_range:1", "last_block", "43").await.unwrap();
        assert_eq!(
            db.get_extractor_state("log_range:1", "last_block").await.unwrap().as_deref(),
            Some("43")
        );

        db.delete_extractor_state("log_range:1", "last_block").await.unwrap();
        assert!(db.get_extractor_state("log_range:1", "last_block").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.db");
        let config = EngineDbConfig {
            path: path.to_string_lossy().to_string(),
        };

        {
            let db = EngineDb::new(config.clone()).await.unwrap();
            db.set_stat("start_time", "2025-12-23T00:00:00Z").await.unwrap();
        }

        let db = EngineDb::new(config).await.unwrap();
        assert_eq!(
            db.get_stat("start_time").await.unwrap().as_deref(),
            Some("2025-12-23T00:00:00Z")
        );
    }
}
