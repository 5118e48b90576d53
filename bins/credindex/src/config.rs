//! Configuration for the credential indexer

use alloy_primitives::Address;
use clap::Parser;
use credindex_ecs::Deployment;
use std::path::PathBuf;
use std::time::Duration;

/// Credential Service Indexer
///
/// Indexes credential registry, registrar, resolver factory and resolver events and
/// serves the materialized state over HTTP.
#[derive(Parser, Debug)]
#[command(name = "credindex")]
#[command(about = "Index credential registry and resolver events on EVM chains", long_about = None)]
pub struct Config {
    /// JSON-RPC endpoint used for log extraction and on-chain reads
    #[arg(
        long,
        env = "RPC_URL",
        default_value = "https://ethereum-sepolia-rpc.publicnode.com"
    )]
    pub rpc_url: String,

    #[arg(long, env = "CHAIN_ID", default_value = "11155111")]
    pub chain_id: u64,

    /// Credential registry address
    #[arg(long, default_value = "0x1Cc0E6c3B645D7751DE7Ff7ce7d17cD228e4a4F2")]
    pub registry: Address,

    /// Registrar address
    #[arg(long, default_value = "0x86a67901820da1e3523Db67d02083C0a08170b37")]
    pub registrar: Address,

    /// Resolver factory address
    #[arg(long, default_value = "0xb5b31DEb61f6b9Dd61b222ad50084e11EF53B8E3")]
    pub factory: Address,

    /// Starting block number
    #[arg(long, env = "START_BLOCK", default_value = "9900600")]
    pub from_block: u64,

    /// Ending block number (None = follow chain head)
    #[arg(long)]
    pub to_block: Option<u64>,

    /// Blocks per eth_getLogs range
    #[arg(long, default_value = "1000")]
    pub batch_size: u64,

    /// Stay this many blocks behind the chain head
    #[arg(long, default_value = "0")]
    pub confirmations: u64,

    /// Entity database path; the engine database is created next to it
    #[arg(long, default_value = "./credindex-data/ecs.db")]
    pub db_path: PathBuf,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API
    #[arg(long, default_value = "3000")]
    pub port: u16,

    /// Bearer token required by non-public API routes (auth disabled when unset)
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// Allowed CORS origins (comma-separated, any origin when empty)
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,

    /// Timeout of one on-chain read in milliseconds
    #[arg(long, default_value = "5000")]
    pub read_timeout_ms: u64,

    /// Replay logs from a JSON fixture instead of fetching them over RPC
    ///
    /// On-chain reads are disabled in replay mode.
    #[arg(long)]
    pub replay_file: Option<PathBuf>,

    /// Do not install the Prometheus recorder
    #[arg(long)]
    pub no_metrics: bool,
}

impl Config {
    pub fn deployment(&self) -> Deployment {
        Deployment {
            chain_id: self.chain_id,
            registry: self.registry,
            registrar: self.registrar,
            factory: self.factory,
            start_block: self.from_block,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Directory holding the entity and engine databases.
    pub fn database_root(&self) -> PathBuf {
        self.db_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_sepolia_deployment() {
        let config = Config::parse_from(["credindex"]);
        assert_eq!(config.deployment(), Deployment::sepolia());
        assert_eq!(config.database_root(), PathBuf::from("./credindex-data"));
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn test_origins_are_comma_separated() {
        let config = Config::parse_from([
            "credindex",
            "--allowed-origins",
            "https://a.example,https://b.example",
            "--db-path",
            "ecs.db",
        ]);
        assert_eq!(config.allowed_origins.len(), 2);
        assert_eq!(config.database_root(), PathBuf::from("."));
    }
}
