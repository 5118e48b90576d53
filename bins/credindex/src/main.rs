//! credindex - Credential Service Indexer
//!
//! Follows the credential registry, registrar and resolver factory of one EVM chain,
//! discovers resolver instances as they are deployed or pointed at, and serves the
//! reconciled credentials, resolvers and records over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Follow Sepolia from the deployment block
//! RPC_URL=https://... credindex
//!
//! # Protect the API and stop at a fixed block
//! credindex --api-key secret --to-block 10000000
//!
//! # Offline: replay a recorded log fixture
//! credindex --replay-file fixtures/sepolia.json
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use credindex::etl::decoder::{ContractRef, DecoderId};
use credindex::etl::{Extractor, LogRangeConfig, LogRangeExtractor, ReplayExtractor, RetryPolicy};
use credindex::rpc::JsonRpcClient;
use credindex_ecs::abi::resolver_event_topics;
use credindex_ecs::storage::{Credential, Resolver, TextRecord};
use credindex_ecs::{BestEffortReader, EcsDecoder, EcsSink, EcsStore, RpcChainReader};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;

/// Bound for one JSON-RPC request; log ranges can be slow on public nodes.
const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let deployment = config.deployment();
    tracing::info!("Starting credindex");
    tracing::info!("Chain: {}", deployment.chain_id);
    tracing::info!("Registry: {:#x}", deployment.registry);
    tracing::info!("Registrar: {:#x}", deployment.registrar);
    tracing::info!("Factory: {:#x}", deployment.factory);
    tracing::info!("Database: {}", config.db_path.display());
    tracing::info!(
        "API auth: {}",
        if config.api_key.as_deref().is_some_and(|key| !key.is_empty()) {
            "enabled"
        } else {
            "disabled"
        }
    );

    let metrics = if config.no_metrics {
        None
    } else {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("Failed to install Prometheus recorder")?,
        )
    };

    let database_root = config.database_root();
    std::fs::create_dir_all(&database_root)
        .with_context(|| format!("Failed to create {}", database_root.display()))?;
    let store = Arc::new(EcsStore::new(&config.db_path)?);

    let client = Arc::new(JsonRpcClient::new(config.rpc_url.clone(), RPC_REQUEST_TIMEOUT)?);

    let (extractor, reader): (Box<dyn Extractor>, BestEffortReader) = match &config.replay_file {
        Some(path) => {
            tracing::info!("Replaying logs from {} (on-chain reads disabled)", path.display());
            let extractor = ReplayExtractor::from_file(path, deployment.chain_id, 500)?;
            (Box::new(extractor), BestEffortReader::disabled())
        }
        None => {
            tracing::info!("RPC URL: {}", config.rpc_url);
            tracing::info!("From block: {}", config.from_block);
            let extractor = LogRangeExtractor::new(
                client.clone(),
                LogRangeConfig {
                    chain_id: deployment.chain_id,
                    addresses: deployment.addresses(),
                    dynamic_topics: resolver_event_topics(),
                    from_block: config.from_block,
                    to_block: config.to_block,
                    batch_size: config.batch_size,
                    confirmations: config.confirmations,
                    retry_policy: RetryPolicy::default(),
                },
            );
            let reader = RpcChainReader::new().with_client(deployment.chain_id, client.clone());
            (
                Box::new(extractor),
                BestEffortReader::new(Arc::new(reader), config.read_timeout()),
            )
        }
    };

    let decoder = Arc::new(EcsDecoder::new([deployment.clone()]));
    let sink = Box::new(EcsSink::new(store.clone(), reader).with_api_key(config.api_key.clone()));

    let mut indexer = credindex::IndexerConfig::builder()
        .host(config.host.clone())
        .port(config.port)
        .database_root(&database_root)
        .add_extractor(extractor)
        .add_decoder(decoder)
        .add_sink_boxed(sink)
        .allowed_origins(config.allowed_origins.clone());

    // Static contracts always reach the ECS decoder; resolver instances are discovered.
    let ecs_decoder_id = DecoderId::new("ecs");
    for address in deployment.addresses() {
        tracing::info!("Mapping {:#x} to ECS decoder", address);
        indexer = indexer.map_contract(
            ContractRef::new(deployment.chain_id, address),
            vec![ecs_decoder_id],
        );
    }
    if let Some(handle) = metrics {
        indexer = indexer.with_metrics(handle);
    }

    tracing::info!("API available at http://{}:{}", config.host, config.port);

    credindex::run(indexer.build())
        .await
        .map_err(|e| anyhow::anyhow!("Indexer error: {e}"))?;

    tracing::info!("Final Statistics:");
    if let Ok(credentials) = store.count::<Credential>() {
        tracing::info!("  Credentials: {}", credentials);
    }
    if let Ok(resolvers) = store.count::<Resolver>() {
        tracing::info!("  Resolvers: {}", resolvers);
    }
    if let Ok(texts) = store.count::<TextRecord>() {
        tracing::info!("  Text records: {}", texts);
    }

    Ok(())
}
