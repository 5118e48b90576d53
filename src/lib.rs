//! credindex - EVM log indexer framework.
//!
//! Extract logs from one or more chains, decode them into typed envelopes and apply them
//! through sinks that also serve a read API. Domain crates plug in decoders and sinks.
pub mod etl;
pub mod http;
pub mod rpc;

// Re-export commonly used types for external sink authors
pub use async_trait::async_trait;
pub use axum;
pub use tokio;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router as AxumRouter;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any as CorsAny, CorsLayer};

use etl::decoder::{ContractFilter, ContractRef, DecoderId};
use etl::extractor::{ExtractionBatch, Extractor};
use etl::sink::{Sink, SinkContext};
use etl::{Decoder, DecoderContext, EngineDb, MultiSink};
use http::create_http_router;

/// Configuration for the indexer.
pub struct IndexerConfig {
    pub port: u16,
    pub host: String,

    /// Sinks to register (not yet initialized).
    pub sinks: Vec<Box<dyn Sink>>,

    pub decoders: Vec<Arc<dyn Decoder>>,

    /// One extractor per chain; each runs in its own ETL task.
    pub extractors: Vec<Box<dyn Extractor>>,

    /// Root directory for all databases (engine and sinks).
    pub database_root: PathBuf,

    pub contract_filter: ContractFilter,

    /// Seconds to wait when an extractor is at the chain head or a step failed.
    pub cycle_interval: u64,

    /// Seconds to wait for ETL tasks after a shutdown signal (default: 30).
    pub shutdown_timeout: u64,

    /// CORS origins; empty allows any origin.
    pub allowed_origins: Vec<String>,

    /// Rendered at `GET /metrics` when set.
    pub metrics: Option<PrometheusHandle>,
}

impl IndexerConfig {
    pub fn builder() -> IndexerConfigBuilder {
        IndexerConfigBuilder::default()
    }
}

#[derive(Default)]
pub struct IndexerConfigBuilder {
    port: Option<u16>,
    host: Option<String>,
    sinks: Vec<Box<dyn Sink>>,
    decoders: Vec<Arc<dyn Decoder>>,
    extractors: Vec<Box<dyn Extractor>>,
    database_root: Option<PathBuf>,
    contract_filter: Option<ContractFilter>,
    cycle_interval: Option<u64>,
    shutdown_timeout: Option<u64>,
    allowed_origins: Vec<String>,
    metrics: Option<PrometheusHandle>,
}

impl IndexerConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sinks should NOT be wrapped in Arc yet, they are initialized first.
    pub fn add_sink_boxed(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoders.push(decoder);
        self
    }

    pub fn with_decoders(mut self, decoders: Vec<Arc<dyn Decoder>>) -> Self {
        self.decoders.extend(decoders);
        self
    }

    pub fn add_extractor(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn database_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_root = Some(path.into());
        self
    }

    pub fn with_contract_filter(mut self, filter: ContractFilter) -> Self {
        self.contract_filter = Some(filter);
        self
    }

    /// Logs from this contract ONLY reach the listed decoders.
    pub fn map_contract(mut self, contract: ContractRef, decoder_ids: Vec<DecoderId>) -> Self {
        self.contract_filter
            .get_or_insert_with(ContractFilter::new)
            .mappings
            .insert(contract, decoder_ids);
        self
    }

    pub fn blacklist_contract(mut self, contract: ContractRef) -> Self {
        self.contract_filter
            .get_or_insert_with(ContractFilter::new)
            .blacklist
            .insert(contract);
        self
    }

    pub fn cycle_interval(mut self, seconds: u64) -> Self {
        self.cycle_interval = Some(seconds);
        self
    }

    pub fn shutdown_timeout(mut self, seconds: u64) -> Self {
        self.shutdown_timeout = Some(seconds);
        self
    }

    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn build(self) -> IndexerConfig {
        IndexerConfig {
            port: self.port.unwrap_or(8080),
            host: self.host.unwrap_or_else(|| "0.0.0.0".to_string()),
            sinks: self.sinks,
            decoders: self.decoders,
            extractors: self.extractors,
            database_root: self.database_root.unwrap_or_else(|| PathBuf::from(".")),
            contract_filter: self.contract_filter.unwrap_or_default(),
            cycle_interval: self.cycle_interval.unwrap_or(3),
            shutdown_timeout: self.shutdown_timeout.unwrap_or(30),
            allowed_origins: self.allowed_origins,
            metrics: self.metrics,
        }
    }
}

/// Decode one batch, apply it through the sink, then record the chain head.
///
/// The caller commits the batch cursor only when this returns `Ok`.
pub async fn process_batch(
    batch: &ExtractionBatch,
    decoder: &dyn Decoder,
    sink: &dyn Sink,
    engine_db: &EngineDb,
) -> anyhow::Result<usize> {
    let envelopes = decoder.decode(&batch.events).await.context("Decode failed")?;
    sink.process(&envelopes, batch)
        .await
        .context("Sink processing failed")?;

    if let Some(latest_block) = batch.last_block() {
        if let Err(e) = engine_db
            .update_head(batch.chain_id, latest_block, batch.len() as u64)
            .await
        {
            tracing::warn!(target: "credindex::etl", "Failed to update engine DB: {}", e);
        }
    }

    metrics::counter!("credindex_logs_extracted_total", "chain_id" => batch.chain_id.to_string())
        .increment(batch.len() as u64);

    Ok(envelopes.len())
}

async fn run_etl_loop(
    mut extractor: Box<dyn Extractor>,
    decoder: Arc<DecoderContext>,
    sink: Arc<MultiSink>,
    engine_db: Arc<EngineDb>,
    cycle_interval: Duration,
    shutdown_token: CancellationToken,
) {
    let name = extractor.name();
    tracing::info!(target: "credindex::etl", extractor = %name, "Starting ETL pipeline...");

    let mut cursor: Option<String> = None;

    loop {
        if shutdown_token.is_cancelled() {
            tracing::info!(target: "credindex::etl", extractor = %name, "Shutdown requested, stopping ETL loop");
            break;
        }

        let batch = match extractor.extract(cursor.clone(), &engine_db).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!(target: "credindex::etl", extractor = %name, "Extract failed: {:#}", e);
                tokio::select! {
                    _ = shutdown_token.cancelled() => break,
                    _ = tokio::time::sleep(cycle_interval) => continue,
                }
            }
        };

        if batch.is_empty() {
            // Empty ranges still move the cursor forward.
            if let Some(ref cursor_str) = batch.cursor {
                if let Err(e) = extractor.commit_cursor(cursor_str, &engine_db).await {
                    tracing::error!(target: "credindex::etl", extractor = %name, "Failed to commit cursor: {}", e);
                }
                cursor = batch.cursor.clone();
            }

            if extractor.is_finished() {
                tracing::info!(target: "credindex::etl", extractor = %name, "Extractor finished, stopping ETL loop");
                break;
            }

            if batch.cursor.is_none() {
                tokio::select! {
                    _ = shutdown_token.cancelled() => break,
                    _ = tokio::time::sleep(cycle_interval) => {}
                }
            }
            continue;
        }

        tracing::info!(target: "credindex::etl", extractor = %name, "Extracted {} logs", batch.len());

        // The extractor has already moved past this batch, so retry it until it lands.
        let applied = loop {
            match process_batch(&batch, decoder.as_ref(), sink.as_ref(), &engine_db).await {
                Ok(envelopes) => break Some(envelopes),
                Err(e) => {
                    tracing::error!(
                        target: "credindex::etl",
                        extractor = %name,
                        "Batch failed, retrying in {:?}: {:#}",
                        cycle_interval,
                        e
                    );
                    tokio::select! {
                        _ = shutdown_token.cancelled() => break None,
                        _ = tokio::time::sleep(cycle_interval) => {}
                    }
                }
            }
        };
        let Some(envelopes) = applied else {
            tracing::info!(target: "credindex::etl", extractor = %name, "Shutdown requested with an unapplied batch");
            break;
        };

        // Commit cursor ONLY AFTER successful sink processing.
        if let Some(ref cursor_str) = batch.cursor {
            if let Err(e) = extractor.commit_cursor(cursor_str, &engine_db).await {
                // Re-processed on restart, which the sinks absorb.
                tracing::error!(target: "credindex::etl", extractor = %name, "Failed to commit cursor: {}", e);
            }
        }
        cursor = batch.cursor;

        tracing::info!(
            target: "credindex::etl",
            extractor = %name,
            envelopes,
            "ETL cycle complete"
        );
    }

    tracing::info!(target: "credindex::etl", extractor = %name, "ETL loop completed gracefully");
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(CorsAny).allow_headers(CorsAny);

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(target: "credindex::main", origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        layer.allow_origin(CorsAny)
    } else {
        layer.allow_origin(origins)
    }
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "credindex::main", "Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(target: "credindex::main", "Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!(target: "credindex::main", "Received SIGINT (Ctrl+C), initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!(target: "credindex::main", "Received SIGTERM, initiating graceful shutdown...");
        }
    }

    token.cancel();
}

/// Starts the indexer: one ETL task per extractor plus the HTTP server.
pub async fn run(config: IndexerConfig) -> anyhow::Result<()> {
    tracing::info!(
        target: "credindex::main",
        "Starting indexer with {} sink(s), {} decoder(s) and {} extractor(s)",
        config.sinks.len(),
        config.decoders.len(),
        config.extractors.len()
    );

    let sink_context = SinkContext {
        database_root: config.database_root.clone(),
    };

    let mut initialized_sinks: Vec<Arc<dyn Sink>> = Vec::new();
    for mut sink in config.sinks {
        sink.initialize(&sink_context).await?;
        initialized_sinks.push(Arc::from(sink));
    }
    let multi_sink = Arc::new(MultiSink::new(initialized_sinks));

    let engine_db_path = config.database_root.join("engine.db");
    let engine_db = Arc::new(
        EngineDb::new(etl::engine_db::EngineDbConfig {
            path: engine_db_path.to_string_lossy().to_string(),
        })
        .await?,
    );
    engine_db
        .set_stat("start_time", &chrono::Utc::now().to_rfc3339())
        .await?;

    let decoder_context = Arc::new(DecoderContext::new(config.decoders, config.contract_filter)?);

    let app = AxumRouter::new()
        .merge(create_http_router(Some(engine_db.clone()), config.metrics))
        .merge(multi_sink.build_routes())
        .layer(cors_layer(&config.allowed_origins));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;

    let shutdown_token = CancellationToken::new();
    let cycle_interval = Duration::from_secs(config.cycle_interval);

    if config.extractors.is_empty() {
        tracing::warn!(target: "credindex::etl", "No extractor configured, serving the API only");
    }

    let etl_handles: Vec<_> = config
        .extractors
        .into_iter()
        .map(|extractor| {
            tokio::spawn(run_etl_loop(
                extractor,
                decoder_context.clone(),
                multi_sink.clone(),
                engine_db.clone(),
                cycle_interval,
                shutdown_token.clone(),
            ))
        })
        .collect();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(target: "credindex::main", "Server listening on {}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(shutdown_token.clone()));

    const SERVER_SHUTDOWN_TIMEOUT_SECS: u64 = 15;
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(target: "credindex::main", "Server error: {}", e);
            }
        }
        _ = async {
            shutdown_token.cancelled().await;
            tokio::time::sleep(Duration::from_secs(SERVER_SHUTDOWN_TIMEOUT_SECS)).await;
        } => {
            tracing::warn!(
                target: "credindex::main",
                "Server connections did not close within {}s, forcing shutdown",
                SERVER_SHUTDOWN_TIMEOUT_SECS
            );
        }
    }

    // The server can also stop on its own (bind loss); make sure the ETL tasks follow.
    shutdown_token.cancel();
    tracing::info!(target: "credindex::main", "HTTP server stopped, waiting for ETL tasks to complete...");

    let shutdown_timeout = config.shutdown_timeout;
    match tokio::time::timeout(
        Duration::from_secs(shutdown_timeout),
        futures::future::join_all(etl_handles),
    )
    .await
    {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    tracing::error!(target: "credindex::main", "ETL task panicked: {}", e);
                }
            }
            tracing::info!(target: "credindex::main", "ETL tasks completed");
        }
        Err(_) => {
            tracing::warn!(
                target: "credindex::main",
                "ETL tasks did not complete within {}s timeout, forcing shutdown",
                shutdown_timeout
            );
        }
    }

    tracing::info!(target: "credindex::main", "Indexer shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::envelope::{Envelope, TypeId, TypedBody};
    use crate::etl::event::RawLog;
    use crate::etl::extractor::ReplayExtractor;
    use alloy_primitives::{Address, Bytes, B256};
    use async_trait::async_trait;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Seen(u64);

    impl TypedBody for Seen {
        fn envelope_type_id(&self) -> TypeId {
            TypeId::new("test.seen")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct EchoDecoder;

    #[async_trait]
    impl Decoder for EchoDecoder {
        fn decoder_name(&self) -> &str {
            "echo"
        }

        async fn decode_event(&self, event: &RawLog) -> anyhow::Result<Vec<Envelope>> {
            Ok(vec![Envelope::new(
                "echo",
                Box::new(Seen(event.block_number)),
                event.metadata(),
                event.position(),
            )])
        }
    }

    /// Fails the first `failures` batches.
    struct FlakySink {
        failures: AtomicUsize,
        applied: AtomicUsize,
    }

    #[async_trait]
    impl Sink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn interested_types(&self) -> Vec<TypeId> {
            vec![TypeId::new("test.seen")]
        }

        async fn process(&self, envelopes: &[Envelope], _batch: &ExtractionBatch) -> anyhow::Result<()> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("transient");
            }
            self.applied.fetch_add(envelopes.len(), Ordering::SeqCst);
            Ok(())
        }

        fn build_routes(&self) -> axum::Router {
            axum::Router::new()
        }
    }

    fn log(block_number: u64) -> RawLog {
        RawLog {
            chain_id: 1,
            address: Address::ZERO,
            topics: vec![],
            data: Bytes::new(),
            block_number,
            block_hash: None,
            block_timestamp: Some(1_700_000_000),
            transaction_hash: B256::ZERO,
            log_index: 0,
        }
    }

    #[tokio::test]
    async fn test_etl_loop_retries_failed_batch_and_commits() {
        let engine_db = Arc::new(
            EngineDb::new(etl::engine_db::EngineDbConfig {
                path: ":memory:".to_string(),
            })
            .await
            .unwrap(),
        );
        let sink = Arc::new(FlakySink {
            failures: AtomicUsize::new(1),
            applied: AtomicUsize::new(0),
        });
        let multi_sink = Arc::new(MultiSink::new(vec![sink.clone()]));
        let decoder = Arc::new(
            DecoderContext::new(vec![Arc::new(EchoDecoder)], ContractFilter::new()).unwrap(),
        );
        let extractor = Box::new(ReplayExtractor::new(1, vec![log(1), log(2), log(3)], 2));

        run_etl_loop(
            extractor,
            decoder,
            multi_sink,
            engine_db.clone(),
            Duration::from_millis(1),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(sink.applied.load(Ordering::SeqCst), 3);
        assert_eq!(engine_db.get_head(1).await.unwrap(), (3, 3));
        assert_eq!(
            engine_db
                .get_extractor_state("replay:1", "next_index")
                .await
                .unwrap()
                .as_deref(),
            Some("3")
        );
    }

    #[test]
    fn test_builder_defaults() {
        let config = IndexerConfig::builder()
            .port(9000)
            .allowed_origins(vec!["https://app.example".to_string()])
            .build();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.cycle_interval, 3);
        assert_eq!(config.shutdown_timeout, 30);
        assert!(config.extractors.is_empty());
        assert_eq!(config.allowed_origins.len(), 1);
    }
}
