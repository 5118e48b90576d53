//! MultiSink runs multiple sinks in sequence
//!
//! Every sink sees every batch. A failing sink does not stop the others, but the batch as
//! a whole is reported as failed so its cursor is not committed.

use async_trait::async_trait;
use axum::Router;
use std::sync::Arc;
use std::time::Instant;

use super::Sink;
use crate::etl::envelope::{Envelope, TypeId};
use crate::etl::extractor::ExtractionBatch;

pub struct MultiSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn sinks(&self) -> &[Arc<dyn Sink>] {
        &self.sinks
    }
}

#[async_trait]
impl Sink for MultiSink {
    fn name(&self) -> &'static str {
        "multi"
    }

    fn interested_types(&self) -> Vec<TypeId> {
        // Delegates to individual sinks.
        vec![]
    }

    async fn process(&self, envelopes: &[Envelope], batch: &ExtractionBatch) -> anyhow::Result<()> {
        let mut failed = Vec::new();

        for sink in &self.sinks {
            let started = Instant::now();
            match sink.process(envelopes, batch).await {
                Ok(()) => {
                    metrics::histogram!("credindex_sink_batch_seconds", "sink" => sink.name().to_string())
                        .record(started.elapsed().as_secs_f64());
                }
                Err(e) => {
                    tracing::error!(
                        target: "credindex::etl::multi_sink",
                        sink = sink.name(),
                        chain_id = batch.chain_id,
                        error = %e,
                        "Sink failed to process batch"
                    );
                    failed.push(sink.name().to_string());
                }
            }
        }

        tracing::debug!(
            target: "credindex::etl::multi_sink",
            "Processed {} envelopes across {} sinks",
            envelopes.len(),
            self.sinks.len()
        );

        if !failed.is_empty() {
            anyhow::bail!("sink(s) failed: {}", failed.join(", "));
        }
        Ok(())
    }

    fn build_routes(&self) -> Router {
        let mut router = Router::new();
        for sink in &self.sinks {
            router = router.merge(sink.build_routes());
        }
        router
    }
}
