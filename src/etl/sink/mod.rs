pub mod multi;

use async_trait::async_trait;
use axum::Router;
use std::path::PathBuf;

use super::envelope::{Envelope, TypeId};
use super::extractor::ExtractionBatch;

pub use multi::MultiSink;

/// Context handed to sinks once, before the pipeline starts.
#[derive(Debug, Clone)]
pub struct SinkContext {
    /// Directory where sinks keep their own databases.
    pub database_root: PathBuf,
}

/// Sink trait - applies envelopes and exposes HTTP routes
///
/// Sinks receive every envelope of a batch, in chain order, together with the batch
/// itself for block context. They filter by [`TypeId`] and downcast what they handle.
///
/// A batch's cursor is committed only when `process` returns `Ok`, so a sink must either
/// apply the whole batch or fail; re-applying an already applied batch must be harmless.
#[async_trait]
pub trait Sink: Send + Sync {
    fn name(&self) -> &str;

    fn interested_types(&self) -> Vec<TypeId>;

    /// Apply a batch of envelopes.
    ///
    /// Use `envelope.metadata` / the decoded body for per-log data and
    /// [`ExtractionBatch::timestamp_of`] for block timestamps.
    async fn process(&self, envelopes: &[Envelope], batch: &ExtractionBatch) -> anyhow::Result<()>;

    /// HTTP routes merged into the main router.
    ///
    /// ```rust,ignore
    /// fn build_routes(&self) -> Router {
    ///     Router::new()
    ///         .route("/api/things", get(list_things))
    ///         .with_state(self.state.clone())
    /// }
    /// ```
    fn build_routes(&self) -> Router;

    /// Called once during startup, before the ETL tasks are spawned.
    async fn initialize(&mut self, _context: &SinkContext) -> anyhow::Result<()> {
        Ok(())
    }
}
