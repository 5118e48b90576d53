//! Core HTTP endpoints.
//!
//! Sinks add their own routes via `Sink::build_routes()`; this router only carries
//! liveness, pipeline heads and the Prometheus scrape endpoint.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::etl::engine_db::{ChainHead, EngineDb};

#[derive(Clone)]
pub struct HttpState {
    pub version: String,
    pub startup_time: i64,
    pub engine_db: Option<Arc<EngineDb>>,
    pub metrics: Option<PrometheusHandle>,
}

impl HttpState {
    pub fn new(engine_db: Option<Arc<EngineDb>>, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            startup_time: chrono::Utc::now().timestamp(),
            engine_db,
            metrics,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    #[serde(default)]
    pub heads: Vec<ChainHead>,
}

async fn health_handler(State(state): State<Arc<HttpState>>) -> Json<HealthResponse> {
    let now = chrono::Utc::now().timestamp();

    let heads = match &state.engine_db {
        Some(engine_db) => match engine_db.get_stats().await {
            Ok(stats) => stats.heads,
            Err(e) => {
                tracing::warn!(target: "credindex::http", error = %e, "Failed to read pipeline heads");
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: now - state.startup_time,
        heads,
    })
}

async fn metrics_handler(State(state): State<Arc<HttpState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Core router: `GET /health` and `GET /metrics`.
pub fn create_http_router(engine_db: Option<Arc<EngineDb>>, metrics: Option<PrometheusHandle>) -> Router {
    let state = Arc::new(HttpState::new(engine_db, metrics));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::engine_db::EngineDbConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint_reports_heads() {
        let engine_db = Arc::new(
            EngineDb::new(EngineDbConfig {
                path: ":memory:".to_string(),
            })
            .await
            .unwrap(),
        );
        engine_db.update_head(11155111, 9_900_650, 4).await.unwrap();

        let app = create_http_router(Some(engine_db), None);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health_response: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health_response.status, "healthy");
        assert!(health_response.uptime_seconds >= 0);
        assert_eq!(health_response.heads.len(), 1);
        assert_eq!(health_response.heads[0].block_number, 9_900_650);
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let app = create_http_router(None, None);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
