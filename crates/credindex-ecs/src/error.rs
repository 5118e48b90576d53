use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Read API error, rendered as `{"error": ..., "details"?: ...}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    /// Storage failure while serving `context` (e.g. "Failed to fetch credentials").
    #[error("{context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl ApiError {
    pub fn storage(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Storage { context, source }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, json!({ "error": message })),
            Self::Storage { context, source } => {
                tracing::error!(target: "credindex_ecs::api", error = %source, "{context}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": context, "details": format!("{source:#}") }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
