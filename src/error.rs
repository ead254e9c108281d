use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Recorded inline on a `RetrievalResult` leg; never propagated as an `Err` past
    /// the retrieval phase, since one failing data source must not fail the request.
    #[error("retrieval leg failed for {source}: {message}")]
    RetrievalLeg { source: String, message: String },

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("tunnel auth failed: {0}")]
    TunnelAuth(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl AggregatorError {
    /// Sanitized message safe to return to HTTP clients. Does not leak upstream
    /// error bodies, internal URLs, or peer connection details.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::RetrievalLeg { source, .. } => format!("retrieval failed for {source}"),
            Self::Timeout(ms) => format!("request timed out after {ms}ms"),
            Self::Generation(_) => "generation failed".to_string(),
            Self::TunnelAuth(_) => "tunnel authentication failed".to_string(),
            Self::Cancelled => "request cancelled".to_string(),
            Self::Internal(_) => "internal error".to_string(),
            Self::Request(_) => "upstream request failed".to_string(),
        }
    }
}

impl IntoResponse for AggregatorError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");

        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RetrievalLeg { .. } => StatusCode::BAD_REQUEST,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Generation(_) => StatusCode::BAD_REQUEST,
            Self::TunnelAuth(_) => StatusCode::BAD_REQUEST,
            Self::Cancelled => return StatusCode::NO_CONTENT.into_response(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Request(_) => StatusCode::BAD_GATEWAY,
        };

        (status, Json(json!({ "error": self.user_message() }))).into_response()
    }
}
