use axum::Json;
use axum::extract::State;
use serde_json::json;

use crate::api::state::AppState;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn ready(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ready",
        "service": state.config.service_name,
        "tunnel_enabled": state.config.transport_url.is_some(),
    }))
}
