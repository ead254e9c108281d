use axum::Json;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::bearer_token;
use crate::api::state::AppState;
use crate::error::AggregatorError;

#[derive(Debug, Deserialize)]
pub struct MintPeerTokenRequest {
    pub target_usernames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PeerTokenResponse {
    pub peer_token: String,
    pub peer_channel: String,
    pub expires_in: u64,
    pub transport_url: String,
}

pub async fn mint_peer_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MintPeerTokenRequest>,
) -> Result<impl IntoResponse, AggregatorError> {
    if request.target_usernames.is_empty() {
        return Err(AggregatorError::Validation(
            "target_usernames must not be empty".to_string(),
        ));
    }
    if request.target_usernames.iter().any(|o| o.trim().is_empty()) {
        return Err(AggregatorError::Validation(
            "target_usernames must not contain empty entries".to_string(),
        ));
    }

    // Identity/user accounts are out of scope here; the forwarded bearer token stands
    // in as an opaque user id for the minted token's audit trail.
    let user_id = bearer_token(&headers).unwrap_or_else(|| "anonymous".to_string());

    let token = state.peer_tokens.mint(&user_id, &request.target_usernames);
    Ok(Json(PeerTokenResponse {
        peer_token: token.token,
        peer_channel: token.peer_channel,
        expires_in: token.expires_in,
        transport_url: token.transport_url,
    }))
}

pub async fn nats_credentials(State(state): State<AppState>) -> impl IntoResponse {
    match &state.config.transport_auth {
        Some(token) => Json(json!({ "nats_auth_token": token })).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "tunnel transport is not configured" })),
        )
            .into_response(),
    }
}
