pub mod chat;
pub mod health;
pub mod middleware;
pub mod mq_routes;
pub mod state;
pub mod tunnel_http;

use axum::Router;
use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

pub fn router(state: AppState) -> Router {
    let cors = build_cors(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/api/v1/chat", post(chat::chat))
        .route("/api/v1/chat/stream", post(chat::chat_stream))
        .route("/api/v1/peer-token", post(tunnel_http::mint_peer_token))
        .route("/api/v1/nats/credentials", get(tunnel_http::nats_credentials))
        .route("/mq/reserve", post(mq_routes::reserve))
        .route("/mq/consume", post(mq_routes::consume))
        .route("/mq/peek", post(mq_routes::peek))
        .route("/mq/release", post(mq_routes::release))
        .route("/mq/clear", delete(mq_routes::clear))
        .layer(axum::middleware::from_fn(middleware::correlation_id))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(AllowOrigin::any());
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(parsed)
}
