use axum::Json;
use axum::extract::State;

use crate::api::state::AppState;
use crate::error::AggregatorError;
use crate::mq::schema::{
    ClearQueueRequest, ClearQueueResponse, ConsumeRequest, ConsumeResponse, PeekRequest,
    PeekResponse, ReleaseQueueRequest, ReleaseQueueResponse, ReserveQueueRequest,
    ReserveQueueResponse,
};

pub async fn reserve(
    State(state): State<AppState>,
    Json(request): Json<ReserveQueueRequest>,
) -> Json<ReserveQueueResponse> {
    let ttl = request.clamped_ttl();
    let (queue_id, token, expires_at) = state.reserved_queues.reserve(ttl, &request.owner_username);
    Json(ReserveQueueResponse {
        queue_id,
        token,
        expires_at,
        owner_username: request.owner_username,
    })
}

pub async fn consume(
    State(state): State<AppState>,
    Json(request): Json<ConsumeRequest>,
) -> Result<Json<ConsumeResponse>, AggregatorError> {
    let limit = request.clamped_limit();
    let (messages, remaining) = state
        .reserved_queues
        .consume(&request.queue_id, &request.token, limit)?;
    Ok(Json(ConsumeResponse { messages, remaining }))
}

pub async fn peek(
    State(state): State<AppState>,
    Json(request): Json<PeekRequest>,
) -> Json<PeekResponse> {
    let limit = request.clamped_limit();
    let (messages, total) = state.reserved_queues.peek(&request.owner_username, limit);
    Json(PeekResponse { messages, total })
}

pub async fn release(
    State(state): State<AppState>,
    Json(request): Json<ReleaseQueueRequest>,
) -> Result<Json<ReleaseQueueResponse>, AggregatorError> {
    let cleared = state
        .reserved_queues
        .release(&request.queue_id, &request.token)?;
    Ok(Json(ReleaseQueueResponse {
        status: "released".to_string(),
        cleared,
        queue_id: request.queue_id,
    }))
}

pub async fn clear(
    State(state): State<AppState>,
    Json(request): Json<ClearQueueRequest>,
) -> Json<ClearQueueResponse> {
    let cleared = state.reserved_queues.clear(&request.owner_username);
    Json(ClearQueueResponse {
        status: "cleared".to_string(),
        cleared,
    })
}
