use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::api::bearer_token;
use crate::api::state::AppState;
use crate::correlation::RequestContext;
use crate::error::AggregatorError;
use crate::schemas::ChatRequest;

pub async fn chat(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AggregatorError> {
    request
        .validate(state.config.max_top_k, state.config.max_data_sources)
        .map_err(AggregatorError::Validation)?;

    let auth = bearer_token(&headers);

    let response = state
        .orchestrator
        .process_chat(&request, auth.as_deref(), &ctx)
        .await?;

    Ok(Json(response))
}

pub async fn chat_stream(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    Json(mut request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AggregatorError> {
    request
        .validate(state.config.max_top_k, state.config.max_data_sources)
        .map_err(AggregatorError::Validation)?;
    request.stream = true;

    let auth = bearer_token(&headers);
    let cancel = CancellationToken::new();

    let events = state
        .orchestrator
        .process_chat_stream(request, auth, ctx, cancel.clone());

    let guarded = DropGuardStream {
        inner: events,
        _cancel_on_drop: cancel.drop_guard(),
    };

    let sse_events = guarded.map(|event| {
        let event_name = sse_event_name(&event);
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, Infallible>(Event::default().event(event_name).data(data))
    });

    let mut response = Sse::new(sse_events)
        .keep_alive(KeepAlive::default())
        .into_response();
    let response_headers = response.headers_mut();
    response_headers.insert("Cache-Control", "no-cache".parse().unwrap());
    response_headers.insert("Connection", "keep-alive".parse().unwrap());
    response_headers.insert("X-Accel-Buffering", "no".parse().unwrap());
    Ok(response)
}

fn sse_event_name(event: &crate::services::orchestrator::ChatEvent) -> &'static str {
    use crate::services::orchestrator::ChatEvent;
    match event {
        ChatEvent::RetrievalStart { .. } => "retrieval_start",
        ChatEvent::SourceComplete { .. } => "source_complete",
        ChatEvent::RetrievalComplete { .. } => "retrieval_complete",
        ChatEvent::GenerationStart {} => "generation_start",
        ChatEvent::Token { .. } => "token",
        ChatEvent::Done { .. } => "done",
        ChatEvent::Error { .. } => "error",
    }
}

/// Cancels the orchestrator's token when the SSE body is dropped — whether the stream
/// ran to completion or the client disconnected mid-stream.
struct DropGuardStream<S> {
    inner: S,
    _cancel_on_drop: tokio_util::sync::DropGuard,
}

impl<S: Stream + Unpin> Stream for DropGuardStream<S> {
    type Item = S::Item;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.inner).poll_next(cx)
    }
}
