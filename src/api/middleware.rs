use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::Instrument;

use crate::correlation::RequestContext;

/// Tags every request with a `RequestContext`, derived from an inbound
/// `X-Correlation-Id` header or freshly minted otherwise, and wraps the rest of the
/// handler chain in a tracing span carrying it. Inserted into request extensions so
/// handlers can pull it out with `Extension<RequestContext>` instead of re-deriving it
/// from headers themselves.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok());
    let ctx = RequestContext::from_header(header);

    request.extensions_mut().insert(ctx.clone());

    let span = tracing::info_span!("request", correlation_id = %ctx.correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = ctx.correlation_id.parse() {
        response.headers_mut().insert("X-Correlation-Id", value);
    }
    response
}
