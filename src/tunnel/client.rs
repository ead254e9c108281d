use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::correlation::RequestContext;
use crate::error::AggregatorError;
use crate::tunnel::authority::PeerTokenAuthority;
use crate::tunnel::bus::TunnelBus;
use crate::tunnel::envelope::EndpointType;

/// Drives spec step 2-6 of a tunneled call: mint a fresh PeerToken scoped to the
/// target owner, reuse (or open) a bus connection for that token's transport, publish
/// through it, and collate the reply. One `TunnelClient` is shared by both
/// `DataSourceClient` and `ModelClient`.
#[derive(Clone)]
pub struct TunnelClient {
    authority: Arc<PeerTokenAuthority>,
    connections: moka::sync::Cache<String, TunnelBus>,
    sender_owner: String,
}

impl TunnelClient {
    pub fn new(authority: Arc<PeerTokenAuthority>, sender_owner: String) -> Self {
        TunnelClient {
            authority,
            connections: moka::sync::Cache::builder()
                .time_to_live(Duration::from_secs(3600))
                .build(),
            sender_owner,
        }
    }

    async fn bus_for(&self, transport_url: &str, transport_auth: Option<&str>) -> Result<TunnelBus, AggregatorError> {
        let key = format!("{transport_url}|{}", transport_auth.unwrap_or(""));
        if let Some(bus) = self.connections.get(&key) {
            return Ok(bus);
        }
        let bus = TunnelBus::connect(transport_url, transport_auth).await?;
        self.connections.insert(key, bus.clone());
        Ok(bus)
    }

    /// Unary tunneled request: mints a token scoped to `target_owner`, connects to its
    /// transport, and awaits one reply.
    #[allow(clippy::too_many_arguments)]
    pub async fn request(
        &self,
        target_owner: &str,
        endpoint_type: EndpointType,
        endpoint_slug: &str,
        payload: Value,
        timeout: Duration,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Value, AggregatorError> {
        let token = self
            .authority
            .mint(&self.sender_owner, &[target_owner.to_string()]);
        let bus = self
            .bus_for(&token.transport_url, token.transport_auth.as_deref())
            .await?;
        bus.request(
            &token.peer_channel,
            target_owner,
            &self.sender_owner,
            endpoint_type,
            endpoint_slug,
            payload,
            timeout,
            auth,
            ctx,
        )
        .await
    }

    /// Streamed tunneled request, guarded by `cancel` the same way plain-HTTP
    /// streaming is.
    #[allow(clippy::too_many_arguments)]
    pub fn request_stream(
        &self,
        target_owner: String,
        endpoint_type: EndpointType,
        endpoint_slug: String,
        payload: Value,
        timeout: Duration,
        auth: Option<String>,
        cancel: CancellationToken,
        ctx: RequestContext,
    ) -> impl Stream<Item = Result<Value, AggregatorError>> + Send + 'static {
        let this = self.clone();

        async_stream::stream! {
            let token = this
                .authority
                .mint(&this.sender_owner, &[target_owner.clone()]);
            let bus = match this.bus_for(&token.transport_url, token.transport_auth.as_deref()).await {
                Ok(bus) => bus,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let inner = bus.request_stream(
                token.peer_channel,
                target_owner,
                this.sender_owner.clone(),
                endpoint_type,
                endpoint_slug,
                payload,
                timeout,
                auth,
                ctx,
            );
            tokio::pin!(inner);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        yield Err(AggregatorError::Cancelled);
                        return;
                    }
                    next = inner.next() => match next {
                        Some(item) => yield item,
                        None => return,
                    }
                }
            }
        }
    }
}
