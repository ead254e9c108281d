use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use serde_json::Value;
use uuid::Uuid;

use crate::correlation::RequestContext;
use crate::error::AggregatorError;
use crate::tunnel::envelope::{EndpointType, TunnelEnvelope};

/// Thin wrapper over an `async_nats::Client` implementing the request/reply pattern
/// used to reach peers that only expose a pub/sub inbox, not a public HTTP endpoint.
#[derive(Clone)]
pub struct TunnelBus {
    client: async_nats::Client,
}

impl TunnelBus {
    pub async fn connect(url: &str, auth_token: Option<&str>) -> Result<Self, AggregatorError> {
        let mut options = async_nats::ConnectOptions::new();
        if let Some(token) = auth_token {
            options = options.token(token.to_string());
        }
        let client = options
            .connect(url)
            .await
            .map_err(|e| AggregatorError::TunnelAuth(format!("failed to connect to bus: {e}")))?;
        Ok(TunnelBus { client })
    }

    /// Publishes `payload` to `target_owner`'s inbox subject and awaits exactly one
    /// reply on `peer_channel`, correlated by `request_id`. `peer_channel` comes from a
    /// PeerToken minted by the caller — the bus never generates its own reply subject.
    #[allow(clippy::too_many_arguments)]
    pub async fn request(
        &self,
        peer_channel: &str,
        target_owner: &str,
        sender_owner: &str,
        endpoint_type: EndpointType,
        endpoint_slug: &str,
        payload: Value,
        timeout: Duration,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Value, AggregatorError> {
        let request_id = Uuid::new_v4().to_string();

        let mut subscriber = self
            .client
            .subscribe(peer_channel.to_string())
            .await
            .map_err(|e| AggregatorError::Internal(format!("tunnel subscribe failed: {e}")))?;

        let envelope = TunnelEnvelope {
            protocol_version: crate::tunnel::envelope::PROTOCOL_VERSION,
            request_id: request_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            reply_to: peer_channel.to_string(),
            sender_owner: sender_owner.to_string(),
            target_owner: target_owner.to_string(),
            endpoint_slug: endpoint_slug.to_string(),
            endpoint_type,
            operation: endpoint_slug.to_string(),
            payload,
            auth: auth.map(str::to_string),
            deadline_ms: timeout.as_millis() as u64,
            status: None,
            error_code: None,
            chunk_index: None,
            final_chunk: None,
        };

        self.publish(target_owner, &envelope).await?;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(AggregatorError::Timeout(timeout.as_millis() as u64));
                }
                message = subscriber.next() => {
                    let message = message.ok_or_else(|| {
                        AggregatorError::Internal("tunnel reply subject closed".to_string())
                    })?;
                    let reply: TunnelEnvelope = serde_json::from_slice(&message.payload)
                        .map_err(|e| AggregatorError::Internal(format!("malformed tunnel reply: {e}")))?;
                    if reply.request_id != request_id {
                        continue;
                    }
                    if let Some(status) = &reply.status {
                        if status != "ok" {
                            return Err(AggregatorError::Generation(
                                reply.error_code.unwrap_or_else(|| status.clone()),
                            ));
                        }
                    }
                    return Ok(reply.payload);
                }
            }
        }
    }

    /// Same dispatch as `request`, but collates a streamed reply: the peer sends one
    /// envelope per chunk with ascending `chunk_index`, terminated by an envelope with
    /// `final=true`. Chunks are buffered out of order and released in order.
    #[allow(clippy::too_many_arguments)]
    pub fn request_stream(
        &self,
        peer_channel: String,
        target_owner: String,
        sender_owner: String,
        endpoint_type: EndpointType,
        endpoint_slug: String,
        payload: Value,
        timeout: Duration,
        auth: Option<String>,
        ctx: RequestContext,
    ) -> impl Stream<Item = Result<Value, AggregatorError>> + Send + 'static {
        let client = self.client.clone();

        async_stream::stream! {
            let request_id = Uuid::new_v4().to_string();

            let mut subscriber = match client.subscribe(peer_channel.clone()).await {
                Ok(s) => s,
                Err(e) => {
                    yield Err(AggregatorError::Internal(format!("tunnel subscribe failed: {e}")));
                    return;
                }
            };

            let envelope = TunnelEnvelope {
                protocol_version: crate::tunnel::envelope::PROTOCOL_VERSION,
                request_id: request_id.clone(),
                correlation_id: ctx.correlation_id.clone(),
                reply_to: peer_channel.clone(),
                sender_owner,
                target_owner: target_owner.clone(),
                endpoint_slug: endpoint_slug.clone(),
                endpoint_type,
                operation: endpoint_slug,
                payload,
                auth,
                deadline_ms: timeout.as_millis() as u64,
                status: None,
                error_code: None,
                chunk_index: None,
                final_chunk: None,
            };

            let encoded = match serde_json::to_vec(&envelope) {
                Ok(b) => b,
                Err(e) => {
                    yield Err(AggregatorError::Internal(format!("failed to encode envelope: {e}")));
                    return;
                }
            };
            if let Err(e) = client.publish(format!("peer.{target_owner}.inbox"), encoded.into()).await {
                yield Err(AggregatorError::Internal(format!("tunnel publish failed: {e}")));
                return;
            }

            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            let mut pending: BTreeMap<u64, Value> = BTreeMap::new();
            let mut next_index = 0u64;
            let mut saw_final_at: Option<u64> = None;

            loop {
                tokio::select! {
                    _ = &mut deadline => {
                        yield Err(AggregatorError::Timeout(timeout.as_millis() as u64));
                        return;
                    }
                    message = subscriber.next() => {
                        let message = match message {
                            Some(m) => m,
                            None => return,
                        };
                        let reply: TunnelEnvelope = match serde_json::from_slice(&message.payload) {
                            Ok(r) => r,
                            Err(e) => {
                                yield Err(AggregatorError::Internal(format!("malformed tunnel reply: {e}")));
                                return;
                            }
                        };
                        if reply.request_id != request_id {
                            continue;
                        }
                        if let Some(status) = &reply.status {
                            if status != "ok" {
                                yield Err(AggregatorError::Generation(
                                    reply.error_code.unwrap_or_else(|| status.clone()),
                                ));
                                return;
                            }
                        }

                        let index = reply.chunk_index.unwrap_or(next_index);
                        if reply.final_chunk == Some(true) {
                            saw_final_at = Some(index);
                        }
                        pending.insert(index, reply.payload);

                        while let Some(value) = pending.remove(&next_index) {
                            yield Ok(value);
                            let delivered = next_index;
                            next_index += 1;
                            if saw_final_at == Some(delivered) {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn publish(&self, target_owner: &str, envelope: &TunnelEnvelope) -> Result<(), AggregatorError> {
        let encoded = serde_json::to_vec(envelope)
            .map_err(|e| AggregatorError::Internal(format!("failed to encode envelope: {e}")))?;
        self.client
            .publish(format!("peer.{target_owner}.inbox"), encoded.into())
            .await
            .map_err(|e| AggregatorError::Internal(format!("tunnel publish failed: {e}")))
    }
}
