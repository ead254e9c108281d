use std::pin::Pin;
use std::time::{Duration, Instant};

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::clients::http::read_body_capped;
use crate::clients::{extract_tunnel_owner, is_tunneled_url};
use crate::correlation::RequestContext;
use crate::error::AggregatorError;
use crate::schemas::{ChatCompletionRequest, ChatCompletionResponse, GenerationResult, Message};
use crate::tunnel::TunnelClient;
use crate::tunnel::envelope::EndpointType;

/// Caps accumulated response text to guard against a runaway or malicious peer.
pub const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

/// How long to wait for a chunk before declaring the stream stalled.
const STALL_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct StreamChunk {
    content: Option<String>,
}

enum ParsedChunk {
    Text(String),
    Done,
    Skip,
}

fn parse_event(data: &str) -> ParsedChunk {
    if data.trim() == "[DONE]" {
        return ParsedChunk::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => match chunk.content {
            Some(text) if !text.is_empty() => ParsedChunk::Text(text),
            _ => ParsedChunk::Skip,
        },
        Err(_) => ParsedChunk::Skip,
    }
}

/// Queries a model peer: a unary `/chat` call or a `/chat/stream` SSE call, over plain
/// HTTP or the tunnel bus depending on the endpoint URL.
pub struct ModelClient {
    http: Client,
    tunnel: Option<TunnelClient>,
}

impl ModelClient {
    pub fn new(http: Client, tunnel: Option<TunnelClient>) -> Self {
        ModelClient { http, tunnel }
    }

    pub async fn chat(
        &self,
        url: &str,
        messages: &[Message],
        timeout: Duration,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<GenerationResult, AggregatorError> {
        let request = ChatCompletionRequest {
            messages: messages.to_vec(),
            stream: false,
        };

        if is_tunneled_url(url) {
            let owner = extract_tunnel_owner(url).ok_or_else(|| {
                AggregatorError::Internal(format!("malformed tunnel url: {url}"))
            })?;
            let tunnel = self.tunnel.as_ref().ok_or_else(|| {
                AggregatorError::Internal("tunnel subsystem not configured".to_string())
            })?;
            let body = serde_json::to_value(&request).map_err(|e| {
                AggregatorError::Internal(format!("failed to encode chat request: {e}"))
            })?;
            let reply = tunnel
                .request(owner, EndpointType::Model, "chat", body, timeout, auth, ctx)
                .await?;
            let completion: ChatCompletionResponse = serde_json::from_value(reply)
                .map_err(|e| AggregatorError::Generation(format!("malformed chat completion: {e}")))?;
            return Ok(GenerationResult {
                text: completion.message.content,
                usage: completion.usage.and_then(|u| serde_json::to_value(u).ok()),
            });
        }

        let endpoint = format!("{}/chat", url.trim_end_matches('/'));
        let mut builder = self.http.post(&endpoint).json(&request);
        if let Some(token) = auth {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let mut response = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| AggregatorError::Timeout(timeout.as_millis() as u64))?
            .map_err(AggregatorError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_body_capped(&mut response, 200).await;
            let text = String::from_utf8_lossy(&body);
            return Err(AggregatorError::Generation(format!(
                "HTTP {}: {text}",
                status.as_u16()
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(AggregatorError::from)?;
        Ok(GenerationResult {
            text: completion.message.content,
            usage: completion.usage.and_then(|u| serde_json::to_value(u).ok()),
        })
    }

    /// Streams generated text as a sequence of plain-text chunks, regardless of the
    /// peer's wire framing. Cancellation closes the underlying connection.
    pub async fn chat_stream(
        &self,
        url: &str,
        messages: &[Message],
        timeout: Duration,
        auth: Option<&str>,
        cancel: CancellationToken,
        ctx: &RequestContext,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, AggregatorError>> + Send>>, AggregatorError>
    {
        if is_tunneled_url(url) {
            let owner = extract_tunnel_owner(url).ok_or_else(|| {
                AggregatorError::Internal(format!("malformed tunnel url: {url}"))
            })?;
            let tunnel = self.tunnel.as_ref().ok_or_else(|| {
                AggregatorError::Internal("tunnel subsystem not configured".to_string())
            })?;
            let body = serde_json::to_value(&ChatCompletionRequest {
                messages: messages.to_vec(),
                stream: true,
            })
            .map_err(|e| AggregatorError::Internal(format!("failed to encode chat request: {e}")))?;

            let chunks = tunnel.request_stream(
                owner.to_string(),
                EndpointType::Model,
                "chat".to_string(),
                body,
                timeout,
                auth.map(str::to_string),
                cancel,
                ctx.clone(),
            );

            let text_chunks = chunks.map(|result| {
                result.map(|value| {
                    value
                        .get("content")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                })
            });
            return Ok(Box::pin(text_chunks));
        }

        let request = ChatCompletionRequest {
            messages: messages.to_vec(),
            stream: true,
        };
        let endpoint = format!("{}/chat/stream", url.trim_end_matches('/'));
        let mut builder = self.http.post(&endpoint).json(&request);
        if let Some(token) = auth {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let start = Instant::now();
        let response = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| AggregatorError::Timeout(timeout.as_millis() as u64))?
            .map_err(AggregatorError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AggregatorError::Generation(format!(
                "HTTP {} from model peer",
                status.as_u16()
            )));
        }

        let remaining = timeout
            .checked_sub(start.elapsed())
            .unwrap_or(Duration::ZERO);
        let generation_deadline = tokio::time::Instant::now() + remaining;

        let stream = async_stream::stream! {
            let mut source = response.bytes_stream().eventsource();
            let mut total = 0usize;
            let mut last_chunk_at = tokio::time::Instant::now();
            let deadline_sleep = tokio::time::sleep_until(generation_deadline);
            tokio::pin!(deadline_sleep);

            loop {
                let effective_deadline = generation_deadline.min(last_chunk_at + STALL_TIMEOUT);
                deadline_sleep.as_mut().reset(effective_deadline);

                tokio::select! {
                    _ = cancel.cancelled() => {
                        yield Err(AggregatorError::Cancelled);
                        return;
                    }
                    _ = &mut deadline_sleep => {
                        yield Err(AggregatorError::Timeout(start.elapsed().as_millis() as u64));
                        return;
                    }
                    event = source.next() => match event {
                        Some(Ok(ev)) => match parse_event(&ev.data) {
                            ParsedChunk::Done => return,
                            ParsedChunk::Text(text) => {
                                last_chunk_at = tokio::time::Instant::now();
                                total += text.len();
                                if total > MAX_RESPONSE_BYTES {
                                    yield Err(AggregatorError::Generation(
                                        "streaming response too large".to_string(),
                                    ));
                                    return;
                                }
                                yield Ok(text);
                            }
                            ParsedChunk::Skip => {
                                last_chunk_at = tokio::time::Instant::now();
                            }
                        },
                        Some(Err(e)) => {
                            yield Err(AggregatorError::Generation(format!("stream error: {e}")));
                            return;
                        }
                        None => return,
                    },
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_done_sentinel() {
        assert!(matches!(parse_event("[DONE]"), ParsedChunk::Done));
    }

    #[test]
    fn parses_content_chunk() {
        match parse_event(r#"{"content": "hi"}"#) {
            ParsedChunk::Text(t) => assert_eq!(t, "hi"),
            _ => panic!("expected text"),
        }
    }

    #[test]
    fn skips_empty_content() {
        assert!(matches!(parse_event(r#"{"content": ""}"#), ParsedChunk::Skip));
    }
}
