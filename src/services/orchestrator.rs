use std::collections::BTreeMap;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::correlation::RequestContext;
use crate::error::AggregatorError;
use crate::schemas::{
    AggregatedContext, ChatRequest, ChatResponse, Document, ResponseMetadata, RetrievalResult,
    SourceEntry, SourceInfo,
};
use crate::services::{GenerationService, PromptBuilder, RetrievalService};

/// One event of the `/api/v1/chat/stream` SSE sequence. The ordered happy path is
/// `RetrievalStart`, zero or more `SourceComplete`, `RetrievalComplete`,
/// `GenerationStart`, zero or more `Token`, `Done`. Any prefix of that sequence may
/// instead terminate in `Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "retrieval_start")]
    RetrievalStart { sources: Vec<String> },
    #[serde(rename = "source_complete")]
    SourceComplete {
        source: String,
        status: String,
        documents: usize,
    },
    #[serde(rename = "retrieval_complete")]
    RetrievalComplete { total_documents: usize, time_ms: u64 },
    #[serde(rename = "generation_start")]
    GenerationStart {},
    #[serde(rename = "token")]
    Token { content: String },
    #[serde(rename = "done")]
    Done {
        sources: BTreeMap<String, SourceEntry>,
        retrieval_info: Vec<SourceInfo>,
        metadata: ResponseMetadata,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

pub struct Orchestrator {
    retrieval: RetrievalService,
    generation: GenerationService,
    retrieval_timeout: Duration,
    generation_timeout: Duration,
    total_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        retrieval: RetrievalService,
        generation: GenerationService,
        retrieval_timeout: Duration,
        generation_timeout: Duration,
        total_timeout: Duration,
    ) -> Self {
        Orchestrator {
            retrieval,
            generation,
            retrieval_timeout,
            generation_timeout,
            total_timeout,
        }
    }

    pub async fn process_chat(
        &self,
        request: &ChatRequest,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<ChatResponse, AggregatorError> {
        let start = Instant::now();

        let outcome = tokio::time::timeout(self.total_timeout, async {
            let context = self
                .retrieval
                .retrieve(
                    &request.data_sources,
                    &request.prompt,
                    request.top_k,
                    self.retrieval_timeout,
                    auth,
                    ctx,
                )
                .await;

            let messages =
                PromptBuilder::build(&request.prompt, Some(&context), request.system_prompt.as_deref());

            let generation_start = Instant::now();
            let result = self
                .generation
                .generate(&request.model.url, &messages, self.generation_timeout, auth, ctx)
                .await?;

            Ok::<_, AggregatorError>((context, result, generation_start.elapsed()))
        })
        .await
        .map_err(|_| AggregatorError::Timeout(self.total_timeout.as_millis() as u64))??;

        let (context, result, generation_elapsed) = outcome;
        Ok(build_chat_response(
            result.text,
            &context,
            context.total_time_ms,
            generation_elapsed.as_millis() as u64,
            start.elapsed().as_millis() as u64,
        ))
    }

    /// Drives the same pipeline as `process_chat` but emits progress as an event
    /// stream. `cancel` is the request-scoped token the caller tears down on client
    /// disconnect; every retrieval leg and the generation call observe it.
    pub fn process_chat_stream(
        &self,
        request: ChatRequest,
        auth: Option<String>,
        ctx: RequestContext,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Stream<Item = ChatEvent> + Send>> {
        let retrieval = self.retrieval.client_handle();
        let generation = self.generation.client_handle();
        let retrieval_timeout = self.retrieval_timeout;
        let generation_timeout = self.generation_timeout;

        let stream = async_stream::stream! {
            let retrieval_service = RetrievalService::new(retrieval);
            let generation_service = GenerationService::new(generation);

            let retrieval_start = Instant::now();
            let mut results: Vec<RetrievalResult> = Vec::with_capacity(request.data_sources.len());
            let mut documents: Vec<Document> = Vec::new();

            if !request.data_sources.is_empty() {
                let source_names: Vec<String> = request
                    .data_sources
                    .iter()
                    .map(|s| if s.name.is_empty() { s.url.clone() } else { s.name.clone() })
                    .collect();
                yield ChatEvent::RetrievalStart { sources: source_names };

                let mut leg_stream = Box::pin(retrieval_service.retrieve_streaming(
                    &request.data_sources,
                    &request.prompt,
                    request.top_k,
                    retrieval_timeout,
                    auth.as_deref(),
                    &ctx,
                ));

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            yield ChatEvent::Error { message: "request cancelled".to_string() };
                            return;
                        }
                        next = leg_stream.next() => {
                            match next {
                                Some(result) => {
                                    yield ChatEvent::SourceComplete {
                                        source: result.source.clone(),
                                        status: status_label(&result),
                                        documents: result.documents.len(),
                                    };
                                    if result.status == crate::schemas::RetrievalStatus::Success {
                                        documents.extend(result.documents.clone());
                                    }
                                    results.push(result);
                                }
                                None => break,
                            }
                        }
                    }
                }
            }

            documents.sort_by(|a, b| {
                b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
            });
            let retrieval_time_ms = retrieval_start.elapsed().as_millis() as u64;
            if !request.data_sources.is_empty() {
                yield ChatEvent::RetrievalComplete {
                    total_documents: documents.len(),
                    time_ms: retrieval_time_ms,
                };
            }

            let context = AggregatedContext {
                documents,
                results,
                total_time_ms: retrieval_time_ms,
            };
            let messages = PromptBuilder::build(
                &request.prompt,
                Some(&context),
                request.system_prompt.as_deref(),
            );

            yield ChatEvent::GenerationStart {};
            let generation_start = Instant::now();

            let chunk_stream = generation_service
                .generate_stream(
                    &request.model.url,
                    &messages,
                    generation_timeout,
                    auth.as_deref(),
                    cancel.clone(),
                    &ctx,
                )
                .await;

            let mut answer = String::new();
            match chunk_stream {
                Ok(mut chunks) => {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                yield ChatEvent::Error { message: "request cancelled".to_string() };
                                return;
                            }
                            next = chunks.next() => {
                                match next {
                                    Some(Ok(text)) => {
                                        answer.push_str(&text);
                                        yield ChatEvent::Token { content: text };
                                    }
                                    Some(Err(e)) => {
                                        yield ChatEvent::Error { message: e.user_message() };
                                        return;
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    yield ChatEvent::Error { message: e.user_message() };
                    return;
                }
            }

            let generation_time_ms = generation_start.elapsed().as_millis() as u64;
            let response = build_chat_response(
                answer,
                &context,
                retrieval_time_ms,
                generation_time_ms,
                retrieval_time_ms + generation_time_ms,
            );
            yield ChatEvent::Done {
                sources: response.sources,
                retrieval_info: response.retrieval_info,
                metadata: response.metadata,
            };
        };

        Box::pin(stream)
    }
}

fn status_label(result: &RetrievalResult) -> String {
    match result.status {
        crate::schemas::RetrievalStatus::Success => "success".to_string(),
        crate::schemas::RetrievalStatus::Error => "error".to_string(),
        crate::schemas::RetrievalStatus::Timeout => "timeout".to_string(),
    }
}

fn build_chat_response(
    answer: String,
    context: &AggregatedContext,
    retrieval_time_ms: u64,
    generation_time_ms: u64,
    total_time_ms: u64,
) -> ChatResponse {
    let mut sources = BTreeMap::new();
    for doc in &context.documents {
        let title = derive_title(doc);
        let slug = slugify(&title);
        sources.insert(title, SourceEntry {
            slug,
            content: doc.content.clone(),
        });
    }

    let retrieval_info = context
        .results
        .iter()
        .map(|r| SourceInfo {
            source: r.source.clone(),
            status: status_label(r),
            document_count: r.documents.len(),
            latency_ms: r.latency_ms,
            error: r.error.clone(),
        })
        .collect();

    ChatResponse {
        response: answer,
        sources,
        retrieval_info,
        metadata: ResponseMetadata {
            retrieval_time_ms,
            generation_time_ms,
            total_time_ms,
        },
        usage: None,
        profit_share: None,
    }
}

/// Explicit metadata `"title"` key wins; otherwise the first 60 characters of the
/// document's content stand in for a title.
fn derive_title(doc: &Document) -> String {
    if let Some(title) = doc.metadata.get("title").and_then(|v| v.as_str()) {
        return title.to_string();
    }
    doc.content.chars().take(60).collect()
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_was_dash = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    slug.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_falls_back_to_content_prefix() {
        let doc = Document {
            content: "a very long piece of content that exceeds sixty characters in length".to_string(),
            score: 1.0,
            metadata: serde_json::Map::new(),
        };
        let title = derive_title(&doc);
        assert_eq!(title.chars().count(), 60);
    }

    #[test]
    fn title_prefers_metadata() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("title".to_string(), serde_json::json!("FAQ"));
        let doc = Document {
            content: "irrelevant".to_string(),
            score: 1.0,
            metadata,
        };
        assert_eq!(derive_title(&doc), "FAQ");
    }

    #[test]
    fn slugify_normalizes_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
    }
}
