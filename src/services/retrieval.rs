use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::Stream;
use tokio::task::JoinSet;

use crate::clients::DataSourceClient;
use crate::correlation::RequestContext;
use crate::schemas::{AggregatedContext, EndpointRef, RetrievalResult, RetrievalStatus};

/// Fans out a query to every configured data source and aggregates whatever legs
/// succeed. No single failing source fails the request — each leg reports its own
/// status instead of raising.
pub struct RetrievalService {
    client: Arc<DataSourceClient>,
}

impl RetrievalService {
    pub fn new(client: Arc<DataSourceClient>) -> Self {
        RetrievalService { client }
    }

    pub fn client_handle(&self) -> Arc<DataSourceClient> {
        Arc::clone(&self.client)
    }

    pub async fn retrieve(
        &self,
        sources: &[EndpointRef],
        query: &str,
        top_k: u32,
        timeout: Duration,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> AggregatedContext {
        if sources.is_empty() {
            return AggregatedContext::empty();
        }

        let start = Instant::now();
        let mut set: JoinSet<RetrievalResult> = JoinSet::new();

        for source in sources {
            let client = Arc::clone(&self.client);
            let url = source.url.clone();
            let name = if source.name.is_empty() {
                source.url.clone()
            } else {
                source.name.clone()
            };
            let query = query.to_string();
            let auth = auth.map(str::to_string);
            let ctx = ctx.clone();

            set.spawn(async move {
                run_leg(&client, &url, &name, &query, top_k, timeout, auth.as_deref(), &ctx).await
            });
        }

        let mut results = Vec::with_capacity(sources.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => results.push(RetrievalResult {
                    source: "unknown".to_string(),
                    status: RetrievalStatus::Error,
                    documents: Vec::new(),
                    error: Some(format!("retrieval task panicked: {e}")),
                    latency_ms: 0,
                }),
            }
        }

        let mut documents: Vec<_> = results
            .iter()
            .filter(|r| r.status == RetrievalStatus::Success)
            .flat_map(|r| r.documents.clone())
            .collect();
        documents.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        AggregatedContext {
            documents,
            results,
            total_time_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Yields one `RetrievalResult` per data source as it completes, in completion
    /// order rather than request order — used to drive the `source_complete` SSE
    /// events as soon as each leg finishes.
    pub fn retrieve_streaming(
        &self,
        sources: &[EndpointRef],
        query: &str,
        top_k: u32,
        timeout: Duration,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> impl Stream<Item = RetrievalResult> + Send + 'static {
        let client = Arc::clone(&self.client);
        let sources = sources.to_vec();
        let query = query.to_string();
        let auth = auth.map(str::to_string);
        let ctx = ctx.clone();

        async_stream::stream! {
            let mut set: JoinSet<RetrievalResult> = JoinSet::new();
            for source in &sources {
                let client = Arc::clone(&client);
                let url = source.url.clone();
                let name = if source.name.is_empty() { source.url.clone() } else { source.name.clone() };
                let query = query.clone();
                let auth = auth.clone();
                let ctx = ctx.clone();
                set.spawn(async move {
                    run_leg(&client, &url, &name, &query, top_k, timeout, auth.as_deref(), &ctx).await
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(result) => yield result,
                    Err(e) => yield RetrievalResult {
                        source: "unknown".to_string(),
                        status: RetrievalStatus::Error,
                        documents: Vec::new(),
                        error: Some(format!("retrieval task panicked: {e}")),
                        latency_ms: 0,
                    },
                }
            }
        }
    }
}

async fn run_leg(
    client: &DataSourceClient,
    url: &str,
    name: &str,
    query: &str,
    top_k: u32,
    timeout: Duration,
    auth: Option<&str>,
    ctx: &RequestContext,
) -> RetrievalResult {
    let start = Instant::now();
    match client.query(url, query, top_k, timeout, auth, ctx).await {
        Ok(documents) => RetrievalResult {
            source: name.to_string(),
            status: RetrievalStatus::Success,
            documents,
            error: None,
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(crate::error::AggregatorError::Timeout(_)) => RetrievalResult {
            source: name.to_string(),
            status: RetrievalStatus::Timeout,
            documents: Vec::new(),
            error: Some("retrieval timed out".to_string()),
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => RetrievalResult {
            source: name.to_string(),
            status: RetrievalStatus::Error,
            documents: Vec::new(),
            error: Some(e.user_message()),
            latency_ms: start.elapsed().as_millis() as u64,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sources_short_circuit() {
        let aggregated = AggregatedContext::empty();
        assert!(aggregated.documents.is_empty());
        assert!(aggregated.results.is_empty());
    }
}
