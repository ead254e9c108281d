use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::clients::ModelClient;
use crate::correlation::RequestContext;
use crate::error::AggregatorError;
use crate::schemas::{GenerationResult, Message};

/// Thin wrapper around `ModelClient` translating transport errors into the domain's
/// `Generation` error kind.
pub struct GenerationService {
    client: Arc<ModelClient>,
}

impl GenerationService {
    pub fn new(client: Arc<ModelClient>) -> Self {
        GenerationService { client }
    }

    pub fn client_handle(&self) -> Arc<ModelClient> {
        Arc::clone(&self.client)
    }

    pub async fn generate(
        &self,
        url: &str,
        messages: &[Message],
        timeout: Duration,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<GenerationResult, AggregatorError> {
        self.client
            .chat(url, messages, timeout, auth, ctx)
            .await
            .map_err(|e| AggregatorError::Generation(e.user_message()))
    }

    /// Streams text chunks, dropping any empty fragments a peer might emit.
    pub async fn generate_stream(
        &self,
        url: &str,
        messages: &[Message],
        timeout: Duration,
        auth: Option<&str>,
        cancel: CancellationToken,
        ctx: &RequestContext,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<String, AggregatorError>> + Send>>, AggregatorError>
    {
        let stream = self
            .client
            .chat_stream(url, messages, timeout, auth, cancel, ctx)
            .await?;
        let filtered = stream.filter(|chunk| {
            let keep = !matches!(chunk, Ok(text) if text.is_empty());
            async move { keep }
        });
        Ok(Box::pin(filtered))
    }
}
