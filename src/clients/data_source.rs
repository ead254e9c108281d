use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::clients::http::read_body_capped;
use crate::clients::{extract_tunnel_owner, is_tunneled_url};
use crate::correlation::RequestContext;
use crate::error::AggregatorError;
use crate::schemas::Document;
use crate::tunnel::TunnelClient;
use crate::tunnel::envelope::EndpointType;

/// Queries a single data-source peer's `/query` endpoint, over plain HTTP or the
/// tunnel bus depending on the endpoint URL.
pub struct DataSourceClient {
    http: Client,
    tunnel: Option<TunnelClient>,
}

impl DataSourceClient {
    pub fn new(http: Client, tunnel: Option<TunnelClient>) -> Self {
        DataSourceClient { http, tunnel }
    }

    pub async fn query(
        &self,
        url: &str,
        query: &str,
        top_k: u32,
        timeout: Duration,
        auth: Option<&str>,
        ctx: &RequestContext,
    ) -> Result<Vec<Document>, AggregatorError> {
        if is_tunneled_url(url) {
            let owner = extract_tunnel_owner(url).ok_or_else(|| {
                AggregatorError::Internal(format!("malformed tunnel url: {url}"))
            })?;
            let tunnel = self.tunnel.as_ref().ok_or_else(|| {
                AggregatorError::Internal("tunnel subsystem not configured".to_string())
            })?;
            let body = serde_json::json!({ "query": query, "top_k": top_k });
            let reply = tunnel
                .request(owner, EndpointType::DataSource, "query", body, timeout, auth, ctx)
                .await?;
            return parse_documents_from_value(&reply);
        }

        let endpoint = format!("{}/query", url.trim_end_matches('/'));
        let mut request = self
            .http
            .post(&endpoint)
            .json(&serde_json::json!({ "query": query, "top_k": top_k }));
        if let Some(token) = auth {
            request = request.header("Authorization", format!("Bearer {token}"));
        }

        let mut response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| AggregatorError::Timeout(timeout.as_millis() as u64))?
            .map_err(AggregatorError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = read_body_capped(&mut response, 200).await;
            let text = String::from_utf8_lossy(&body);
            return Err(AggregatorError::RetrievalLeg {
                source: url.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), text),
            });
        }

        let payload: Value = response.json().await.map_err(AggregatorError::from)?;
        parse_documents_from_value(&payload)
    }
}

/// Accepts either `{"documents": [...]}` or a bare array, and coerces bare-string
/// entries into a zero-score document with no metadata.
fn parse_documents_from_value(value: &Value) -> Result<Vec<Document>, AggregatorError> {
    let raw = value
        .get("documents")
        .cloned()
        .unwrap_or_else(|| value.clone());

    let Value::Array(items) = raw else {
        return Err(AggregatorError::RetrievalLeg {
            source: "unknown".to_string(),
            message: "response was not a list of documents".to_string(),
        });
    };

    let mut documents = Vec::with_capacity(items.len());
    for item in items {
        let doc = match item {
            Value::String(s) => Document {
                content: s,
                score: 0.0,
                metadata: serde_json::Map::new(),
            },
            other => serde_json::from_value(other).map_err(|e| AggregatorError::RetrievalLeg {
                source: "unknown".to_string(),
                message: format!("malformed document: {e}"),
            })?,
        };
        documents.push(doc);
    }
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_string_document_coerces() {
        let value = serde_json::json!({ "documents": ["hello world"] });
        let docs = parse_documents_from_value(&value).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "hello world");
        assert_eq!(docs[0].score, 0.0);
        assert!(docs[0].metadata.is_empty());
    }

    #[test]
    fn structured_document_parses() {
        let value = serde_json::json!({
            "documents": [{"content": "c", "score": 0.8, "metadata": {"k": "v"}}]
        });
        let docs = parse_documents_from_value(&value).unwrap();
        assert_eq!(docs[0].score, 0.8);
        assert_eq!(docs[0].metadata.get("k").unwrap(), "v");
    }
}
