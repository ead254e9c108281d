use serde::{Deserialize, Serialize};

/// A reference to a peer endpoint: either a plain HTTPS URL or a `tunneling:<owner>`
/// pseudo-URL routed over the tunnel bus instead of direct HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRef {
    pub url: String,
    #[serde(default)]
    pub name: String,
}

fn default_top_k() -> u32 {
    5
}

/// Incoming chat request. `prompt` must be non-empty; `top_k` is clamped to
/// `[1, max_top_k]` by the caller before it reaches the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub data_sources: Vec<EndpointRef>,
    pub model: EndpointRef,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn validate(&self, max_top_k: u32, max_data_sources: usize) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        if self.top_k < 1 || self.top_k > max_top_k {
            return Err(format!("top_k must be between 1 and {max_top_k}"));
        }
        if self.data_sources.len() > max_data_sources {
            return Err(format!("at most {max_data_sources} data sources are allowed"));
        }
        Ok(())
    }
}

/// A single retrieved document, as returned by a data source peer's `/query` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
}
