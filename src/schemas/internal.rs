use serde::{Deserialize, Serialize};

use crate::schemas::requests::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStatus {
    Success,
    Error,
    Timeout,
}

/// Outcome of querying a single data source, including failure — a leg never raises,
/// it reports. The aggregate continues with whatever legs succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub source: String,
    pub status: RetrievalStatus,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// All per-source results merged and sorted by score, descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedContext {
    pub documents: Vec<Document>,
    pub results: Vec<RetrievalResult>,
    pub total_time_ms: u64,
}

impl AggregatedContext {
    pub fn empty() -> Self {
        AggregatedContext {
            documents: Vec::new(),
            results: Vec::new(),
            total_time_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEndpoint {
    pub url: String,
    pub name: String,
    pub tunneled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    #[serde(default)]
    pub usage: Option<serde_json::Value>,
}
