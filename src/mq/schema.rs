use serde::{Deserialize, Serialize};

fn default_ttl_seconds() -> u64 {
    300
}

fn default_owner() -> String {
    "anonymous".to_string()
}

fn default_consume_limit() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveQueueRequest {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_owner")]
    pub owner_username: String,
}

impl ReserveQueueRequest {
    pub fn clamped_ttl(&self) -> u64 {
        self.ttl_seconds.clamp(60, 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveQueueResponse {
    pub queue_id: String,
    pub token: String,
    pub expires_at: u64,
    pub owner_username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub queue_id: String,
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    pub status: String,
}

/// One queued item, as handed back by consume/peek.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub message: serde_json::Value,
    pub queued_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeRequest {
    pub queue_id: String,
    pub token: String,
    #[serde(default = "default_consume_limit")]
    pub limit: u64,
}

impl ConsumeRequest {
    pub fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, 100) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumeResponse {
    pub messages: Vec<QueuedMessage>,
    pub remaining: usize,
}

/// Owner-authenticated, non-destructive: no bearer token involved, unlike consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeekRequest {
    pub owner_username: String,
    #[serde(default = "default_consume_limit")]
    pub limit: u64,
}

impl PeekRequest {
    pub fn clamped_limit(&self) -> usize {
        self.limit.clamp(1, 100) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeekResponse {
    pub messages: Vec<QueuedMessage>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseQueueRequest {
    pub queue_id: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseQueueResponse {
    pub status: String,
    pub cleared: usize,
    pub queue_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearQueueRequest {
    pub owner_username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearQueueResponse {
    pub status: String,
    pub cleared: usize,
}
