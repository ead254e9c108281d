use serde::{Deserialize, Serialize};

/// The tunnel protocol version this crate speaks. Bumped if the envelope shape
/// changes incompatibly.
pub const PROTOCOL_VERSION: u32 = 1;

/// Which peer-facing contract a tunneled call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointType {
    Model,
    DataSource,
}

/// Wire envelope carried over the tunnel bus for every request/reply pair.
///
/// Requests carry `sender_owner`/`target_owner`/`endpoint_slug`/`endpoint_type` so the
/// receiving peer can route the call without consulting anything but the envelope
/// itself; `deadline_ms` lets it give up early instead of working past a caller that's
/// already timed out. Replies reuse the same struct with the request-only fields left
/// at their defaults and `status`/`error_code` (unary and streamed) or
/// `chunk_index`/`final` (streamed only) populated instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelEnvelope {
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
    pub request_id: String,
    pub correlation_id: String,
    pub reply_to: String,
    #[serde(default)]
    pub sender_owner: String,
    #[serde(default)]
    pub target_owner: String,
    #[serde(default)]
    pub endpoint_slug: String,
    #[serde(default = "default_endpoint_type")]
    pub endpoint_type: EndpointType,
    pub operation: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub deadline_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u64>,
    #[serde(rename = "final", default, skip_serializing_if = "Option::is_none")]
    pub final_chunk: Option<bool>,
}

fn default_protocol_version() -> u32 {
    PROTOCOL_VERSION
}

fn default_endpoint_type() -> EndpointType {
    EndpointType::Model
}
