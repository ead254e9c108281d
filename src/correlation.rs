use uuid::Uuid;

/// Threaded explicitly through every call in a request's lifetime — retrieval,
/// generation, transport clients, tunnel envelopes — instead of relying on a
/// task-local or thread-local. Tags every tracing span and outbound envelope.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new() -> Self {
        RequestContext {
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(id) if !id.trim().is_empty() => RequestContext {
                correlation_id: id.to_string(),
            },
            _ => Self::new(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
