use std::sync::Arc;

use crate::config::Config;
use crate::mq::ReservedQueueBroker;
use crate::services::Orchestrator;
use crate::tunnel::PeerTokenAuthority;

/// The composition root's output: every shared, process-wide resource, constructed
/// once in `main` and cloned cheaply (everything inside is an `Arc` or `Clone`-cheap)
/// into each request's handler. Tunnel connections themselves live inside the peer
/// clients (`DataSourceClient`/`ModelClient`), minted per call via `TunnelClient` —
/// `AppState` only needs the authority to serve `/api/v1/peer-token`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Arc<Orchestrator>,
    pub peer_tokens: Arc<PeerTokenAuthority>,
    pub reserved_queues: Arc<ReservedQueueBroker>,
}
