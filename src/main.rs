use std::sync::Arc;
use std::time::Duration;

use aggregator::api::{self, AppState};
use aggregator::clients::http::build_client;
use aggregator::clients::{DataSourceClient, ModelClient};
use aggregator::config::Config;
use aggregator::mq::ReservedQueueBroker;
use aggregator::services::{GenerationService, Orchestrator, RetrievalService};
use aggregator::tunnel::{PeerTokenAuthority, TunnelClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    dotenvy::dotenv().ok();

    tracing::info!("aggregator starting");

    let config = Config::from_env();

    let peer_tokens = Arc::new(PeerTokenAuthority::new(
        Duration::from_secs(config.peer_token_expire_seconds),
        config.transport_url.clone(),
        config.transport_auth.clone(),
    ));

    let tunnel = config
        .transport_url
        .as_ref()
        .map(|_| TunnelClient::new(Arc::clone(&peer_tokens), config.service_name.clone()));

    let http_client = build_client();
    let data_source_client = Arc::new(DataSourceClient::new(http_client.clone(), tunnel.clone()));
    let model_client = Arc::new(ModelClient::new(http_client, tunnel));

    let orchestrator = Arc::new(Orchestrator::new(
        RetrievalService::new(data_source_client),
        GenerationService::new(model_client),
        config.retrieval_timeout,
        config.generation_timeout,
        config.total_timeout,
    ));

    let reserved_queues = Arc::new(ReservedQueueBroker::new());

    let host = config.host.clone();
    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        orchestrator,
        peer_tokens,
        reserved_queues,
    };

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    tracing::info!(%host, port, "listening");

    axum::serve(listener, app).await?;

    tracing::info!("aggregator shutting down");
    Ok(())
}
