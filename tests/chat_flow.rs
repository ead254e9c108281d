use std::sync::Arc;
use std::time::Duration;

use aggregator::clients::http::build_client;
use aggregator::clients::{DataSourceClient, ModelClient};
use aggregator::correlation::RequestContext;
use aggregator::schemas::{ChatRequest, EndpointRef};
use aggregator::services::{GenerationService, Orchestrator, RetrievalService};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_orchestrator(http: reqwest::Client) -> Orchestrator {
    let data_source_client = Arc::new(DataSourceClient::new(http.clone(), None));
    let model_client = Arc::new(ModelClient::new(http, None));

    Orchestrator::new(
        RetrievalService::new(data_source_client),
        GenerationService::new(model_client),
        Duration::from_secs(5),
        Duration::from_secs(5),
        Duration::from_secs(10),
    )
}

#[tokio::test]
async fn chat_with_one_data_source_aggregates_and_answers() {
    let data_source = MockServer::start().await;
    let model = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documents": [
                {"content": "Rust is memory safe", "score": 0.9, "metadata": {}},
                {"content": "Rust has no GC", "score": 0.5, "metadata": {}}
            ]
        })))
        .mount(&data_source)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "Rust is memory safe and has no garbage collector."}
        })))
        .mount(&model)
        .await;

    let orchestrator = test_orchestrator(build_client());
    let request = ChatRequest {
        prompt: "what makes Rust safe?".to_string(),
        data_sources: vec![EndpointRef {
            url: data_source.uri(),
            name: "docs".to_string(),
        }],
        model: EndpointRef {
            url: model.uri(),
            name: "model-a".to_string(),
        },
        top_k: 5,
        system_prompt: None,
        stream: false,
    };

    let ctx = RequestContext::new();
    let response = orchestrator
        .process_chat(&request, None, &ctx)
        .await
        .expect("chat should succeed");

    assert!(response.response.contains("memory safe"));
    assert_eq!(response.retrieval_info.len(), 1);
    assert_eq!(response.retrieval_info[0].status, "success");
    assert_eq!(response.retrieval_info[0].document_count, 2);
    // Highest-scoring document surfaces first.
    assert_eq!(response.sources.len(), 2);
}

#[tokio::test]
async fn chat_with_no_data_sources_skips_retrieval() {
    let model = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "no context needed"}
        })))
        .mount(&model)
        .await;

    let orchestrator = test_orchestrator(build_client());
    let request = ChatRequest {
        prompt: "hello".to_string(),
        data_sources: vec![],
        model: EndpointRef {
            url: model.uri(),
            name: "model-a".to_string(),
        },
        top_k: 5,
        system_prompt: None,
        stream: false,
    };

    let ctx = RequestContext::new();
    let response = orchestrator
        .process_chat(&request, None, &ctx)
        .await
        .expect("chat should succeed");

    assert!(response.retrieval_info.is_empty());
    assert!(response.sources.is_empty());
    assert_eq!(response.response, "no context needed");
}

#[tokio::test]
async fn one_failing_data_source_does_not_fail_the_request() {
    let good_source = MockServer::start().await;
    let model = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "documents": ["a bare string document"]
        })))
        .mount(&good_source)
        .await;

    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"role": "assistant", "content": "ok"}
        })))
        .mount(&model)
        .await;

    let orchestrator = test_orchestrator(build_client());
    let request = ChatRequest {
        prompt: "test".to_string(),
        data_sources: vec![
            EndpointRef {
                url: good_source.uri(),
                name: "good".to_string(),
            },
            EndpointRef {
                url: "http://127.0.0.1:1".to_string(),
                name: "unreachable".to_string(),
            },
        ],
        model: EndpointRef {
            url: model.uri(),
            name: "model-a".to_string(),
        },
        top_k: 5,
        system_prompt: None,
        stream: false,
    };

    let ctx = RequestContext::new();
    let response = orchestrator
        .process_chat(&request, None, &ctx)
        .await
        .expect("chat should still succeed with one leg failing");

    assert_eq!(response.retrieval_info.len(), 2);
    let statuses: Vec<_> = response
        .retrieval_info
        .iter()
        .map(|s| s.status.as_str())
        .collect();
    assert!(statuses.contains(&"success"));
    assert!(statuses.contains(&"error"));
}

#[tokio::test]
async fn validation_rejects_empty_prompt() {
    let request = ChatRequest {
        prompt: "   ".to_string(),
        data_sources: vec![],
        model: EndpointRef {
            url: "http://localhost".to_string(),
            name: "m".to_string(),
        },
        top_k: 5,
        system_prompt: None,
        stream: false,
    };
    assert!(request.validate(20, 10).is_err());
}

#[tokio::test]
async fn validation_rejects_top_k_out_of_bounds() {
    let request = ChatRequest {
        prompt: "hi".to_string(),
        data_sources: vec![],
        model: EndpointRef {
            url: "http://localhost".to_string(),
            name: "m".to_string(),
        },
        top_k: 50,
        system_prompt: None,
        stream: false,
    };
    assert!(request.validate(20, 10).is_err());
}
