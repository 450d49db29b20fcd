// ABOUTME: Integration tests for the HTTP gateway surface
// ABOUTME: Request validation, model listing, and conversation management endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use agora::config::{ProviderEnv, ProviderSettings, ServerConfig};
use agora::database::{Database, NewMessage};
use agora::llm::{MessageRole, ModelRegistry};
use agora::server::{router, ServerResources};

async fn test_resources() -> (Arc<ServerResources>, Database) {
    let providers = ProviderEnv {
        mistral: ProviderSettings {
            api_key: Some("test-key".to_owned()),
            base_url: None,
        },
        qwen: ProviderSettings {
            api_key: Some("test-key".to_owned()),
            base_url: None,
        },
        ..ProviderEnv::default()
    };
    let config = ServerConfig {
        http_port: 8000,
        database_url: "sqlite::memory:".to_owned(),
        default_model: "mistral-large-latest".to_owned(),
        model_temperature: 0.7,
        providers,
    };
    let database = Database::connect(&config.database_url).await.unwrap();
    let registry = Arc::new(ModelRegistry::from_env(&config.providers).unwrap());
    (
        ServerResources::new(database.clone(), registry, config),
        database,
    )
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Health and Models
// ============================================================================

#[tokio::test]
async fn health_reports_configured_providers() {
    let (resources, _) = test_resources().await;
    let response = router(resources).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    let providers: Vec<&str> = body["providers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(providers, vec!["mistral", "qwen"]);
}

#[tokio::test]
async fn models_lists_only_configured_families() {
    let (resources, _) = test_resources().await;
    let response = router(resources).oneshot(get("/models/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let models = body["models"].as_array().unwrap();
    assert!(models
        .iter()
        .any(|m| m["model_id"] == "mistral-large-latest"));
    assert!(models.iter().any(|m| m["model_id"] == "qwen-max"));
    // glm has no key configured
    assert!(!models.iter().any(|m| m["model_id"] == "glm-4-plus"));
    // capability flags surface
    let qwen_max = models
        .iter()
        .find(|m| m["model_id"] == "qwen-max")
        .unwrap();
    assert_eq!(qwen_max["supports_thinking"], true);
    assert_eq!(qwen_max["thinking_locked"], false);
}

#[tokio::test]
async fn provider_info_returns_404_for_unknown() {
    let (resources, _) = test_resources().await;
    let app = router(resources);
    let ok = app
        .clone()
        .oneshot(get("/models/providers/mistral"))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let missing = app
        .oneshot(get("/models/providers/anthropic"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Simple Chat Validation
// ============================================================================

#[tokio::test]
async fn empty_message_is_rejected() {
    let (resources, _) = test_resources().await;
    let response = router(resources)
        .oneshot(post_json("/chat/stream", &json!({"message": "   "})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn unknown_model_is_rejected_with_validation_error() {
    let (resources, _) = test_resources().await;
    let response = router(resources)
        .oneshot(post_json(
            "/chat/stream",
            &json!({"message": "hi", "model": "no-such-model"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("no-such-model"));
}

#[tokio::test]
async fn unconfigured_family_model_is_rejected() {
    let (resources, _) = test_resources().await;
    // glm-4-plus exists in the glm family table, but glm has no API key
    let response = router(resources)
        .oneshot(post_json(
            "/chat/stream",
            &json!({"message": "hi", "model": "glm-4-plus"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Debate Chat Validation
// ============================================================================

#[tokio::test]
async fn debate_rejects_out_of_range_parameters() {
    let (resources, _) = test_resources().await;
    let app = router(resources);

    let too_many = app
        .clone()
        .oneshot(post_json(
            "/chat/multi-agent/stream",
            &json!({"message": "q", "max_iterations": 11}),
        ))
        .await
        .unwrap();
    assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);

    let low_threshold = app
        .clone()
        .oneshot(post_json(
            "/chat/multi-agent/stream",
            &json!({"message": "q", "score_threshold": 30.0}),
        ))
        .await
        .unwrap();
    assert_eq!(low_threshold.status(), StatusCode::BAD_REQUEST);

    let bad_model = app
        .oneshot(post_json(
            "/chat/multi-agent/stream",
            &json!({"message": "q", "models": {"expert": "bogus"}}),
        ))
        .await
        .unwrap();
    assert_eq!(bad_model.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn debate_rejects_empty_message() {
    let (resources, _) = test_resources().await;
    let response = router(resources)
        .oneshot(post_json("/chat/multi-agent/stream", &json!({"message": ""})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Conversation Management
// ============================================================================

#[tokio::test]
async fn conversation_listing_and_info() {
    let (resources, db) = test_resources().await;
    db.create_or_touch("c1", "mistral-large-latest").await.unwrap();
    db.append_message("c1", NewMessage::plain(MessageRole::User, "hello"))
        .await
        .unwrap();

    let app = router(resources);

    let list = app.clone().oneshot(get("/conversations")).await.unwrap();
    assert_eq!(list.status(), StatusCode::OK);
    let body = body_json(list).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["conversations"][0]["id"], "c1");
    assert_eq!(body["conversations"][0]["mode"], "simple");
    assert_eq!(body["conversations"][0]["message_count"], 1);

    let info = app
        .clone()
        .oneshot(get("/conversations/c1/info"))
        .await
        .unwrap();
    assert_eq!(info.status(), StatusCode::OK);
    let body = body_json(info).await;
    assert_eq!(body["title"], "hello");

    let missing = app
        .oneshot(get("/conversations/unknown/info"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_includes_message_type_and_iteration() {
    let (resources, db) = test_resources().await;
    db.append_message(
        "c1",
        NewMessage {
            role: MessageRole::System,
            content: "{}",
            model: Some("qwen-max"),
            message_type: Some("expert_answer"),
            iteration: Some(1),
            metadata: None,
        },
    )
    .await
    .unwrap();

    let response = router(resources)
        .oneshot(get("/conversations/c1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["messages"][0]["message_type"], "expert_answer");
    assert_eq!(body["messages"][0]["iteration"], 1);
}

#[tokio::test]
async fn list_validates_pagination_bounds() {
    let (resources, _) = test_resources().await;
    let response = router(resources)
        .oneshot(get("/conversations?limit=1000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_endpoints_report_results() {
    let (resources, db) = test_resources().await;
    db.create_or_touch("c1", "m").await.unwrap();
    db.create_or_touch("c2", "m").await.unwrap();

    let app = router(resources);

    let one = app
        .clone()
        .oneshot(delete("/conversations/c1"))
        .await
        .unwrap();
    assert_eq!(one.status(), StatusCode::OK);
    assert_eq!(body_json(one).await["deleted"], true);

    let missing = app
        .clone()
        .oneshot(delete("/conversations/c1"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let all = app.oneshot(delete("/conversations")).await.unwrap();
    assert_eq!(all.status(), StatusCode::OK);
    assert_eq!(body_json(all).await["deleted_count"], 1);
}

#[tokio::test]
async fn switch_mode_round_trips_over_http() {
    let (resources, db) = test_resources().await;
    db.create_or_touch("c1", "mistral-large-latest").await.unwrap();
    db.append_message("c1", NewMessage::plain(MessageRole::User, "about Python"))
        .await
        .unwrap();

    let app = router(resources);

    let response = app
        .clone()
        .oneshot(post_json(
            "/conversations/c1/switch-mode",
            &json!({
                "target_mode": "debate",
                "debate_config": {
                    "models": {"moderator": "qwen-max"},
                    "max_iterations": 4,
                    "score_threshold": 85.0
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "debate");

    let state = db.read_debate_state("c1").await.unwrap().unwrap();
    assert_eq!(state["config"]["models"]["moderator"], "qwen-max");
    assert_eq!(state["config"]["max_iterations"], 4);
    assert!(state["conversation_context"]
        .as_str()
        .unwrap()
        .contains("about Python"));

    let unknown = app
        .oneshot(post_json(
            "/conversations/none/switch-mode",
            &json!({"target_mode": "simple"}),
        ))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}
