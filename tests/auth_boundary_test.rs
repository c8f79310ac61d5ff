use clap::Parser;
use palaver::main_helper::{AppState, Args};
use palaver::reconcile::ConversationRegistry;
use palaver::session::{SESSION_USER_HEADER, UPSTREAM_TOKEN_HEADER};
use palaver::upstream::UpstreamClient;
use std::sync::Arc;
use std::time::Duration;
use tower::util::ServiceExt;

// The upstream is never reached in these tests; auth rejects first.
fn app() -> (axum::Router, Arc<ConversationRegistry>) {
    let registry = Arc::new(ConversationRegistry::new());
    let state = AppState {
        upstream: UpstreamClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:1",
            Duration::from_secs(1),
        ),
        registry: registry.clone(),
        args: Arc::new(Args::parse_from(["palaver"])),
    };
    (palaver::routes::router(state), registry)
}

async fn get(
    app: &axum::Router,
    uri: &str,
    headers: &[(&str, &str)],
) -> (u16, serde_json::Value) {
    let mut builder = axum::http::Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app
        .clone()
        .oneshot(builder.body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status().as_u16();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn no_session_is_rejected_with_its_own_code() {
    let (app, _) = app();
    let (status, body) = get(&app, "/api/history", &[]).await;
    assert_eq!(status, 401);
    assert_eq!(body["code"], "NO_SESSION");
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn session_without_upstream_token_is_a_different_401() {
    let (app, _) = app();
    let (status, body) = get(&app, "/api/history", &[(SESSION_USER_HEADER, "u-1")]).await;
    assert_eq!(status, 401);
    assert_eq!(body["code"], "MISSING_UPSTREAM_TOKEN");
    assert_ne!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn health_needs_no_session() {
    let (app, _) = app();
    let (status, body) = get(&app, "/health", &[]).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn conversation_id_lookup_answers_from_the_registry() {
    let (app, registry) = app();
    let headers = [
        (SESSION_USER_HEADER, "u-1"),
        (UPSTREAM_TOKEN_HEADER, "tok-abc"),
    ];

    let (status, body) = get(&app, "/api/conversation-id?tempId=tmp-1", &headers).await;
    assert_eq!(status, 200);
    assert_eq!(body["conversationId"], serde_json::Value::Null);

    registry.observe("tmp-1", 555);
    let (status, body) = get(&app, "/api/conversation-id?tempId=tmp-1", &headers).await;
    assert_eq!(status, 200);
    assert_eq!(body["conversationId"], 555);
}

#[tokio::test]
async fn app_config_falls_back_to_defaults_when_upstream_is_down() {
    let (app, _) = app();
    let headers = [
        (SESSION_USER_HEADER, "u-1"),
        (UPSTREAM_TOKEN_HEADER, "tok-abc"),
    ];

    let (status, body) = get(&app, "/api/app-config", &headers).await;
    assert_eq!(status, 200);
    assert!(body["chat_suggestions"].is_array());
    assert!(body["chat_introduction"].is_string());
}

#[tokio::test]
async fn chat_stream_requires_an_upstream_token() {
    let (app, _) = app();
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .header(SESSION_USER_HEADER, "u-1")
        .body(axum::body::Body::from(
            serde_json::json!({
                "id": "tmp-1",
                "messages": [{"role": "user", "content": "hi"}],
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "MISSING_UPSTREAM_TOKEN");
}
