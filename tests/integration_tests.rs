//! Integration tests for the channel translation service
//!
//! These drive the HTTP router end to end: in-memory stores, a real
//! LibreTranslate backend pointed at a wiremock server, and requests sent
//! through `tower::ServiceExt::oneshot`.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use channel_translations::api::{router, AppState};
use channel_translations::backend::{build_backend, TranslationBackend};
use channel_translations::config::{BackendKind, Config};
use channel_translations::message::Message;
use channel_translations::permissions::ConfiguredPermissions;
use channel_translations::service::TranslationService;
use channel_translations::store::{MemoryStore, MessageStore};

// ==================== Test Helpers ====================

fn test_config(libretranslate_url: &str) -> Config {
    Config {
        enable_translations: true,
        translation_languages: "es,fr".to_string(),
        translate_system_messages: false,
        backend: BackendKind::LibreTranslate,
        translation_bot_name: "translator".to_string(),
        llm_api_url: "http://localhost/unused".to_string(),
        llm_api_key: None,
        llm_model: "gpt-4o-mini".to_string(),
        libretranslate_url: Some(libretranslate_url.to_string()),
        libretranslate_api_key: None,
        libretranslate_format: "text".to_string(),
        max_concurrency: 3,
        max_attempts: 3,
        call_timeout: Duration::from_secs(5),
        retry_delay: Duration::ZERO,
        run_deadline: None,
        database_url: None,
        api_key: None,
        channel_admin_user_ids: vec!["admin".to_string()],
        port: 0,
    }
}

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
}

fn build_app(config: &Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let backend: Arc<dyn TranslationBackend> = build_backend(config).expect("backend");
    let service = Arc::new(TranslationService::new(
        Some(backend),
        store.clone(),
        store.clone(),
        Arc::new(ConfiguredPermissions::new(config.channel_admin_user_ids.clone())),
        config.translation_settings(),
    ));

    TestApp {
        app: router(AppState::new(service, config.api_key.clone())),
        store,
    }
}

async fn mock_translation(server: &MockServer, target: &str, text: &str) {
    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_partial_json(json!({ "target": target })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "translatedText": text,
            "detectedLanguage": { "language": "en", "confidence": 90.0 }
        })))
        .mount(server)
        .await;
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("Mattermost-User-Id", user_id);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Poll the store until the message carries translations.
async fn wait_for_translations(store: &MemoryStore, id: &str) -> Message {
    for _ in 0..100 {
        let message = store.get_message(id).await.unwrap();
        if message.has_translations() {
            return message;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("message {} was never translated", id);
}

// ==================== Authentication ====================

#[tokio::test]
async fn test_requests_without_user_are_rejected() {
    let server = MockServer::start().await;
    let app = build_app(&test_config(&server.uri()));

    let (status, _) = send(&app.app, "GET", "/translation/languages", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_api_key_is_enforced_when_configured() {
    let server = MockServer::start().await;
    let mut config = test_config(&server.uri());
    config.api_key = Some("test-api-key".to_string());
    let app = build_app(&config);

    let (status, _) = send(&app.app, "GET", "/health", Some("u1"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/health")
        .header("Mattermost-User-Id", "u1")
        .header("X-Api-Key", "test-api-key")
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

// ==================== Languages & Preferences ====================

#[tokio::test]
async fn test_languages_and_user_preference() {
    let server = MockServer::start().await;
    let app = build_app(&test_config(&server.uri()));

    let (status, body) = send(&app.app, "GET", "/translation/languages", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "languages": ["es", "fr"], "userPreference": "" }));

    let (status, body) = send(
        &app.app,
        "POST",
        "/translation/user_preference",
        Some("u1"),
        Some(json!({ "language": "fr" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let (_, body) = send(&app.app, "GET", "/translation/languages", Some("u1"), None).await;
    assert_eq!(body["userPreference"], "fr");
}

#[tokio::test]
async fn test_invalid_user_preference_is_rejected() {
    let server = MockServer::start().await;
    let app = build_app(&test_config(&server.uri()));

    let (status, body) = send(
        &app.app,
        "POST",
        "/translation/user_preference",
        Some("u1"),
        Some(json!({ "language": "<script>alert(1)</script>" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid language"));
}

// ==================== Channel Settings ====================

#[tokio::test]
async fn test_channel_toggle_requires_manage_permission() {
    let server = MockServer::start().await;
    let app = build_app(&test_config(&server.uri()));

    let (status, _) = send(
        &app.app,
        "POST",
        "/channel/c1/translations",
        Some("u1"),
        Some(json!({ "enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app.app,
        "POST",
        "/channel/c1/translations",
        Some("admin"),
        Some(json!({ "enabled": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "enabled": true }));

    let (status, body) = send(&app.app, "GET", "/channel/c1/translations", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "enabled": true }));

    let (_, body) = send(&app.app, "GET", "/channel/c2/translations", Some("u1"), None).await;
    assert_eq!(body, json!({ "enabled": false }));
}

// ==================== Automatic Pipeline ====================

#[tokio::test]
async fn test_posted_message_is_translated_into_all_languages() {
    let server = MockServer::start().await;
    mock_translation(&server, "es", "Hola").await;
    mock_translation(&server, "fr", "Bonjour").await;
    let app = build_app(&test_config(&server.uri()));

    send(
        &app.app,
        "POST",
        "/channel/c1/translations",
        Some("admin"),
        Some(json!({ "enabled": true })),
    )
    .await;

    let (status, _) = send(
        &app.app,
        "POST",
        "/hooks/message_posted",
        Some("u1"),
        Some(json!({ "id": "p1", "channel_id": "c1", "user_id": "u1", "message": "Hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let message = wait_for_translations(&app.store, "p1").await;
    assert_eq!(
        serde_json::to_value(&message.props["translations"]).unwrap(),
        json!({ "es": "Hola", "fr": "Bonjour" })
    );
    assert_eq!(message.post_type, "custom_translation");

    let (_, body) = send(&app.app, "GET", "/post/p1/translation_state", Some("u1"), None).await;
    assert_eq!(body, json!({ "state": "translated" }));
}

#[tokio::test]
async fn test_message_in_disabled_channel_is_left_alone() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "translatedText": "x" })))
        .expect(0)
        .mount(&server)
        .await;
    let app = build_app(&test_config(&server.uri()));

    let (status, _) = send(
        &app.app,
        "POST",
        "/hooks/message_posted",
        Some("u1"),
        Some(json!({ "id": "p1", "channel_id": "c1", "user_id": "u1", "message": "Hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let message = app.store.get_message("p1").await.unwrap();
    assert!(message.props.is_empty());
    assert!(message.post_type.is_empty());
}

#[tokio::test]
async fn test_failing_language_is_omitted() {
    let server = MockServer::start().await;
    mock_translation(&server, "es", "Hola").await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_partial_json(json!({ "target": "fr" })))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "error": "boom" })))
        .expect(3)
        .mount(&server)
        .await;
    let app = build_app(&test_config(&server.uri()));

    send(
        &app.app,
        "POST",
        "/channel/c1/translations",
        Some("admin"),
        Some(json!({ "enabled": true })),
    )
    .await;
    send(
        &app.app,
        "POST",
        "/hooks/message_posted",
        Some("u1"),
        Some(json!({ "id": "p1", "channel_id": "c1", "user_id": "u1", "message": "Hello" })),
    )
    .await;

    let message = wait_for_translations(&app.store, "p1").await;
    let translations = message.translations();
    assert_eq!(translations.len(), 1);
    assert_eq!(translations["es"], "Hola");
}

// ==================== On-Demand Translation ====================

#[tokio::test]
async fn test_translate_post_on_demand() {
    let server = MockServer::start().await;
    mock_translation(&server, "de", "Hallo").await;
    let app = build_app(&test_config(&server.uri()));
    app.store
        .save_message(&Message::new("p1", "c1", "u1", "Hello"))
        .await
        .unwrap();

    let (status, body) = send(
        &app.app,
        "POST",
        "/post/p1/translate",
        Some("u2"),
        Some(json!({ "lang": "de" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "translatedText": "Hallo", "originalText": "Hello", "targetLanguage": "de" })
    );
    let stored = app.store.get_message("p1").await.unwrap().translations();
    assert_eq!(stored["de"], "Hallo");
}

#[tokio::test]
async fn test_translate_post_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/translate"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "xx is not supported" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let app = build_app(&test_config(&server.uri()));
    app.store
        .save_message(&Message::new("p1", "c1", "u1", "Hello"))
        .await
        .unwrap();

    let (status, body) = send(
        &app.app,
        "POST",
        "/post/p1/translate",
        Some("u1"),
        Some(json!({ "lang": "xx" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({ "error": "translation failed" }));
}

#[tokio::test]
async fn test_translate_post_failure_kinds() {
    let server = MockServer::start().await;
    let mut config = test_config(&server.uri());
    config.enable_translations = false;
    let app = build_app(&config);
    app.store
        .save_message(&Message::new("empty", "c1", "u1", ""))
        .await
        .unwrap();
    app.store
        .save_message(&Message::new("p1", "c1", "u1", "Hello"))
        .await
        .unwrap();

    let lang = Some(json!({ "lang": "es" }));

    let (status, _) = send(&app.app, "POST", "/post/missing/translate", Some("u1"), lang.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app.app, "POST", "/post/empty/translate", Some("u1"), lang.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.app, "POST", "/post/p1/translate", Some("u1"), lang).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

// ==================== Health ====================

#[tokio::test]
async fn test_health_reports_metrics() {
    let server = MockServer::start().await;
    let app = build_app(&test_config(&server.uri()));

    let (status, body) = send(&app.app, "GET", "/health", Some("u1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["metrics"]["backend_calls"].is_number());
}
