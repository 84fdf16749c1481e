//! The Gemini provider against a local stand-in for the REST API.

mod common;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use common::{body_string, get as get_request, post_message, session_cookie, TEST_KEY};
use fv_assistant::models::{ConversationState, SystemPolicy};
use fv_assistant::services::credential::{
    resolve_credential, Credential, StaticSecretStore, CREDENTIAL_KEY,
};
use fv_assistant::services::providers::gemini::GeminiProvider;
use fv_assistant::services::providers::{ChatProvider, GenerateRequest, ProviderError};
use fv_assistant::startup::{build_router, build_state};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

#[derive(Clone, Default)]
struct FakeGemini {
    uris: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<Value>>>,
}

fn key_is_valid(headers: &HeaderMap) -> bool {
    headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|key| key == TEST_KEY)
}

fn invalid_key() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT",
                "details": [{ "reason": "API_KEY_INVALID" }]
            }
        })),
    )
        .into_response()
}

async fn describe(
    State(fake): State<FakeGemini>,
    Path(model): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    fake.uris.lock().unwrap().push(uri.to_string());
    if !key_is_valid(&headers) {
        return invalid_key();
    }
    if model != "gemini-2.5-flash" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": {
                    "code": 404,
                    "message": format!("models/{} is not found for API version v1beta", model),
                    "status": "NOT_FOUND"
                }
            })),
        )
            .into_response();
    }
    Json(json!({
        "name": "models/gemini-2.5-flash",
        "displayName": "Gemini 2.5 Flash",
        "inputTokenLimit": 1048576,
        "outputTokenLimit": 65536
    }))
    .into_response()
}

async fn generate(
    State(fake): State<FakeGemini>,
    Path(method): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    fake.uris.lock().unwrap().push(uri.to_string());
    if !key_is_valid(&headers) {
        return invalid_key();
    }
    if !method.ends_with(":generateContent") {
        return StatusCode::NOT_FOUND.into_response();
    }

    let contents = body["contents"].as_array().cloned().unwrap_or_default();
    let last = contents
        .last()
        .and_then(|c| c["parts"][0]["text"].as_str())
        .unwrap_or_default()
        .to_string();
    fake.bodies.lock().unwrap().push(body);

    if last.contains("cuota") {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED" } })),
        )
            .into_response();
    }
    if last.contains("bloqueado") {
        return Json(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .into_response();
    }

    Json(json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [
                    { "text": "pensando...", "thought": true },
                    { "text": format!("Turno {}: {}", contents.len(), last) }
                ]
            },
            "finishReason": "STOP"
        }],
        "usageMetadata": { "promptTokenCount": 42, "candidatesTokenCount": 7 }
    }))
    .into_response()
}

/// Start the stand-in and return its `/v1beta` base URL.
async fn spawn_fake() -> (String, FakeGemini) {
    let fake = FakeGemini::default();
    let app = Router::new()
        .route("/v1beta/models/:model", get(describe).post(generate))
        .with_state(fake.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/v1beta", address), fake)
}

fn credential(key: &str) -> Credential {
    resolve_credential(&StaticSecretStore::new().with(CREDENTIAL_KEY, key)).unwrap()
}

#[tokio::test]
async fn describe_model_sends_key_in_header() {
    let (base, fake) = spawn_fake().await;
    let provider = GeminiProvider::new(base, Duration::from_secs(5)).unwrap();

    let info = provider
        .describe_model(&credential(TEST_KEY), "gemini-2.5-flash")
        .await
        .unwrap();

    assert_eq!(info.name, "models/gemini-2.5-flash");
    assert_eq!(info.display_name.as_deref(), Some("Gemini 2.5 Flash"));
    assert_eq!(info.input_token_limit, Some(1_048_576));
    assert!(fake.uris.lock().unwrap().iter().all(|u| !u.contains(TEST_KEY)));
}

#[tokio::test]
async fn describe_model_classifies_failures() {
    let (base, _fake) = spawn_fake().await;
    let provider = GeminiProvider::new(base, Duration::from_secs(5)).unwrap();

    let err = provider
        .describe_model(&credential(TEST_KEY), "gemini-pro")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::ModelNotFound(ref m) if m.contains("gemini-pro")));

    let wrong = "AIzaSyB-some-other-key-that-is-long-enough";
    let err = provider
        .describe_model(&credential(wrong), "gemini-2.5-flash")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized(_)));
}

#[tokio::test]
async fn generate_sends_history_and_policy() {
    let (base, fake) = spawn_fake().await;
    let provider = GeminiProvider::new(base, Duration::from_secs(5)).unwrap();
    let policy = SystemPolicy::photovoltaic();

    let mut state = ConversationState::new();
    state.append_user("¿Qué es un regulador MPPT?");
    state.append_assistant("Un seguidor del punto de máxima potencia.");
    state.append_user("¿Y PWM?");
    let history = state.snapshot();

    let response = provider
        .generate(
            &credential(TEST_KEY),
            GenerateRequest {
                model: "gemini-2.5-flash",
                system_instruction: policy.system_instruction(),
                sampling: policy.sampling(),
                history: &history,
            },
        )
        .await
        .unwrap();

    assert_eq!(response.text.as_deref(), Some("Turno 3: ¿Y PWM?"));
    assert_eq!(response.input_tokens, 42);
    assert_eq!(response.output_tokens, 7);

    let bodies = fake.bodies.lock().unwrap();
    let body = &bodies[0];
    let roles: Vec<&str> = body["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "model", "user"]);
    assert_eq!(
        body["systemInstruction"]["parts"][0]["text"],
        policy.system_instruction()
    );
    let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
    assert!((temperature - 0.4).abs() < 1e-6);
}

async fn generate_error(text: &str) -> ProviderError {
    let (base, _fake) = spawn_fake().await;
    let provider = GeminiProvider::new(base, Duration::from_secs(5)).unwrap();
    let policy = SystemPolicy::photovoltaic();

    let mut state = ConversationState::new();
    state.append_user(text);
    let history = state.snapshot();
    provider
        .generate(
            &credential(TEST_KEY),
            GenerateRequest {
                model: "gemini-2.5-flash",
                system_instruction: policy.system_instruction(),
                sampling: policy.sampling(),
                history: &history,
            },
        )
        .await
        .unwrap_err()
}

#[tokio::test]
async fn generate_classifies_rate_limit() {
    assert_eq!(generate_error("sin cuota").await, ProviderError::RateLimited);
}

#[tokio::test]
async fn generate_classifies_safety_blocks() {
    assert_eq!(
        generate_error("contenido bloqueado").await,
        ProviderError::ContentFiltered("SAFETY".to_string())
    );
}

#[tokio::test]
async fn unreachable_api_is_a_network_error() {
    let provider = GeminiProvider::new("http://127.0.0.1:1/v1beta", Duration::from_secs(2)).unwrap();

    let err = provider
        .describe_model(&credential(TEST_KEY), "gemini-2.5-flash")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::NetworkError(_)));
}

#[tokio::test]
async fn full_chat_against_the_stand_in() {
    let (base, fake) = spawn_fake().await;
    let provider = GeminiProvider::new(base, Duration::from_secs(5)).unwrap();
    let state = build_state(
        &common::settings(),
        Arc::new(StaticSecretStore::new().with(CREDENTIAL_KEY, TEST_KEY)),
        Arc::new(provider),
    );
    let router = build_router(state, Duration::from_secs(3600));

    let response = router.clone().oneshot(get_request("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response).unwrap();

    let response = router
        .clone()
        .oneshot(post_message("¿Cuántas placas necesito?", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Turno 1: ¿Cuántas placas necesito?"));

    let response = router
        .clone()
        .oneshot(post_message("¿Y con baterías?", Some(&cookie)))
        .await
        .unwrap();
    assert!(body_string(response).await.contains("Turno 3: ¿Y con baterías?"));

    let response = router
        .clone()
        .oneshot(post_message("contenido bloqueado", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    assert_eq!(fake.bodies.lock().unwrap().len(), 3);
    assert!(fake.uris.lock().unwrap().iter().all(|u| !u.contains(TEST_KEY)));
}
