#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use fv_assistant::config::{ModelSettings, ServerSettings, Settings};
use fv_assistant::services::credential::{StaticSecretStore, CREDENTIAL_KEY};
use fv_assistant::services::providers::mock::MockChatProvider;
use fv_assistant::startup::{build_router, build_state};
use fv_assistant::AppState;
use http_body_util::BodyExt;
use service_core::observability::TelemetryConfig;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_KEY: &str = "AIzaSyA-valid-looking-test-key-0123456789";

pub fn settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            session_idle_minutes: 120,
        },
        model: ModelSettings {
            id: "gemini-2.5-flash".to_string(),
            api_base: "http://127.0.0.1:1".to_string(),
            request_timeout_secs: 5,
        },
        telemetry: TelemetryConfig::default(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<MockChatProvider>,
}

pub fn spawn_app_with(store: StaticSecretStore, provider: MockChatProvider) -> TestApp {
    let provider = Arc::new(provider);
    let state = build_state(&settings(), Arc::new(store), provider.clone());
    let router = build_router(state.clone(), Duration::from_secs(3600));
    TestApp {
        router,
        state,
        provider,
    }
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(
        StaticSecretStore::new().with(CREDENTIAL_KEY, TEST_KEY),
        MockChatProvider::new(),
    )
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// HTMX-style form post of one chat message.
pub fn post_message(message: &str, cookie: Option<&str>) -> Request<Body> {
    let body = serde_urlencoded::to_string([("message", message)]).unwrap();
    let mut builder = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("hx-request", "true");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body)).unwrap()
}

/// `name=value` pair from the response's session cookie.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|pair| pair.trim().to_string())
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
