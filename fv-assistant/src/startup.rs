use axum::{
    body::Body,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    security_headers::security_headers_middleware,
    tracing::{http_request_span, request_id_middleware},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, SessionManagerLayer};

use crate::config::Settings;
use crate::handlers::{
    app::{health_check, index},
    chat::{submit, transcript},
    metrics::metrics,
};
use crate::models::SystemPolicy;
use crate::services::{
    credential::SecretStore, model_session::SessionFactory, providers::ChatProvider,
    registry::ChatRegistry,
};
use crate::AppState;

/// Wire the shared, read-only pieces every chat session draws from.
pub fn build_state(
    settings: &Settings,
    secrets: Arc<dyn SecretStore>,
    provider: Arc<dyn ChatProvider>,
) -> AppState {
    let factory = SessionFactory::new(
        secrets,
        provider,
        settings.model.id.clone(),
        Arc::new(SystemPolicy::photovoltaic()),
    );
    AppState::new(Arc::new(ChatRegistry::new(Arc::new(factory))))
}

pub fn build_router(state: AppState, session_idle: Duration) -> Router {
    let idle = time::Duration::try_from(session_idle).unwrap_or(time::Duration::hours(2));
    let session_layer = SessionManagerLayer::new(state.sessions.clone())
        .with_secure(false) // Set to true in production with HTTPS
        .with_expiry(Expiry::OnInactivity(idle));

    Router::new()
        .route("/", get(index))
        .route("/chat", post(submit))
        .route("/chat/transcript", get(transcript))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(session_layer)
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(http_request_span::<Body>))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}
