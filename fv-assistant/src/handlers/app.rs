use crate::error::StartupError;
use crate::middleware::session::ChatHandle;
use crate::handlers::chat::Bubble;
use askama::Template;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub const EXAMPLE_QUESTIONS: [&str; 3] = [
    "¿Por qué mis placas solares no están generando la electricidad que deberían?",
    "¿Qué pasa si mi casa produce más electricidad de la que consume?",
    "¿Cuántas placas necesito para una casa con un consumo normal?",
];

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub model: String,
    pub bubbles: Vec<Bubble>,
    pub notice: Option<String>,
    pub examples: &'static [&'static str],
}

/// Shown instead of the chat when the model session cannot be opened.
#[derive(Template)]
#[template(path = "startup_error.html")]
pub struct StartupErrorTemplate {
    pub headline: String,
    pub remediation: String,
}

impl From<&StartupError> for StartupErrorTemplate {
    fn from(error: &StartupError) -> Self {
        Self {
            headline: error.headline(),
            remediation: error.remediation(),
        }
    }
}

pub async fn index(chat: ChatHandle) -> Response {
    match chat.context.model_session().await {
        Ok(session) => IndexTemplate {
            model: session.model_id().to_string(),
            bubbles: chat.context.snapshot().iter().map(Bubble::from).collect(),
            notice: chat.take_flash().await,
            examples: &EXAMPLE_QUESTIONS,
        }
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            StartupErrorTemplate::from(&e),
        )
            .into_response(),
    }
}

pub async fn health_check() -> &'static str {
    "OK"
}
