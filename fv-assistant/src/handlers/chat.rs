use crate::error::RelayError;
use crate::middleware::session::ChatHandle;
use crate::models::Turn;
use crate::utils::markdown;
use askama::Template;
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const MAX_MESSAGE_CHARS: u64 = 8000;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatForm {
    #[validate(length(max = 8000, message = "El mensaje es demasiado largo"))]
    #[serde(default)]
    pub message: String,
}

/// One chat bubble as rendered by `partials/bubble.html`. `html` is the
/// turn's Markdown already rendered with raw HTML escaped.
#[derive(Debug, Clone)]
pub struct Bubble {
    pub user: bool,
    pub html: String,
    pub time: String,
}

impl From<&Turn> for Bubble {
    fn from(turn: &Turn) -> Self {
        Self {
            user: turn.is_user(),
            html: markdown::render(turn.content()),
            time: turn.time_label(),
        }
    }
}

/// Fragment appended to `#transcript` after a submission.
#[derive(Template)]
#[template(path = "partials/exchange.html")]
pub struct ExchangeTemplate {
    pub bubbles: Vec<Bubble>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct TranscriptResponse {
    pub chat_id: Uuid,
    pub model: String,
    pub ready: bool,
    pub busy: bool,
    pub turns: Vec<Turn>,
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("hx-request")
}

fn failure_notice(error: &RelayError) -> String {
    match error {
        RelayError::Busy => {
            "Espera a que termine la respuesta anterior antes de enviar otra consulta.".to_string()
        }
        other => format!("Ocurrió un error al comunicarse con la IA: {}", other),
    }
}

fn fragment(status: StatusCode, bubbles: Vec<Bubble>, error: Option<String>) -> Response {
    (status, ExchangeTemplate { bubbles, error }).into_response()
}

/// Relay one user message. HTMX callers get a fragment to append; plain form
/// posts are redirected back to the page, which re-renders the transcript
/// and any pending notice.
pub async fn submit(chat: ChatHandle, headers: HeaderMap, Form(form): Form<ChatForm>) -> Response {
    let htmx = is_htmx(&headers);
    let message = form.message.trim();

    if message.is_empty() {
        return if htmx {
            StatusCode::NO_CONTENT.into_response()
        } else {
            Redirect::to("/").into_response()
        };
    }

    if let Err(e) = form.validate() {
        tracing::debug!(chat_id = %chat.id, error = %e, "Rejected chat message");
        let notice = format!(
            "El mensaje es demasiado largo (máximo {} caracteres).",
            MAX_MESSAGE_CHARS
        );
        return if htmx {
            fragment(StatusCode::UNPROCESSABLE_ENTITY, Vec::new(), Some(notice))
        } else {
            chat.flash(notice).await;
            Redirect::to("/").into_response()
        };
    }

    let result = chat.context.submit(message).await;

    // Plain posts reload the page; a startup failure shows there on its own,
    // anything else is carried over as a one-shot notice.
    if !htmx {
        if let Err(e) = &result {
            if !e.is_fatal() {
                chat.flash(failure_notice(e)).await;
            }
        }
        return Redirect::to("/").into_response();
    }

    let question = Bubble {
        user: true,
        html: markdown::render(message),
        time: Utc::now().format("%H:%M").to_string(),
    };

    match result {
        Ok(reply) => fragment(StatusCode::OK, vec![question, Bubble::from(&reply)], None),
        Err(e @ RelayError::Busy) => {
            fragment(StatusCode::CONFLICT, Vec::new(), Some(failure_notice(&e)))
        }
        Err(RelayError::Startup(e)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("hx-refresh", "true")],
            e.headline(),
        )
            .into_response(),
        Err(e) => fragment(
            StatusCode::BAD_GATEWAY,
            vec![question],
            Some(failure_notice(&e)),
        ),
    }
}

pub async fn transcript(chat: ChatHandle) -> Json<TranscriptResponse> {
    Json(TranscriptResponse {
        chat_id: chat.id,
        model: chat.context.model_id().to_string(),
        ready: chat.context.is_ready(),
        busy: chat.context.is_busy(),
        turns: chat.context.snapshot(),
    })
}
