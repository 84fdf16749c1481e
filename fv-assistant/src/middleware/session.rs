use crate::services::relay::ChatContext;
use crate::AppState;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use service_core::error::AppError;
use std::sync::Arc;
use tower_sessions::Session;
use uuid::Uuid;

pub const CHAT_ID_KEY: &str = "chat_id";
pub const FLASH_KEY: &str = "flash";

/// The chat context bound to the caller's browser session.
///
/// The first request of a session mints a chat id and stores it in the
/// session, which is what makes the session cookie stick.
#[derive(Clone)]
pub struct ChatHandle {
    pub id: Uuid,
    pub context: Arc<ChatContext>,
    pub session: Session,
}

impl ChatHandle {
    /// Keep a notice for the next page render.
    pub async fn flash(&self, message: String) {
        if let Err(e) = self.session.insert(FLASH_KEY, message).await {
            tracing::warn!(chat_id = %self.id, error = %e, "Failed to store flash message");
        }
    }

    /// The pending notice, if any. It is removed from the session.
    pub async fn take_flash(&self) -> Option<String> {
        self.session
            .remove::<String>(FLASH_KEY)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(chat_id = %self.id, error = %e, "Discarding unreadable flash message");
                None
            })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ChatHandle {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, message)| AppError::InternalError(anyhow::anyhow!(message)))?;

        let stored: Option<Uuid> = session.get(CHAT_ID_KEY).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable chat id");
            None
        });

        let id = match stored {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                session
                    .insert(CHAT_ID_KEY, id)
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to store chat id: {}", e))?;
                tracing::info!(chat_id = %id, "New chat session");
                id
            }
        };

        Ok(ChatHandle {
            id,
            context: state.chats.open(id),
            session,
        })
    }
}
