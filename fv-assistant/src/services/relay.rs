//! Per-UI-session chat context and the turn relay.

use crate::error::{RelayError, StartupError};
use crate::models::{ConversationState, Turn};
use crate::services::metrics;
use crate::services::model_session::{ModelSession, SessionFactory};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::OnceCell;

/// Guard that clears the `busy` flag on drop, so the flag is released on
/// every exit path including a dropped request future.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, RelayError> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| RelayError::Busy)?;
        Ok(Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Everything one UI session owns: its model session (opened lazily, at most
/// once), its transcript and the flag that keeps submissions sequential.
pub struct ChatContext {
    factory: Arc<SessionFactory>,
    model: OnceCell<ModelSession>,
    conversation: RwLock<ConversationState>,
    busy: AtomicBool,
}

impl ChatContext {
    pub fn new(factory: Arc<SessionFactory>) -> Self {
        Self {
            factory,
            model: OnceCell::new(),
            conversation: RwLock::new(ConversationState::new()),
            busy: AtomicBool::new(false),
        }
    }

    /// The memoized model session. Only success is cached: after a failure
    /// the next call runs the factory again, so fixing the key or model id
    /// and reloading is enough.
    pub async fn model_session(&self) -> Result<&ModelSession, StartupError> {
        self.model
            .get_or_try_init(|| self.factory.create_session())
            .await
    }

    pub fn model_id(&self) -> &str {
        self.factory.model_id()
    }

    pub fn is_ready(&self) -> bool {
        self.model.initialized()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Chronological copy of the transcript.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.conversation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn len(&self) -> usize {
        self.conversation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Relay one user turn and return the assistant turn.
    ///
    /// The user turn is recorded before the model is called and stays in the
    /// transcript when the call fails. A submission arriving while another is
    /// in flight is rejected with [`RelayError::Busy`] and changes nothing; so
    /// does one that hits a startup failure.
    #[tracing::instrument(skip_all, fields(model = %self.factory.model_id(), turns = tracing::field::Empty))]
    pub async fn submit(&self, user_text: &str) -> Result<Turn, RelayError> {
        let result = self.relay(user_text).await;

        match &result {
            Ok(_) => metrics::record_relay("ok"),
            Err(e) => {
                metrics::record_relay(e.kind());
                if !matches!(e, RelayError::Busy) {
                    tracing::warn!(kind = e.kind(), error = %e, "Relay failed");
                }
            }
        }

        result
    }

    async fn relay(&self, user_text: &str) -> Result<Turn, RelayError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let model = self.model_session().await?;

        let history = {
            let mut conversation = self
                .conversation
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            conversation.append_user(user_text);
            conversation.snapshot()
        };
        tracing::Span::current().record("turns", history.len());

        let reply = model.generate(&history).await?;

        let mut conversation = self
            .conversation
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let id = conversation.append_assistant(reply);
        conversation
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::MalformedResponse("assistant turn not recorded".to_string()))
    }
}
