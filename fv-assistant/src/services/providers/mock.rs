//! Mock provider implementation for testing.

use super::{
    ChatProvider, FinishReason, GenerateRequest, ModelInfo, ProviderError, ProviderResponse,
};
use crate::models::{Role, Turn};
use crate::services::credential::Credential;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Scripted provider: replies are served from a queue, falling back to an
/// echo of the last user turn. Counts every call so tests can assert how
/// often the factory and relay reached the provider.
#[derive(Default)]
pub struct MockChatProvider {
    validation_error: Mutex<Option<ProviderError>>,
    replies: Mutex<VecDeque<Result<Option<String>, ProviderError>>>,
    delay: Option<Duration>,
    describe_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    last_history: Mutex<Vec<Turn>>,
}

impl MockChatProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every `generate` call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make `describe_model` fail until cleared with `accept_validation`.
    pub fn reject_validation(&self, error: ProviderError) {
        *lock(&self.validation_error) = Some(error);
    }

    pub fn accept_validation(&self) {
        *lock(&self.validation_error) = None;
    }

    pub fn push_reply(&self, text: impl Into<String>) {
        lock(&self.replies).push_back(Ok(Some(text.into())));
    }

    /// Queue a successful call that carries no text.
    pub fn push_empty_reply(&self) {
        lock(&self.replies).push_back(Ok(None));
    }

    pub fn push_failure(&self, error: ProviderError) {
        lock(&self.replies).push_back(Err(error));
    }

    pub fn describe_calls(&self) -> usize {
        self.describe_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// History sent on the most recent `generate` call.
    pub fn last_history(&self) -> Vec<Turn> {
        lock(&self.last_history).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn describe_model(
        &self,
        _credential: &Credential,
        model: &str,
    ) -> Result<ModelInfo, ProviderError> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = lock(&self.validation_error).clone() {
            return Err(error);
        }

        Ok(ModelInfo {
            name: format!("models/{}", model),
            display_name: Some(format!("Mock {}", model)),
            input_token_limit: Some(1_048_576),
            output_token_limit: Some(65_536),
        })
    }

    async fn generate(
        &self,
        _credential: &Credential,
        request: GenerateRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_history) = request.history.to_vec();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.replies).pop_front();
        let text = match scripted {
            Some(reply) => reply?,
            None => {
                let question = request
                    .history
                    .iter()
                    .rev()
                    .find(|turn| turn.role() == Role::User)
                    .map(|turn| turn.content())
                    .unwrap_or_default();
                Some(format!("Respuesta simulada a: {}", question))
            }
        };

        Ok(ProviderResponse {
            input_tokens: request.history.len() as u32 * 10,
            output_tokens: text.as_ref().map(|t| t.len() as u32 / 4).unwrap_or(0),
            text,
            finish_reason: FinishReason::Complete,
        })
    }
}
