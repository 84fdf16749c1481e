//! Model session factory.
//!
//! Opening a session is two-phase: [`validate`] checks the credential and
//! model identifier against the provider, then [`bind`] attaches the fixed
//! [`SystemPolicy`]. A [`ModelSession`] keeps no conversation history of its
//! own; every call carries the full transcript.

use crate::error::{RelayError, StartupError};
use crate::models::{SystemPolicy, Turn};
use crate::services::credential::{resolve_credential, Credential, SecretStore};
use crate::services::metrics;
use crate::services::providers::{
    ChatProvider, FinishReason, GenerateRequest, ModelInfo, ProviderError,
};
use std::sync::Arc;

/// Credential and model identifier the provider accepted.
pub struct ValidatedModel {
    provider: Arc<dyn ChatProvider>,
    credential: Credential,
    model_id: String,
    info: ModelInfo,
}

impl std::fmt::Debug for ValidatedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedModel")
            .field("model_id", &self.model_id)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ValidatedModel {
    pub fn info(&self) -> &ModelInfo {
        &self.info
    }
}

/// Eager metadata lookup so a bad key or a retired model id fails at session
/// start instead of on the first question.
pub async fn validate(
    provider: Arc<dyn ChatProvider>,
    credential: Credential,
    model_id: &str,
) -> Result<ValidatedModel, StartupError> {
    let info = provider
        .describe_model(&credential, model_id)
        .await
        .map_err(|e| startup_error(&credential, model_id, e))?;

    tracing::info!(
        model = %model_id,
        display_name = info.display_name.as_deref().unwrap_or("-"),
        input_token_limit = info.input_token_limit,
        output_token_limit = info.output_token_limit,
        "Model validated"
    );

    Ok(ValidatedModel {
        provider,
        credential,
        model_id: model_id.to_string(),
        info,
    })
}

fn startup_error(credential: &Credential, model_id: &str, error: ProviderError) -> StartupError {
    let detail = credential.scrub(&error.to_string());
    match error {
        ProviderError::ModelNotFound(_) => StartupError::ModelUnavailable {
            model: model_id.to_string(),
            detail,
        },
        ProviderError::ApiError { status, .. } if status >= 500 => StartupError::ModelUnavailable {
            model: model_id.to_string(),
            detail,
        },
        _ => StartupError::ConnectionRejected(detail),
    }
}

/// Attach the policy. The binding cannot change for the session's lifetime.
pub fn bind(validated: ValidatedModel, policy: Arc<SystemPolicy>) -> ModelSession {
    ModelSession {
        provider: validated.provider,
        credential: validated.credential,
        model_id: validated.model_id,
        policy,
    }
}

/// Open conversational channel owned by a single UI session.
pub struct ModelSession {
    provider: Arc<dyn ChatProvider>,
    credential: Credential,
    model_id: String,
    policy: Arc<SystemPolicy>,
}

impl std::fmt::Debug for ModelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSession")
            .field("model_id", &self.model_id)
            .finish_non_exhaustive()
    }
}

impl ModelSession {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn policy(&self) -> &SystemPolicy {
        &self.policy
    }

    /// One request, one response: the full `history` goes out, the assistant
    /// text comes back.
    pub async fn generate(&self, history: &[Turn]) -> Result<String, RelayError> {
        let request = GenerateRequest {
            model: &self.model_id,
            system_instruction: self.policy.system_instruction(),
            sampling: self.policy.sampling(),
            history,
        };

        let response = self
            .provider
            .generate(&self.credential, request)
            .await
            .map_err(|e| self.relay_error(e))?;

        tracing::info!(
            model = %self.model_id,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            truncated = response.finish_reason == FinishReason::Length,
            "Model responded"
        );

        match response.text {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(RelayError::MalformedResponse(
                "the model returned an empty response".to_string(),
            )),
        }
    }

    fn relay_error(&self, error: ProviderError) -> RelayError {
        let detail = self.credential.scrub(&error.to_string());
        match error {
            ProviderError::NetworkError(_) => RelayError::Network(detail),
            ProviderError::MalformedResponse(_) => RelayError::MalformedResponse(detail),
            _ => RelayError::Provider(detail),
        }
    }
}

/// Everything needed to open a [`ModelSession`]; shared read-only by all UI
/// sessions, each of which calls [`SessionFactory::create_session`] itself.
pub struct SessionFactory {
    secrets: Arc<dyn SecretStore>,
    provider: Arc<dyn ChatProvider>,
    model_id: String,
    policy: Arc<SystemPolicy>,
}

impl SessionFactory {
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        provider: Arc<dyn ChatProvider>,
        model_id: impl Into<String>,
        policy: Arc<SystemPolicy>,
    ) -> Self {
        Self {
            secrets,
            provider,
            model_id: model_id.into(),
            policy,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Resolve the credential, validate it with the model id, bind the policy.
    #[tracing::instrument(skip(self), fields(model = %self.model_id))]
    pub async fn create_session(&self) -> Result<ModelSession, StartupError> {
        let result = async {
            let credential = resolve_credential(self.secrets.as_ref())?;
            let validated = validate(self.provider.clone(), credential, &self.model_id).await?;
            Ok::<_, StartupError>(bind(validated, self.policy.clone()))
        }
        .await;

        match &result {
            Ok(_) => {
                metrics::record_model_session("ok");
                tracing::info!("Model session opened");
            }
            Err(e) => {
                metrics::record_model_session(e.kind());
                tracing::error!(kind = e.kind(), error = %e, "Model session could not be opened");
            }
        }

        result
    }
}
