//! Model provider abstraction.
//!
//! The relay talks to a [`ChatProvider`]; production uses Gemini, tests use
//! the scripted mock.

pub mod gemini;
pub mod mock;

use crate::models::{SamplingParams, Turn};
use crate::services::credential::Credential;
use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Model metadata returned by the validation lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: Option<String>,
    pub input_token_limit: Option<u32>,
    pub output_token_limit: Option<u32>,
}

/// One stateless generation call: the whole transcript plus the bound policy.
#[derive(Debug, Clone, Copy)]
pub struct GenerateRequest<'a> {
    pub model: &'a str,
    pub system_instruction: &'a str,
    pub sampling: &'a SamplingParams,
    pub history: &'a [Turn],
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    Other,
}

/// Result of a provider response.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// Concatenated text parts of the first candidate.
    pub text: Option<String>,

    /// Input tokens consumed.
    pub input_tokens: u32,

    /// Output tokens generated.
    pub output_tokens: u32,

    pub finish_reason: FinishReason,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Look up model metadata; doubles as the credential check.
    async fn describe_model(
        &self,
        credential: &Credential,
        model: &str,
    ) -> Result<ModelInfo, ProviderError>;

    /// Generate the next assistant message for `request.history`.
    async fn generate(
        &self,
        credential: &Credential,
        request: GenerateRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError>;
}
