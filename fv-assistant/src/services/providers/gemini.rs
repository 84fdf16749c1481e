//! Gemini AI provider implementation.
//!
//! Implements metadata lookup and non-streaming text generation against the
//! Gemini REST API. The key travels in the `x-goog-api-key` header so request
//! URLs (which reqwest includes in its errors) never contain it.

use super::{
    ChatProvider, FinishReason, GenerateRequest, ModelInfo, ProviderError, ProviderResponse,
};
use crate::models::{Role, SamplingParams, Turn};
use crate::services::credential::Credential;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Longest provider error body carried into a diagnostic.
const MAX_ERROR_BODY: usize = 512;

/// Gemini text provider.
pub struct GeminiProvider {
    api_base: String,
    client: Client,
}

impl GeminiProvider {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// `{base}/models/{model}` plus an optional `:method` suffix.
    fn model_url(&self, model: &str, method: Option<&str>) -> String {
        let model = model.trim_start_matches("models/");
        match method {
            Some(method) => format!("{}/models/{}:{}", self.api_base, model, method),
            None => format!("{}/models/{}", self.api_base, model),
        }
    }

    async fn error_from_response(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        classify_error(status, &body)
    }
}

/// Map a non-success HTTP status and body to a provider error.
fn classify_error(status: StatusCode, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(MAX_ERROR_BODY).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized(message),
        // Gemini answers an invalid key with 400 INVALID_ARGUMENT.
        StatusCode::BAD_REQUEST if body.contains("API_KEY_INVALID") => {
            ProviderError::Unauthorized(message)
        }
        StatusCode::NOT_FOUND => ProviderError::ModelNotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        _ => ProviderError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

fn build_request(request: &GenerateRequest<'_>) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Some(Content {
            role: None,
            parts: vec![Part::text(request.system_instruction)],
        }),
        contents: request.history.iter().map(Content::from_turn).collect(),
        generation_config: Some(GenerationConfig::from(request.sampling)),
    }
}

fn parse_response(api_response: GenerateContentResponse) -> Result<ProviderResponse, ProviderError> {
    let usage = api_response.usage_metadata.unwrap_or_default();

    let Some(candidate) = api_response.candidates.into_iter().next() else {
        return match api_response
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            Some(reason) => Err(ProviderError::ContentFiltered(reason)),
            None => Err(ProviderError::MalformedResponse(
                "response has no candidates".to_string(),
            )),
        };
    };

    let finish_reason = match candidate.finish_reason.as_deref() {
        Some("STOP") | None => FinishReason::Complete,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some(reason @ ("SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT")) => {
            return Err(ProviderError::ContentFiltered(reason.to_string()));
        }
        Some(_) => FinishReason::Other,
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought.unwrap_or(false))
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    Ok(ProviderResponse {
        text: if text.is_empty() { None } else { Some(text) },
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage.candidates_token_count.unwrap_or(0),
        finish_reason,
    })
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn describe_model(
        &self,
        credential: &Credential,
        model: &str,
    ) -> Result<ModelInfo, ProviderError> {
        let url = self.model_url(model, None);

        tracing::debug!(model = %model, "Looking up Gemini model metadata");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, credential.expose())
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let metadata: ModelMetadata = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("model metadata: {}", e)))?;

        Ok(ModelInfo {
            name: metadata.name,
            display_name: metadata.display_name,
            input_token_limit: metadata.input_token_limit,
            output_token_limit: metadata.output_token_limit,
        })
    }

    async fn generate(
        &self,
        credential: &Credential,
        request: GenerateRequest<'_>,
    ) -> Result<ProviderResponse, ProviderError> {
        let body = build_request(&request);
        let url = self.model_url(request.model, Some("generateContent"));

        tracing::debug!(
            model = %request.model,
            turns = request.history.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

        parse_response(api_response)
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn from_turn(turn: &Turn) -> Self {
        // Gemini names the assistant side "model".
        let role = match turn.role() {
            Role::User => "user",
            Role::Assistant => "model",
        };
        Self {
            role: Some(role.to_string()),
            parts: vec![Part::text(turn.content())],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            thought: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

impl From<&SamplingParams> for GenerationConfig {
    fn from(params: &SamplingParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelMetadata {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    input_token_limit: Option<u32>,
    #[serde(default)]
    output_token_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConversationState, SystemPolicy};
    use serde_json::json;

    fn history() -> Vec<Turn> {
        let mut state = ConversationState::new();
        state.append_user("¿Cuántas placas necesito?");
        state.append_assistant("Depende del consumo anual.");
        state.append_user("Unos 3500 kWh al año.");
        state.snapshot()
    }

    #[test]
    fn request_carries_history_instruction_and_sampling() {
        let policy = SystemPolicy::photovoltaic();
        let turns = history();
        let request = GenerateRequest {
            model: "gemini-2.5-flash",
            system_instruction: policy.system_instruction(),
            sampling: policy.sampling(),
            history: &turns,
        };

        let body = serde_json::to_value(build_request(&request)).unwrap();

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "Unos 3500 kWh al año.");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            policy.system_instruction()
        );
        assert!(body["systemInstruction"].get("role").is_none());
        let temperature = body["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.4).abs() < 1e-6);
        assert!(body["generationConfig"].get("topK").is_none());
    }

    #[test]
    fn parses_text_and_usage() {
        let raw = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Necesitas unas "},
                    {"text": "8 placas."}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 14}
        });
        let response = parse_response(serde_json::from_value(raw).unwrap()).unwrap();

        assert_eq!(response.text.as_deref(), Some("Necesitas unas 8 placas."));
        assert_eq!(response.input_tokens, 120);
        assert_eq!(response.output_tokens, 14);
        assert_eq!(response.finish_reason, FinishReason::Complete);
    }

    #[test]
    fn thought_parts_are_skipped() {
        let raw = json!({
            "candidates": [{
                "content": {"parts": [
                    {"text": "pensando...", "thought": true},
                    {"text": "Respuesta final."}
                ]},
                "finishReason": "STOP"
            }]
        });
        let response = parse_response(serde_json::from_value(raw).unwrap()).unwrap();
        assert_eq!(response.text.as_deref(), Some("Respuesta final."));
    }

    #[test]
    fn safety_stop_is_content_filtered() {
        let raw = json!({"candidates": [{"finishReason": "SAFETY"}]});
        let err = parse_response(serde_json::from_value(raw).unwrap()).unwrap_err();
        assert_eq!(err, ProviderError::ContentFiltered("SAFETY".into()));
    }

    #[test]
    fn blocked_prompt_is_content_filtered() {
        let raw = json!({"promptFeedback": {"blockReason": "OTHER"}});
        let err = parse_response(serde_json::from_value(raw).unwrap()).unwrap_err();
        assert_eq!(err, ProviderError::ContentFiltered("OTHER".into()));
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let err = parse_response(serde_json::from_value(json!({})).unwrap()).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn empty_text_yields_none() {
        let raw = json!({"candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]});
        let response = parse_response(serde_json::from_value(raw).unwrap()).unwrap();
        assert!(response.text.is_none());
        assert_eq!(response.finish_reason, FinishReason::Length);
    }

    #[test]
    fn classifies_provider_errors() {
        let invalid_key = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#;
        assert_eq!(
            classify_error(StatusCode::BAD_REQUEST, invalid_key),
            ProviderError::Unauthorized("API key not valid.".into())
        );
        assert!(matches!(
            classify_error(StatusCode::NOT_FOUND, r#"{"error":{"message":"models/x is not found"}}"#),
            ProviderError::ModelNotFound(_)
        ));
        assert_eq!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited
        );
        assert_eq!(
            classify_error(StatusCode::BAD_GATEWAY, "upstream down"),
            ProviderError::ApiError {
                status: 502,
                message: "upstream down".into()
            }
        );
    }

    #[test]
    fn model_url_accepts_prefixed_ids() {
        let provider = GeminiProvider::new("https://example.test/v1beta/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            provider.model_url("models/gemini-2.5-flash", Some("generateContent")),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
        assert_eq!(
            provider.model_url("gemini-2.5-flash", None),
            "https://example.test/v1beta/models/gemini-2.5-flash"
        );
    }
}
