//! Gateway over an `edgequake-llm` provider.
//!
//! Any provider the factory can build (openai, anthropic, gemini, ollama,
//! azure, …) becomes a [`VisionModel`]. The provider options carry only a
//! response *format* (`json_object`), not a schema, so the schema is appended
//! to the system message via [`schema_instruction`] and the reply is cleaned
//! by [`extract_json`].
//!
//! `LlmError` variants map onto [`ProviderError`] directly. Only the
//! catch-all variants (`ApiError`, `ProviderError`, `Unknown`) are classified
//! by their message text.

use super::encode::to_image_data;
use super::json::extract_json;
use super::{RawModelOutput, VisionModel, VisionRequest};
use crate::error::ProviderError;
use crate::prompts::{schema_instruction, USER_TURN};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, LlmError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

const JSON_OBJECT_FORMAT: &str = "json_object";

/// A shared provider plus the sampling options used for every call.
#[derive(Clone)]
pub struct ProviderGateway {
    provider: Arc<dyn LLMProvider>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl fmt::Debug for ProviderGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderGateway")
            .field("provider", &"<LLMProvider>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ProviderGateway {
    /// Wrap `provider`; `model` is the label reported in logs and results.
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            response_format: Some(JSON_OBJECT_FORMAT.to_string()),
            ..Default::default()
        }
    }

    /// System message (instruction + schema), then the image turn.
    fn messages(request: &VisionRequest<'_>) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(schema_instruction(request.system_instruction, request.schema)),
            ChatMessage::user_with_images(USER_TURN, vec![to_image_data(request.image)]),
        ]
    }
}

#[async_trait]
impl VisionModel for ProviderGateway {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete_with_image(&self, request: VisionRequest<'_>) -> Result<RawModelOutput, ProviderError> {
        let start = Instant::now();
        let messages = Self::messages(&request);

        let response = self
            .provider
            .chat(&messages, Some(&self.options()))
            .await
            .map_err(|e| classify_provider_error(e, start.elapsed().as_millis() as u64))?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.image.id,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let value = extract_json(&response.content)?;
        Ok(RawModelOutput {
            value,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Map a provider failure onto the [`ProviderError`] taxonomy.
fn classify_provider_error(err: LlmError, elapsed_ms: u64) -> ProviderError {
    match err {
        LlmError::AuthError(detail) => ProviderError::Auth { status: 401, detail },
        LlmError::RateLimited(_) => ProviderError::RateLimited {
            retry_after_secs: None,
        },
        LlmError::Timeout => ProviderError::Timeout { elapsed_ms },
        LlmError::NetworkError(detail) => ProviderError::Network { detail },
        LlmError::ModelNotFound(_) => ProviderError::Http {
            status: 404,
            body: err.to_string(),
        },
        LlmError::InvalidRequest(_)
        | LlmError::TokenLimitExceeded { .. }
        | LlmError::NotSupported(_)
        | LlmError::ConfigError(_) => ProviderError::Http {
            status: 400,
            body: err.to_string(),
        },
        LlmError::SerializationError(e) => ProviderError::MalformedResponse {
            detail: e.to_string(),
        },
        LlmError::ApiError(message) | LlmError::ProviderError(message) | LlmError::Unknown(message) => {
            classify_message(&message, elapsed_ms)
        }
    }
}

static RE_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([45]\d\d)\b").unwrap());

/// Classify an untyped provider message by status code and keywords.
fn classify_message(message: &str, elapsed_ms: u64) -> ProviderError {
    let lower = message.to_lowercase();
    let status = RE_STATUS
        .captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok());

    if lower.contains("timed out") || lower.contains("timeout") {
        return ProviderError::Timeout { elapsed_ms };
    }
    if status == Some(429) || lower.contains("rate limit") || lower.contains("too many requests") {
        return ProviderError::RateLimited {
            retry_after_secs: None,
        };
    }
    match status {
        Some(s @ (401 | 403)) => ProviderError::Auth {
            status: s,
            detail: message.to_string(),
        },
        Some(s) => ProviderError::Http {
            status: s,
            body: message.to_string(),
        },
        None if lower.contains("unauthorized") || lower.contains("api key") => ProviderError::Auth {
            status: 401,
            detail: message.to_string(),
        },
        None => ProviderError::Network {
            detail: message.to_string(),
        },
    }
}
