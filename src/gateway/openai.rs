//! Direct OpenAI-compatible `/chat/completions` gateway.
//!
//! ## Why not go through the provider factory?
//!
//! The extraction contract is only as good as the model's adherence to the
//! schema. OpenAI-compatible servers accept a native
//! `response_format: {"type": "json_schema", ...}` that constrains decoding,
//! which is far more reliable than pasting the schema into the prompt. The
//! generic provider abstraction has no slot for it, so this gateway builds the
//! request body itself.
//!
//! ## Message Layout
//!
//! 1. **System message** — classification policy (omitted when `None`)
//! 2. **User message** — a short text part plus the image as a base64 `data:`
//!    URL with `detail: "high"`

use super::encode::{data_url, IMAGE_DETAIL};
use super::json::extract_json;
use super::{RawModelOutput, VisionModel, VisionRequest};
use crate::error::{ConfigurationError, ProviderError};
use crate::prompts::USER_TURN;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Environment variable names reported in configuration errors.
pub const API_KEY_VAR: &str = "API_KEY";
pub const BASE_URL_VAR: &str = "OPEN_AI_API_COMPATABLE_BASE_URL";

/// Sampling and transport options for one gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayOptions {
    /// Sampling temperature. Default: 0.0 (transcription, not creativity).
    pub temperature: f32,
    /// Completion token cap. Default: 4096.
    pub max_tokens: usize,
    /// HTTP request timeout in seconds. Default: 60.
    pub timeout_secs: u64,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }
}

/// Gateway bound to one OpenAI-compatible endpoint, credential and model.
#[derive(Clone)]
pub struct OpenAiCompatibleGateway {
    client: reqwest::Client,
    completions_url: String,
    api_key: String,
    model: String,
    options: GatewayOptions,
}

impl fmt::Debug for OpenAiCompatibleGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleGateway")
            .field("completions_url", &self.completions_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("options", &self.options)
            .finish()
    }
}

impl OpenAiCompatibleGateway {
    /// Bind a gateway with default options.
    ///
    /// All validation happens here so a missing key stops the program before
    /// the first image is read.
    pub fn configure(endpoint: &str, credential: &str, model: &str) -> Result<Self, ConfigurationError> {
        Self::with_options(endpoint, credential, model, GatewayOptions::default())
    }

    pub fn with_options(
        endpoint: &str,
        credential: &str,
        model: &str,
        options: GatewayOptions,
    ) -> Result<Self, ConfigurationError> {
        if credential.trim().is_empty() {
            return Err(ConfigurationError::MissingCredential {
                var: API_KEY_VAR.to_string(),
            });
        }
        if endpoint.trim().is_empty() {
            return Err(ConfigurationError::MissingEndpoint {
                var: BASE_URL_VAR.to_string(),
            });
        }
        if model.trim().is_empty() {
            return Err(ConfigurationError::MissingModel);
        }

        let url = reqwest::Url::parse(endpoint.trim()).map_err(|e| ConfigurationError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigurationError::InvalidEndpoint {
                url: endpoint.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs.max(1)))
            .build()
            .map_err(|e| ConfigurationError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            completions_url: completions_url(endpoint.trim()),
            api_key: credential.trim().to_string(),
            model: model.trim().to_string(),
            options,
        })
    }

    pub fn completions_url(&self) -> &str {
        &self.completions_url
    }

    fn request_body<'a>(&'a self, request: &VisionRequest<'a>) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_instruction {
            messages.push(Message {
                role: "system",
                content: MessageContent::Text(system),
            });
        }
        messages.push(Message {
            role: "user",
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: USER_TURN.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: data_url(request.image),
                        detail: IMAGE_DETAIL,
                    },
                },
            ]),
        });

        ChatRequest {
            model: &self.model,
            messages,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: request.schema.name,
                    schema: &request.schema.schema,
                    strict: false,
                },
            },
        }
    }
}

#[async_trait]
impl VisionModel for OpenAiCompatibleGateway {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete_with_image(&self, request: VisionRequest<'_>) -> Result<RawModelOutput, ProviderError> {
        let body = self.request_body(&request);
        let started = Instant::now();

        let response = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, started))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body, retry_after));
        }

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&e, started))?;
        let output = parse_chat_response(&text)?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            request.image.id,
            output.input_tokens,
            output.output_tokens,
            started.elapsed()
        );
        Ok(output)
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// `https://host/v1` → `https://host/v1/chat/completions`.
fn completions_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}

fn transport_error(e: &reqwest::Error, started: Instant) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    } else {
        ProviderError::Network {
            detail: e.to_string(),
        }
    }
}

fn status_error(status: u16, body: &str, retry_after_secs: Option<u64>) -> ProviderError {
    let body: String = body.trim().chars().take(300).collect();
    match status {
        401 | 403 => ProviderError::Auth { status, detail: body },
        429 => ProviderError::RateLimited { retry_after_secs },
        _ => ProviderError::Http { status, body },
    }
}

fn parse_chat_response(text: &str) -> Result<RawModelOutput, ProviderError> {
    let response: ChatResponse =
        serde_json::from_str(text).map_err(|e| ProviderError::MalformedResponse {
            detail: format!("response body is not a chat completion: {e}"),
        })?;

    let usage = response.usage.unwrap_or_default();
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse)?;

    if let Some(refusal) = choice.message.refusal.filter(|r| !r.trim().is_empty()) {
        return Err(ProviderError::MalformedResponse {
            detail: format!("model refused: {refusal}"),
        });
    }
    if choice.finish_reason.as_deref() == Some("length") {
        return Err(ProviderError::MalformedResponse {
            detail: "output truncated at max_tokens".to_string(),
        });
    }

    let content = choice.message.content.unwrap_or_default();
    let value = extract_json(&content)?;
    Ok(RawModelOutput {
        value,
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    })
}
