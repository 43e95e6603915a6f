//! Model gateway: "submit image, get JSON back", independent of provider.
//!
//! [`VisionModel`] is the seam between the extraction agent and the network.
//! Two implementations ship with the crate:
//!
//! * [`OpenAiCompatibleGateway`] — talks directly to any OpenAI-compatible
//!   `/chat/completions` endpoint (OpenAI, vLLM, LiteLLM, OpenRouter, …) and
//!   attaches the schema as a native `json_schema` response format.
//! * [`ProviderGateway`] — wraps an `edgequake-llm` provider (openai,
//!   anthropic, gemini, ollama, …) and embeds the schema in the system
//!   instruction instead.
//!
//! Tests plug in their own deterministic implementation.
//!
//! ## Data Flow
//!
//! ```text
//! ImageInput ──▶ encode ──▶ provider call ──▶ json::extract_json ──▶ RawModelOutput
//!               (base64)    (network I/O)     (fences, prose)        (serde_json::Value)
//! ```

pub mod encode;
pub mod json;
pub mod openai;
pub mod provider;

pub use openai::{GatewayOptions, OpenAiCompatibleGateway};
pub use provider::ProviderGateway;

use crate::error::ProviderError;
use crate::input::ImageInput;
use crate::schema::OutputSchema;
use async_trait::async_trait;
use serde_json::Value;

/// Everything one model call needs.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub system_instruction: Option<&'a str>,
    pub image: &'a ImageInput,
    pub schema: &'a OutputSchema,
}

/// A structurally parseable model answer, not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelOutput {
    pub value: Value,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl RawModelOutput {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// A multimodal model that answers an image with JSON.
///
/// Implementations hold only read-only configuration and can be shared across
/// concurrent tasks behind an `Arc`.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Provider model identifier, for logs.
    fn model_id(&self) -> &str;

    /// Send one image and return the parsed JSON answer.
    ///
    /// Resolves when the provider answers or its timeout elapses. Either the
    /// returned value is well-formed JSON, or the call fails with a
    /// [`ProviderError`].
    async fn complete_with_image(&self, request: VisionRequest<'_>) -> Result<RawModelOutput, ProviderError>;
}
