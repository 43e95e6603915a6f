//! Extraction agent: one image in, one validated [`ExtractionResult`] out.
//!
//! ## Algorithm
//!
//! 1. Send the image, the system instruction and the contract's JSON Schema
//!    to the [`VisionModel`]
//! 2. Validate the returned JSON with [`parse_output`]: any out-of-set enum,
//!    missing required field, payload contradicting `document_type`, or
//!    failed type coercion is a [`SchemaViolationError`]
//! 3. Return the validated result unchanged. Arithmetic that does not add up
//!    is logged at `warn`, never corrected.
//!
//! The agent does not retry. Retrying is the batch runner's decision, driven
//! by [`crate::retry::RetryPolicy`].
//!
//! [`SchemaViolationError`]: crate::error::SchemaViolationError

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::gateway::{VisionModel, VisionRequest};
use crate::input::ImageInput;
use crate::prompts::default_system_prompt;
use crate::schema::{parse_output, ExtractionResult, SchemaVersion};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Binds a model to a contract and a system instruction.
///
/// Cheap to clone; share one agent across a batch behind an `Arc`.
#[derive(Clone)]
pub struct ExtractionAgent {
    model: Arc<dyn VisionModel>,
    schema_version: SchemaVersion,
    system_prompt: Option<String>,
}

impl fmt::Debug for ExtractionAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionAgent")
            .field("model", &self.model.model_id())
            .field("schema_version", &self.schema_version)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .finish()
    }
}

impl ExtractionAgent {
    /// Agent using the current contract and its built-in system prompt.
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self {
            model,
            schema_version: SchemaVersion::Current,
            system_prompt: None,
        }
    }

    /// Agent using the contract and system prompt selected in `config`.
    pub fn from_config(model: Arc<dyn VisionModel>, config: &ExtractionConfig) -> Self {
        let agent = Self::new(model).with_schema_version(config.schema_version);
        match config.system_prompt {
            Some(ref prompt) => agent.with_system_prompt(prompt.clone()),
            None => agent,
        }
    }

    /// Select the response contract.
    ///
    /// [`SchemaVersion::Legacy`] is deprecated and kept for callers still
    /// consuming the binary receipt shape.
    pub fn with_schema_version(mut self, version: SchemaVersion) -> Self {
        self.schema_version = version;
        self
    }

    /// Replace the built-in system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// The instruction sent with every request.
    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or_else(|| default_system_prompt(self.schema_version))
    }

    /// Classify and extract one image with the configured contract.
    pub async fn extract(&self, image: &ImageInput) -> Result<ExtractionResult, ExtractError> {
        self.extract_with(image, Some(self.system_prompt()), self.schema_version)
            .await
    }

    /// Explicit form of [`extract`](Self::extract).
    ///
    /// `system_instruction = None` sends no system message at all.
    pub async fn extract_with(
        &self,
        image: &ImageInput,
        system_instruction: Option<&str>,
        schema_version: SchemaVersion,
    ) -> Result<ExtractionResult, ExtractError> {
        let start = Instant::now();
        let request = VisionRequest {
            system_instruction,
            image,
            schema: schema_version.output_schema(),
        };

        // ── Step 1: Model call ───────────────────────────────────────────────
        let raw = self.model.complete_with_image(request).await?;
        debug!(
            "{}: model answered in {:?} ({} input / {} output tokens)",
            image.id,
            start.elapsed(),
            raw.input_tokens,
            raw.output_tokens
        );

        // ── Step 2: Validate ─────────────────────────────────────────────────
        let result = parse_output(raw.value, schema_version)?;

        // ── Step 3: Soft checks ──────────────────────────────────────────────
        for note in result.consistency_notes() {
            warn!("{}: {}", image.id, note);
        }

        Ok(result)
    }

    /// Blocking wrapper around [`extract`](Self::extract).
    ///
    /// Creates a fresh tokio runtime; do not call from inside an async
    /// context.
    pub fn extract_sync(&self, image: &ImageInput) -> Result<ExtractionResult, ExtractError> {
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {e}")))?;
        rt.block_on(self.extract(image))
    }
}
