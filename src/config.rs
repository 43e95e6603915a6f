//! Configuration types for receipt extraction.
//!
//! All extraction behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`] or read from the environment with
//! [`ExtractionConfig::from_env`]. [`resolve_model`] turns a config into the
//! [`VisionModel`] the agent talks to.

use crate::agent::ExtractionAgent;
use crate::error::ConfigurationError;
use crate::gateway::{GatewayOptions, OpenAiCompatibleGateway, ProviderGateway, VisionModel};
use crate::retry::RetryPolicy;
use crate::schema::SchemaVersion;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Model name used when `MODEL_NAME` is unset.
pub const DEFAULT_MODEL: &str = "no_model";

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use receipt2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4.1-mini")
///     .base_url("https://api.openai.com/v1")
///     .api_key("sk-...")
///     .concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier, e.g. "gpt-4.1-mini", "qwen2.5-vl-72b-instruct".
    pub model: Option<String>,

    /// Credential for the OpenAI-compatible endpoint.
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint, e.g. `https://host/v1`.
    pub base_url: Option<String>,

    /// `edgequake-llm` provider name ("openai", "anthropic", "ollama", …, or
    /// "auto" to detect from the environment). Takes precedence over
    /// `base_url` / `api_key`.
    pub provider_name: Option<String>,

    /// Pre-constructed `edgequake-llm` provider. Takes precedence over
    /// `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed model. Takes precedence over everything else.
    pub vision_model: Option<Arc<dyn VisionModel>>,

    /// Sampling temperature. Range 0.0–2.0. Default: 0.0.
    ///
    /// Extraction is transcription; any creativity shows up as invented
    /// digits.
    pub temperature: f32,

    /// Maximum tokens the model may generate per image. Default: 4096.
    ///
    /// A long invoice with dozens of line items easily exceeds 2 000 tokens
    /// of JSON. A truncated answer is reported as a malformed response.
    pub max_tokens: usize,

    /// Retries per image on transient provider failures. Default: 2.
    pub max_retries: u32,

    /// First retry delay in milliseconds; doubles per retry. Default: 500.
    pub retry_backoff_ms: u64,

    /// Cap on a single retry delay. Default: 8000.
    pub max_backoff_ms: u64,

    /// Randomise retry delays. Default: true.
    pub retry_jitter: bool,

    /// Images processed at once. Default: 1 (sequential).
    pub concurrency: usize,

    /// Deadline for one image including all retries. Default: 180.
    pub item_timeout_secs: u64,

    /// HTTP timeout for one model call. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses the contract's built-in prompt.
    pub system_prompt: Option<String>,

    /// Response contract. Default: [`SchemaVersion::Current`].
    pub schema_version: SchemaVersion,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            api_key: None,
            base_url: None,
            provider_name: None,
            provider: None,
            vision_model: None,
            temperature: 0.0,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_backoff_ms: 8_000,
            retry_jitter: true,
            concurrency: 1,
            item_timeout_secs: 180,
            api_timeout_secs: 60,
            system_prompt: None,
            schema_version: SchemaVersion::Current,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("vision_model", &self.vision_model.as_ref().map(|m| m.model_id().to_string()))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_backoff_ms", &self.max_backoff_ms)
            .field("retry_jitter", &self.retry_jitter)
            .field("concurrency", &self.concurrency)
            .field("item_timeout_secs", &self.item_timeout_secs)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("system_prompt", &self.system_prompt.as_ref().map(|p| p.len()))
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus `MODEL_NAME`, `API_KEY`, `OPEN_AI_API_COMPATABLE_BASE_URL`
    /// and `EDGEQUAKE_PROVIDER` from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            model: Some(get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string())),
            api_key: get("API_KEY"),
            base_url: get("OPEN_AI_API_COMPATABLE_BASE_URL"),
            provider_name: get("EDGEQUAKE_PROVIDER"),
            ..Self::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff_ms: self.retry_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            jitter: self.retry_jitter,
        }
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_secs: self.api_timeout_secs,
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn vision_model(mut self, model: Arc<dyn VisionModel>) -> Self {
        self.config.vision_model = Some(model);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.config.max_backoff_ms = ms;
        self
    }

    pub fn retry_jitter(mut self, v: bool) -> Self {
        self.config.retry_jitter = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn item_timeout_secs(mut self, secs: u64) -> Self {
        self.config.item_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn schema_version(mut self, version: SchemaVersion) -> Self {
        self.config.schema_version = version;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ConfigurationError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ConfigurationError::InvalidConfig("Concurrency must be ≥ 1".into()));
        }
        if c.item_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "Item timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ConfigurationError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.max_backoff_ms < c.retry_backoff_ms {
            return Err(ConfigurationError::InvalidConfig(format!(
                "max_backoff_ms ({}) is below retry_backoff_ms ({})",
                c.max_backoff_ms, c.retry_backoff_ms
            )));
        }
        Ok(self.config)
    }
}

// ── Model resolution ─────────────────────────────────────────────────────────

/// Resolve the model the agent should talk to, most specific first:
///
/// 1. `vision_model`
/// 2. `provider`, wrapped in a [`ProviderGateway`]
/// 3. `provider_name` via `ProviderFactory` ("auto" detects from env)
/// 4. OpenAI-compatible endpoint from `base_url` + `api_key`
///
/// Step 4 is the fallback, so a config with nothing set fails with
/// [`ConfigurationError::MissingCredential`] before any image is read.
pub fn resolve_model(config: &ExtractionConfig) -> Result<Arc<dyn VisionModel>, ConfigurationError> {
    if let Some(ref model) = config.vision_model {
        return Ok(Arc::clone(model));
    }

    let model_name = config.model.as_deref().map(str::trim).filter(|m| !m.is_empty());

    if let Some(ref provider) = config.provider {
        let label = model_name.unwrap_or("provider-default");
        return Ok(Arc::new(wrap_provider(Arc::clone(provider), label, config)));
    }

    if let Some(ref name) = config.provider_name {
        let provider = if name.eq_ignore_ascii_case("auto") {
            let (llm, _) = ProviderFactory::from_env().map_err(|e| ConfigurationError::ProviderNotConfigured {
                provider: "auto".to_string(),
                hint: format!("No LLM provider auto-detected: {e}"),
            })?;
            llm
        } else {
            let model = model_name.ok_or(ConfigurationError::MissingModel)?;
            ProviderFactory::create_llm_provider(name, model).map_err(|e| {
                ConfigurationError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("{e}"),
                }
            })?
        };
        let label = model_name.unwrap_or(name.as_str());
        debug!("Using edgequake-llm provider '{}' ({})", name, label);
        return Ok(Arc::new(wrap_provider(provider, label, config)));
    }

    let gateway = OpenAiCompatibleGateway::with_options(
        config.base_url.as_deref().unwrap_or_default(),
        config.api_key.as_deref().unwrap_or_default(),
        model_name.unwrap_or_default(),
        config.gateway_options(),
    )?;
    debug!("Using OpenAI-compatible endpoint {}", gateway.completions_url());
    Ok(Arc::new(gateway))
}

fn wrap_provider(provider: Arc<dyn LLMProvider>, label: &str, config: &ExtractionConfig) -> ProviderGateway {
    ProviderGateway::new(provider, label)
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
}

/// [`resolve_model`] plus the contract and system prompt from the same config.
pub fn resolve_agent(config: &ExtractionConfig) -> Result<ExtractionAgent, ConfigurationError> {
    Ok(ExtractionAgent::from_config(resolve_model(config)?, config))
}
