//! Error types for the receipt2json library.
//!
//! Failures fall into three families that callers treat differently:
//!
//! * [`ConfigurationError`] — **Fatal**: the gateway cannot be built at all
//!   (missing `API_KEY`, empty endpoint). Raised at construction time, before
//!   any image is read.
//!
//! * [`ProviderError`] — **Per-item**: the network call failed (timeout,
//!   authentication, HTTP 5xx, unparseable body). A batch records it against
//!   the offending image and moves on.
//!
//! * [`SchemaViolationError`] — **Per-item**: the model answered, but the
//!   answer breaks the declared contract (unknown currency, payload that
//!   contradicts the document type, missing required field).
//!
//! [`ExtractError`] is the umbrella returned by the agent and stored in each
//! [`crate::output::ItemOutcome`]. All variants carry owned strings so an
//! outcome can be cloned and serialised into a report.

use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

/// The gateway could not be constructed from the supplied settings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No API credential was provided (or it was blank).
    #[error("API credential is missing.\nSet {var} in the environment or in a .env file.")]
    MissingCredential { var: String },

    /// No provider endpoint was provided (or it was blank).
    #[error("Provider endpoint is missing.\nSet {var} to an OpenAI-compatible base URL.")]
    MissingEndpoint { var: String },

    /// The endpoint is not an absolute HTTP/HTTPS URL.
    #[error("Invalid provider endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },

    /// No model identifier was provided (or it was blank).
    #[error("Model identifier is missing.\nSet MODEL_NAME or pass --model.")]
    MissingModel,

    /// The named provider could not be created by the provider factory.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A failed round-trip to the model provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Connection refused, DNS failure, TLS error, dropped body, …
    #[error("Network error talking to provider: {detail}")]
    Network { detail: String },

    /// The call did not finish in time.
    #[error("Provider call timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// HTTP 401/403. Retrying will not help.
    #[error("Authentication rejected by provider (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// HTTP 429. Caller should back off.
    #[error("Rate limit exceeded by provider")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success HTTP status.
    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The provider answered but the body could not be turned into JSON.
    #[error("Malformed provider response: {detail}")]
    MalformedResponse { detail: String },

    /// The provider answered with no choices or blank content.
    #[error("Provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Transport failures, timeouts, rate limits and 5xx responses are
    /// transient. Authentication failures, other 4xx statuses and malformed
    /// bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network { .. }
            | ProviderError::Timeout { .. }
            | ProviderError::RateLimited { .. }
            | ProviderError::EmptyResponse => true,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::Auth { .. } | ProviderError::MalformedResponse { .. } => false,
        }
    }

    /// Server-specified back-off, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

/// The model's answer does not satisfy the declared schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaViolationError {
    /// Structural failure: out-of-set enum value, missing required field,
    /// wrong JSON type, non-numeric price.
    #[error("Response does not match the {schema} schema: {detail}")]
    InvalidShape { schema: String, detail: String },

    /// The payload matching the document type is absent.
    #[error("document_type is {document_type} but {field} is null")]
    MissingPayload {
        document_type: String,
        field: String,
    },

    /// A payload that contradicts the document type is populated.
    #[error("document_type is {document_type} but {field} is populated")]
    UnexpectedPayload {
        document_type: String,
        field: String,
    },

    /// A non-payment document must carry `ocr_quality = nul`.
    #[error("document_type is not_payment_document but ocr_quality is {found}")]
    QualityMustBeNul { found: String },
}

/// Failures while discovering or reading input images.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InputError {
    /// The input directory does not exist.
    #[error("Input directory not found: '{path}'")]
    DirNotFound { path: PathBuf },

    /// The directory exists but holds no matching image.
    #[error("No {extensions} files found in '{path}'")]
    NoImages { path: PathBuf, extensions: String },

    /// A file could not be read.
    #[error("Failed to read '{path}': {detail}")]
    ReadFailed { path: PathBuf, detail: String },
}

/// Everything that can go wrong extracting one image or running a batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolationError),

    #[error(transparent)]
    Input(#[from] InputError),

    /// A batch was started with zero items.
    #[error("Nothing to process: the batch contains no images")]
    EmptyBatch,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Whether the retry policy may attempt this item again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractError::Provider(e) if e.is_retryable())
    }

    /// Short machine-friendly category name used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Configuration(_) => "configuration",
            ExtractError::Provider(_) => "provider",
            ExtractError::SchemaViolation(_) => "schema_violation",
            ExtractError::Input(_) => "input",
            ExtractError::EmptyBatch => "empty_batch",
            ExtractError::Internal(_) => "internal",
        }
    }
}

impl Serialize for ExtractError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ExtractError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credential_names_variable() {
        let e = ConfigurationError::MissingCredential {
            var: "API_KEY".into(),
        };
        assert!(e.to_string().contains("API_KEY"), "got: {e}");
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::Timeout { elapsed_ms: 10 }.is_retryable());
        assert!(ProviderError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!ProviderError::Auth {
            status: 401,
            detail: "bad key".into()
        }
        .is_retryable());
    }

    #[test]
    fn schema_violations_are_never_retryable() {
        let e: ExtractError = SchemaViolationError::QualityMustBeNul {
            found: "good".into(),
        }
        .into();
        assert!(!e.is_retryable());
        assert_eq!(e.kind(), "schema_violation");
    }

    #[test]
    fn rate_limit_exposes_retry_after() {
        let e = ProviderError::RateLimited {
            retry_after_secs: Some(7),
        };
        assert_eq!(e.retry_after_secs(), Some(7));
        assert_eq!(ProviderError::EmptyResponse.retry_after_secs(), None);
    }

    #[test]
    fn extract_error_serialises_kind_and_message() {
        let e = ExtractError::Provider(ProviderError::Timeout { elapsed_ms: 5000 });
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "provider");
        assert!(json["message"].as_str().unwrap().contains("5000ms"));
    }
}
