//! # receipt2json
//!
//! Extract structured data from photographed receipts and invoices using
//! Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Classic OCR turns a receipt photo into a bag of words; it does not know
//! which number is the total or which line is the merchant. A VLM reads the
//! photo as a human would, but its free-form answer is unreliable. This crate
//! pins the answer to a strict, typed contract: every result is either a
//! validated [`ExtractionResult`] or a typed error saying exactly what was
//! wrong.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Input     read bytes, sniff media type
//!  ├─ 2. Gateway   image + policy + JSON Schema → provider → raw JSON
//!  ├─ 3. Validate  serde against the declared contract (no coercion)
//!  └─ 4. Report    per-image outcome, batch summary, observer events
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt2json::{resolve_model, ExtractionAgent, ExtractionConfig, ImageInput};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // MODEL_NAME, API_KEY, OPEN_AI_API_COMPATABLE_BASE_URL
//!     let config = ExtractionConfig::from_env();
//!     let agent = ExtractionAgent::new(resolve_model(&config)?);
//!     let image = ImageInput::load("files_to_ocr/receipt.jpg").await?;
//!     let result = agent.extract(&image).await?;
//!     println!("{}", result.to_pretty_json());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt2json` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! receipt2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod agent;
pub mod batch;
pub mod config;
pub mod error;
pub mod gateway;
pub mod input;
pub mod output;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod schema;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use agent::ExtractionAgent;
pub use batch::BatchRunner;
pub use config::{resolve_agent, resolve_model, ExtractionConfig, ExtractionConfigBuilder};
pub use error::{ConfigurationError, ExtractError, InputError, ProviderError, SchemaViolationError};
pub use gateway::{
    GatewayOptions, OpenAiCompatibleGateway, ProviderGateway, RawModelOutput, VisionModel, VisionRequest,
};
pub use input::{discover_images, ImageInput};
pub use output::{BatchReport, ItemOutcome};
pub use progress::{BatchObserver, NoopObserver, SharedObserver, TracingObserver};
pub use retry::RetryPolicy;
pub use schema::{
    parse_output, Currency, DocumentPayload, DocumentType, ExtractionResult, InvoiceData, LineItem, OcrQuality,
    OutputSchema, Party, PaymentMethod, ReceiptData, SchemaVersion,
};
pub use stream::{extract_stream, extract_stream_paths, OutcomeStream};
