//! Schema registry: the contract every extraction must satisfy.
//!
//! One set of Rust types serves two consumers:
//!
//! * **serde** — [`parse_output`] deserialises the model's JSON into the typed
//!   structs. Closed enums reject out-of-set values (`"JPY"`), missing required
//!   fields and non-numeric prices, and the `TryFrom` conversions reject
//!   payloads that contradict `document_type`.
//! * **schemars** — [`SchemaVersion::output_schema`] renders the same types as a
//!   JSON Schema whose property descriptions come from the field doc comments.
//!   The gateway sends it to the model as the response format.
//!
//! Because both sides are derived from the same definitions, the prompt can
//! never drift from the validator.

pub mod document;
pub mod legacy;
pub mod types;

pub use document::{DocumentPayload, ExtractionResult, RawExtraction};
#[allow(deprecated)]
pub use legacy::LegacyReceiptResponse;
pub use types::{Currency, DocumentType, InvoiceData, LineItem, OcrQuality, Party, PaymentMethod, ReceiptData};

use crate::error::SchemaViolationError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which response contract the agent asks for and validates against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    /// Three-way classification with receipt/invoice payloads, quality and
    /// reasoning. (default)
    #[default]
    Current,
    /// Deprecated binary "is this a receipt" contract.
    Legacy,
}

/// A named JSON Schema ready to be attached to a model request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: &'static str,
    pub schema: Value,
}

static CURRENT_SCHEMA: Lazy<OutputSchema> = Lazy::new(|| OutputSchema {
    name: "ocr_response",
    schema: serde_json::to_value(schemars::schema_for!(RawExtraction)).unwrap_or_default(),
});

#[allow(deprecated)]
static LEGACY_SCHEMA: Lazy<OutputSchema> = Lazy::new(|| OutputSchema {
    name: "legacy_ocr_response",
    schema: serde_json::to_value(schemars::schema_for!(LegacyReceiptResponse)).unwrap_or_default(),
});

impl SchemaVersion {
    /// The JSON Schema for this contract. Built once per process.
    pub fn output_schema(self) -> &'static OutputSchema {
        match self {
            SchemaVersion::Current => &CURRENT_SCHEMA,
            SchemaVersion::Legacy => &LEGACY_SCHEMA,
        }
    }
}

/// Validate a raw model answer against the selected contract.
///
/// The value is returned unchanged in typed form; nothing is corrected or
/// defaulted. Any structural problem yields a [`SchemaViolationError`].
#[allow(deprecated)]
pub fn parse_output(value: Value, version: SchemaVersion) -> Result<ExtractionResult, SchemaViolationError> {
    let schema = version.output_schema().name;
    let invalid = |e: serde_json::Error| SchemaViolationError::InvalidShape {
        schema: schema.to_string(),
        detail: e.to_string(),
    };

    match version {
        SchemaVersion::Current => {
            let raw: RawExtraction = serde_json::from_value(value).map_err(invalid)?;
            ExtractionResult::try_from(raw)
        }
        SchemaVersion::Legacy => {
            let raw: LegacyReceiptResponse = serde_json::from_value(value).map_err(invalid)?;
            ExtractionResult::try_from(raw)
        }
    }
}
