//! System prompts for VLM-based payment document extraction.
//!
//! Every instruction the model sees lives here so that a prompt change is a
//! one-file diff and unit tests can inspect the text without a provider.
//! Field-level guidance is not in these prompts: it travels with the JSON
//! Schema generated from [`crate::schema`].
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`].

use crate::schema::{OutputSchema, SchemaVersion};

/// Classification policy passed to the model on every current-contract call.
pub const CLASSIFICATION_POLICY: &str = "Classify the image as INVOICE, RECEIPT, or NOT_PAYMENT_DOCUMENT. \
Reject blurry, partial, or ambiguous images — do not attempt extraction on non-payment documents. \
Prioritize accuracy over completeness. Default to NOT_PAYMENT_DOCUMENT when uncertain.";

/// Default system prompt for the current three-way contract.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a specialized document recognition system focused on payment-related documents.
Your task is to analyze images and determine if they contain valid payment documents.

## DOCUMENT CLASSIFICATION:
First, classify the image into one of these categories:
1. INVOICE - A formal bill requesting payment for goods/services, typically includes: company details, invoice number, itemized charges, totals, payment terms
2. RECEIPT - Proof of completed payment, typically includes: vendor name, items purchased, prices, payment method, date/time, transaction number
3. NOT_PAYMENT_DOCUMENT - Any other type of document or image

## POLICY:
Classify the image as INVOICE, RECEIPT, or NOT_PAYMENT_DOCUMENT. Reject blurry, partial, or ambiguous images — do not attempt extraction on non-payment documents. Prioritize accuracy over completeness. Default to NOT_PAYMENT_DOCUMENT when uncertain.

## OUTPUT:
- Fill only the payload that matches document_type; the other payload must be null
- Use null for any optional field that is not visible on the document
- Copy numbers and text exactly as printed; do not compute missing values"#;

/// System prompt for the deprecated binary receipt contract.
pub const LEGACY_SYSTEM_PROMPT: &str = r#"You are a receipt recognition system.
Decide whether the image is a receipt. If it is, set is_document_receipt to true and fill receipt_data.
If it is not, set is_document_receipt to false and receipt_data to null. Do not try to parse anything else."#;

/// The built-in system prompt for a contract version.
pub fn default_system_prompt(version: SchemaVersion) -> &'static str {
    match version {
        SchemaVersion::Current => DEFAULT_SYSTEM_PROMPT,
        SchemaVersion::Legacy => LEGACY_SYSTEM_PROMPT,
    }
}

/// Append the response schema to an instruction.
///
/// Used by gateways whose provider cannot attach a `response_format`; the
/// model then sees the schema as plain text instead.
pub fn schema_instruction(system_instruction: Option<&str>, schema: &OutputSchema) -> String {
    let schema_text =
        serde_json::to_string_pretty(&schema.schema).unwrap_or_else(|_| schema.schema.to_string());
    let mut out = String::new();
    if let Some(instruction) = system_instruction {
        out.push_str(instruction);
        out.push_str("\n\n");
    }
    out.push_str(&format!(
        "Respond with a single JSON object named {} that conforms to this JSON Schema. \
Output ONLY the JSON object, without Markdown fences or commentary.\n\n{}",
        schema.name, schema_text
    ));
    out
}

/// Text of the user turn that carries the image.
pub const USER_TURN: &str = "Extract the payment document shown in this image.";
