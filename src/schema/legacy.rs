//! The first-generation response shape: a yes/no receipt flag and nothing else.
//!
//! Kept so callers pinned to the binary contract keep working. New code should
//! use [`crate::schema::SchemaVersion::Current`].

#![allow(deprecated)]

use super::document::ExtractionResult;
use super::types::{nullable, require_keys, OcrQuality, ReceiptData};
use crate::error::SchemaViolationError;
use schemars::{JsonSchema, Schema};
use serde::{Deserialize, Serialize};

#[deprecated(
    since = "0.1.0",
    note = "binary receipt contract; use SchemaVersion::Current and ExtractionResult"
)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(title = "OcrResponse", transform = require_receipt_key)]
pub struct LegacyReceiptResponse {
    /// Whether the image is a document receipt. Do not try to parse the result if this is false.
    pub is_document_receipt: bool,
    /// Receipt data extracted from the image
    #[serde(deserialize_with = "nullable")]
    pub receipt_data: Option<ReceiptData>,
}

fn require_receipt_key(schema: &mut Schema) {
    require_keys(schema, &["receipt_data"]);
}

impl TryFrom<LegacyReceiptResponse> for ExtractionResult {
    type Error = SchemaViolationError;

    /// The binary shape has no quality signal, so receipts come back with
    /// `ocr_quality = nul` ("not assessed").
    fn try_from(raw: LegacyReceiptResponse) -> Result<Self, Self::Error> {
        match (raw.is_document_receipt, raw.receipt_data) {
            (true, Some(receipt)) => Ok(ExtractionResult::receipt(receipt, OcrQuality::Nul)),
            (false, None) => Ok(ExtractionResult::not_payment_document()),
            (true, None) => Err(SchemaViolationError::MissingPayload {
                document_type: "receipt".into(),
                field: "receipt_data".into(),
            }),
            (false, Some(_)) => Err(SchemaViolationError::UnexpectedPayload {
                document_type: "not_payment_document".into(),
                field: "receipt_data".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::DocumentType;
    use serde_json::json;

    #[test]
    fn non_receipt_maps_to_not_payment_document() {
        let raw: LegacyReceiptResponse =
            serde_json::from_value(json!({"is_document_receipt": false, "receipt_data": null}))
                .unwrap();
        let result = ExtractionResult::try_from(raw).unwrap();
        assert_eq!(result.document_type(), DocumentType::NotPaymentDocument);
        assert_eq!(result.ocr_quality(), OcrQuality::Nul);
    }

    #[test]
    fn omitted_receipt_key_is_rejected() {
        let err = serde_json::from_value::<LegacyReceiptResponse>(json!({"is_document_receipt": false}))
            .unwrap_err();
        assert!(err.to_string().contains("receipt_data"), "got: {err}");
    }

    #[test]
    fn receipt_flag_without_data_is_rejected() {
        let raw = LegacyReceiptResponse {
            is_document_receipt: true,
            receipt_data: None,
        };
        assert!(matches!(
            ExtractionResult::try_from(raw),
            Err(SchemaViolationError::MissingPayload { .. })
        ));
    }
}
