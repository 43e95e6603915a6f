//! The top-level extraction record and its cross-field rules.
//!
//! The model speaks the flat [`RawExtraction`] shape: a `document_type` tag
//! plus two nullable payload fields. Inside the crate the same data lives in
//! [`ExtractionResult`], whose payload is a [`DocumentPayload`] sum type, so a
//! receipt that also carries invoice data simply cannot be represented. The
//! conversion between the two is the one place where the "payload matches the
//! tag" rule is checked.

use super::types::{nullable, require_keys, DocumentType, InvoiceData, LineItem, OcrQuality, ReceiptData};
use crate::error::SchemaViolationError;
use schemars::{JsonSchema, Schema};
use serde::{Deserialize, Serialize};

/// Wire shape of one extraction, exactly as the model is asked to produce it.
// Payload keys are required; their values are nullable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[schemars(title = "OcrResponse", transform = require_payload_keys)]
pub struct RawExtraction {
    /// Pick one of the document type enum values. If it can't be determined, use not_payment_document and do not try to extract the document.
    pub document_type: DocumentType,
    /// Receipt data extracted from the image. Must be null unless document_type is receipt.
    #[serde(deserialize_with = "nullable")]
    pub receipt_data: Option<ReceiptData>,
    /// Invoice data extracted from the image. Must be null unless document_type is invoice.
    #[serde(deserialize_with = "nullable")]
    pub invoice_data: Option<InvoiceData>,
    /// How confident you are in the OCR quality. Set nul if there was no OCR done.
    #[serde(alias = "ocr_quality_confidence")]
    pub ocr_quality: OcrQuality,
    /// Reasoning commentary if there is anything to explain about low OCR quality confidence.
    pub reasoning_commentary: Option<String>,
}

fn require_payload_keys(schema: &mut Schema) {
    require_keys(schema, &["receipt_data", "invoice_data"]);
}

/// The structured payload, keyed by document type.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentPayload {
    Receipt(ReceiptData),
    Invoice(InvoiceData),
    NotPaymentDocument,
}

impl DocumentPayload {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DocumentPayload::Receipt(_) => DocumentType::Receipt,
            DocumentPayload::Invoice(_) => DocumentType::Invoice,
            DocumentPayload::NotPaymentDocument => DocumentType::NotPaymentDocument,
        }
    }
}

/// A validated extraction for one image.
///
/// Serialises to (and deserialises from) the flat [`RawExtraction`] shape,
/// with every optional field written as an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExtraction", into = "RawExtraction")]
pub struct ExtractionResult {
    payload: DocumentPayload,
    ocr_quality: OcrQuality,
    reasoning_commentary: Option<String>,
}

impl ExtractionResult {
    pub fn receipt(data: ReceiptData, ocr_quality: OcrQuality) -> Self {
        Self {
            payload: DocumentPayload::Receipt(data),
            ocr_quality,
            reasoning_commentary: None,
        }
    }

    pub fn invoice(data: InvoiceData, ocr_quality: OcrQuality) -> Self {
        Self {
            payload: DocumentPayload::Invoice(data),
            ocr_quality,
            reasoning_commentary: None,
        }
    }

    /// A rejected image. Quality is always `nul`.
    pub fn not_payment_document() -> Self {
        Self {
            payload: DocumentPayload::NotPaymentDocument,
            ocr_quality: OcrQuality::Nul,
            reasoning_commentary: None,
        }
    }

    pub fn with_commentary(mut self, commentary: impl Into<String>) -> Self {
        self.reasoning_commentary = Some(commentary.into());
        self
    }

    pub fn document_type(&self) -> DocumentType {
        self.payload.document_type()
    }

    pub fn payload(&self) -> &DocumentPayload {
        &self.payload
    }

    pub fn receipt_data(&self) -> Option<&ReceiptData> {
        match &self.payload {
            DocumentPayload::Receipt(r) => Some(r),
            _ => None,
        }
    }

    pub fn invoice_data(&self) -> Option<&InvoiceData> {
        match &self.payload {
            DocumentPayload::Invoice(i) => Some(i),
            _ => None,
        }
    }

    pub fn ocr_quality(&self) -> OcrQuality {
        self.ocr_quality
    }

    pub fn reasoning_commentary(&self) -> Option<&str> {
        self.reasoning_commentary.as_deref()
    }

    /// Soft arithmetic checks on the extracted numbers.
    ///
    /// Nothing here is enforced: the model's figures are returned verbatim.
    /// The notes exist so a caller can flag a result for human review.
    pub fn consistency_notes(&self) -> Vec<String> {
        let (items, subtotal) = match &self.payload {
            DocumentPayload::Receipt(r) => (&r.line_items, r.subtotal),
            DocumentPayload::Invoice(i) => (&i.line_items, i.subtotal),
            DocumentPayload::NotPaymentDocument => return Vec::new(),
        };

        let mut notes = Vec::new();
        if items.is_empty() {
            notes.push("line_items is empty".to_string());
            return notes;
        }

        for (idx, item) in items.iter().enumerate() {
            if !amounts_match(item.expected_total(), item.total_price) {
                notes.push(format!(
                    "line_items[{idx}] '{}': {} x {} = {:.2}, but total_price is {:.2}",
                    item.description,
                    item.quantity,
                    item.unit_price,
                    item.expected_total(),
                    item.total_price
                ));
            }
        }

        let line_sum: f64 = items.iter().map(|i: &LineItem| i.total_price).sum();
        if !amounts_match(line_sum, subtotal) {
            notes.push(format!(
                "sum of line totals is {line_sum:.2}, but subtotal is {subtotal:.2}"
            ));
        }
        notes
    }

    /// Stable, indented JSON block for logs and the console.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("<unserialisable: {e}>"))
    }
}

/// Half a cent, or 0.5% of the larger amount for big totals.
fn amounts_match(a: f64, b: f64) -> bool {
    let tolerance = 0.005_f64.max(a.abs().max(b.abs()) * 0.005);
    (a - b).abs() <= tolerance
}

impl TryFrom<RawExtraction> for ExtractionResult {
    type Error = SchemaViolationError;

    fn try_from(raw: RawExtraction) -> Result<Self, Self::Error> {
        let doc_type = raw.document_type;
        let payload = match (doc_type, raw.receipt_data, raw.invoice_data) {
            (DocumentType::Receipt, Some(receipt), None) => DocumentPayload::Receipt(receipt),
            (DocumentType::Invoice, None, Some(invoice)) => DocumentPayload::Invoice(invoice),
            (DocumentType::NotPaymentDocument, None, None) => {
                if raw.ocr_quality != OcrQuality::Nul {
                    return Err(SchemaViolationError::QualityMustBeNul {
                        found: raw.ocr_quality.to_string(),
                    });
                }
                DocumentPayload::NotPaymentDocument
            }
            (_, receipt, invoice) => {
                return Err(payload_violation(doc_type, receipt.is_some(), invoice.is_some()))
            }
        };

        Ok(Self {
            payload,
            ocr_quality: raw.ocr_quality,
            reasoning_commentary: raw.reasoning_commentary,
        })
    }
}

fn payload_violation(doc_type: DocumentType, has_receipt: bool, has_invoice: bool) -> SchemaViolationError {
    let document_type = doc_type.to_string();
    match doc_type {
        DocumentType::Receipt if has_invoice => SchemaViolationError::UnexpectedPayload {
            document_type,
            field: "invoice_data".into(),
        },
        DocumentType::Receipt => SchemaViolationError::MissingPayload {
            document_type,
            field: "receipt_data".into(),
        },
        DocumentType::Invoice if has_receipt => SchemaViolationError::UnexpectedPayload {
            document_type,
            field: "receipt_data".into(),
        },
        DocumentType::Invoice => SchemaViolationError::MissingPayload {
            document_type,
            field: "invoice_data".into(),
        },
        DocumentType::NotPaymentDocument => SchemaViolationError::UnexpectedPayload {
            document_type,
            field: if has_receipt { "receipt_data" } else { "invoice_data" }.into(),
        },
    }
}

impl From<ExtractionResult> for RawExtraction {
    fn from(result: ExtractionResult) -> Self {
        let (receipt_data, invoice_data) = match result.payload {
            DocumentPayload::Receipt(r) => (Some(r), None),
            DocumentPayload::Invoice(i) => (None, Some(i)),
            DocumentPayload::NotPaymentDocument => (None, None),
        };
        RawExtraction {
            document_type: match (&receipt_data, &invoice_data) {
                (Some(_), _) => DocumentType::Receipt,
                (_, Some(_)) => DocumentType::Invoice,
                _ => DocumentType::NotPaymentDocument,
            },
            receipt_data,
            invoice_data,
            ocr_quality: result.ocr_quality,
            reasoning_commentary: result.reasoning_commentary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{Currency, Party, PaymentMethod};
    use serde_json::json;

    fn cafe_luna() -> ReceiptData {
        ReceiptData {
            merchant_name: "Cafe Luna".into(),
            currency: Currency::Usd,
            date: "2024-01-15".into(),
            time: None,
            line_items: vec![LineItem {
                description: "Coffee".into(),
                quantity: 2,
                unit_price: 3.5,
                total_price: 7.0,
            }],
            subtotal: 7.0,
            tax: None,
            total: 7.0,
            payment_method: PaymentMethod::Cash,
            receipt_number: None,
        }
    }

    fn sample_invoice() -> InvoiceData {
        InvoiceData {
            invoice_number: "INV-0042".into(),
            invoice_date: "2024-03-01".into(),
            due_date: Some("2024-03-31".into()),
            currency: Currency::Eur,
            seller: Party::named("Acme GmbH"),
            buyer: Party::named("Globex Ltd"),
            line_items: vec![LineItem {
                description: "Consulting".into(),
                quantity: 10,
                unit_price: 100.0,
                total_price: 1000.0,
            }],
            subtotal: 1000.0,
            tax_amount: Some(190.0),
            discount_amount: None,
            total_amount: 1190.0,
            payment_method: PaymentMethod::Card,
            payment_terms: Some("NET 30".into()),
            bank_details: None,
            notes: None,
            purchase_order_number: None,
        }
    }

    #[test]
    fn receipt_round_trips_through_wire_shape() {
        let result = ExtractionResult::receipt(cafe_luna(), OcrQuality::Good);
        let json = serde_json::to_string(&result).unwrap();
        let back: ExtractionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.document_type(), DocumentType::Receipt);
        assert!(back.invoice_data().is_none());
    }

    #[test]
    fn invoice_round_trips_through_wire_shape() {
        let result = ExtractionResult::invoice(sample_invoice(), OcrQuality::Medium)
            .with_commentary("stamp covers the footer");
        let back: ExtractionResult =
            serde_json::from_value(serde_json::to_value(&result).unwrap()).unwrap();
        assert_eq!(back, result);
        assert_eq!(back.reasoning_commentary(), Some("stamp covers the footer"));
    }

    #[test]
    fn serialised_result_keeps_null_markers() {
        let v = serde_json::to_value(ExtractionResult::not_payment_document()).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj["document_type"], "not_payment_document");
        assert!(obj.contains_key("receipt_data") && obj["receipt_data"].is_null());
        assert!(obj.contains_key("invoice_data") && obj["invoice_data"].is_null());
        assert!(obj.contains_key("reasoning_commentary"));
        assert_eq!(obj["ocr_quality"], "nul");
    }

    #[test]
    fn receipt_with_invoice_payload_is_rejected() {
        let mut raw: RawExtraction =
            ExtractionResult::receipt(cafe_luna(), OcrQuality::Good).into();
        raw.invoice_data = Some(sample_invoice());
        let err = ExtractionResult::try_from(raw).unwrap_err();
        assert!(matches!(
            err,
            SchemaViolationError::UnexpectedPayload { ref field, .. } if field == "invoice_data"
        ));
    }

    #[test]
    fn invoice_without_payload_is_rejected() {
        let raw = RawExtraction {
            document_type: DocumentType::Invoice,
            receipt_data: None,
            invoice_data: None,
            ocr_quality: OcrQuality::Good,
            reasoning_commentary: None,
        };
        let err = ExtractionResult::try_from(raw).unwrap_err();
        assert!(matches!(err, SchemaViolationError::MissingPayload { .. }));
    }

    #[test]
    fn not_payment_document_with_payload_is_rejected() {
        let raw = RawExtraction {
            document_type: DocumentType::NotPaymentDocument,
            receipt_data: Some(cafe_luna()),
            invoice_data: None,
            ocr_quality: OcrQuality::Nul,
            reasoning_commentary: None,
        };
        let err = ExtractionResult::try_from(raw).unwrap_err();
        assert!(matches!(
            err,
            SchemaViolationError::UnexpectedPayload { ref field, .. } if field == "receipt_data"
        ));
    }

    #[test]
    fn not_payment_document_requires_nul_quality() {
        let wire = json!({
            "document_type": "not_payment_document",
            "receipt_data": null,
            "invoice_data": null,
            "ocr_quality": "good",
            "reasoning_commentary": null
        });
        let err = serde_json::from_value::<ExtractionResult>(wire).unwrap_err();
        assert!(err.to_string().contains("ocr_quality"), "got: {err}");
    }

    #[test]
    fn original_quality_field_name_is_accepted() {
        let wire = json!({
            "document_type": "not_payment_document",
            "receipt_data": null,
            "invoice_data": null,
            "ocr_quality_confidence": "nul"
        });
        let result: ExtractionResult = serde_json::from_value(wire).unwrap();
        assert_eq!(result.ocr_quality(), OcrQuality::Nul);
        assert_eq!(result.reasoning_commentary(), None);
    }

    #[test]
    fn omitted_payload_key_is_rejected() {
        let wire = json!({
            "document_type": "not_payment_document",
            "ocr_quality": "nul"
        });
        let err = serde_json::from_value::<ExtractionResult>(wire).unwrap_err();
        assert!(err.to_string().contains("receipt_data"), "got: {err}");

        let wire = json!({
            "document_type": "not_payment_document",
            "receipt_data": null,
            "ocr_quality": "nul"
        });
        let err = serde_json::from_value::<ExtractionResult>(wire).unwrap_err();
        assert!(err.to_string().contains("invoice_data"), "got: {err}");
    }

    #[test]
    fn schema_requires_nullable_payload_keys() {
        let schema = schemars::schema_for!(RawExtraction);
        let value = schema.as_value();
        let required: Vec<&str> = value["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        for key in ["document_type", "receipt_data", "invoice_data", "ocr_quality"] {
            assert!(required.contains(&key), "{key} missing from {required:?}");
        }
        assert!(!required.contains(&"reasoning_commentary"));
        assert!(value["properties"]["receipt_data"].to_string().contains("null"));
    }

    #[test]
    fn descriptions_have_no_line_breaks() {
        let schema = schemars::schema_for!(RawExtraction);
        for (name, prop) in schema.as_value()["properties"].as_object().unwrap() {
            if let Some(desc) = prop.get("description").and_then(|d| d.as_str()) {
                assert!(!desc.contains('\n'), "{name}: {desc:?}");
            }
        }
    }

    #[test]
    fn consistent_receipt_has_no_notes() {
        let result = ExtractionResult::receipt(cafe_luna(), OcrQuality::Good);
        assert!(result.consistency_notes().is_empty());
    }

    #[test]
    fn inconsistent_line_total_is_noted_not_corrected() {
        let mut receipt = cafe_luna();
        receipt.line_items[0].total_price = 8.0;
        let result = ExtractionResult::receipt(receipt, OcrQuality::Bad);
        let notes = result.consistency_notes();
        assert_eq!(notes.len(), 2, "notes: {notes:?}");
        assert!(notes[0].contains("Coffee"));
        assert_eq!(result.receipt_data().unwrap().line_items[0].total_price, 8.0);
    }

    #[test]
    fn pretty_json_is_indented() {
        let text = ExtractionResult::receipt(cafe_luna(), OcrQuality::Good).to_pretty_json();
        assert!(text.starts_with("{\n  \"document_type\": \"receipt\""), "got: {text}");
        assert!(text.contains("\n    \"merchant_name\": \"Cafe Luna\""));
    }
}
