//! Leaf entities of the extraction contract.
//!
//! Field doc comments are not just documentation: `schemars` copies them into
//! the JSON Schema `description` of each property, and that schema is what the
//! model sees. Edit them as prompt text.

use schemars::{JsonSchema, Schema};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Top-level classification of a submitted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Proof of a completed payment.
    Receipt,
    /// A formal bill requesting payment.
    Invoice,
    /// Anything else, including unreadable or ambiguous images.
    NotPaymentDocument,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Receipt => "receipt",
            DocumentType::Invoice => "invoice",
            DocumentType::NotPaymentDocument => "not_payment_document",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction currency. `NUL` is the explicit "could not be determined" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Rub,
    Nul,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Rub => "RUB",
            Currency::Nul => "NUL",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
}

/// The model's own confidence in what it read. `nul` means no extraction was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OcrQuality {
    Good,
    Medium,
    Bad,
    Nul,
}

impl OcrQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrQuality::Good => "good",
            OcrQuality::Medium => "medium",
            OcrQuality::Bad => "bad",
            OcrQuality::Nul => "nul",
        }
    }
}

impl fmt::Display for OcrQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One purchased product or billed service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    /// Description of the item
    pub description: String,
    /// Quantity of the item
    #[serde(deserialize_with = "whole_quantity")]
    pub quantity: u32,
    /// Price per unit
    pub unit_price: f64,
    /// Total price for this line item
    pub total_price: f64,
}

impl LineItem {
    /// `quantity × unit_price`, the value `total_price` is expected to match.
    pub fn expected_total(&self) -> f64 {
        f64::from(self.quantity) * self.unit_price
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReceiptData {
    /// Name of the store/merchant
    pub merchant_name: String,
    /// Currency of the transaction. Set NUL if can't be determined
    pub currency: Currency,
    /// Date of purchase
    pub date: String,
    /// Time of purchase
    pub time: Option<String>,
    /// List of purchased items
    pub line_items: Vec<LineItem>,
    /// Subtotal before tax
    pub subtotal: f64,
    /// Tax amount
    pub tax: Option<f64>,
    /// Total amount paid
    pub total: f64,
    /// Payment method used
    pub payment_method: PaymentMethod,
    /// Receipt or transaction number
    pub receipt_number: Option<String>,
}

/// Identity block for either side of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Party {
    /// Company or person name
    pub name: String,
    /// Postal or billing address
    pub address: Option<String>,
    /// Phone number
    pub phone: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Tax ID or VAT number
    pub tax_id: Option<String>,
}

impl Party {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            phone: None,
            email: None,
            tax_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvoiceData {
    /// Invoice number or ID
    pub invoice_number: String,
    /// Invoice date
    pub invoice_date: String,
    /// Payment due date
    pub due_date: Option<String>,
    /// Currency of the invoice. Set NUL if can't be determined
    pub currency: Currency,
    /// The seller/company issuing the invoice
    pub seller: Party,
    /// The buyer/customer being billed
    pub buyer: Party,
    /// List of products/services billed
    pub line_items: Vec<LineItem>,
    /// Subtotal before tax and discounts
    pub subtotal: f64,
    /// Total tax amount
    pub tax_amount: Option<f64>,
    /// Total discount amount
    pub discount_amount: Option<f64>,
    /// Total amount due
    pub total_amount: f64,
    /// Payment method
    pub payment_method: PaymentMethod,
    /// Payment terms (e.g., 'NET 30', 'Due on receipt')
    pub payment_terms: Option<String>,
    /// Bank transfer details if applicable
    pub bank_details: Option<String>,
    /// Additional notes or terms
    pub notes: Option<String>,
    /// Related purchase order number
    pub purchase_order_number: Option<String>,
}

// ── Field rules ──────────────────────────────────────────────────────────────

/// A non-negative whole number, also when written as `2.0`.
fn whole_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let n = serde_json::Number::deserialize(deserializer)?;
    let whole = match n.as_u64() {
        Some(u) => Some(u),
        None => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
            .map(|f| f as u64),
    };
    whole
        .and_then(|u| u32::try_from(u).ok())
        .ok_or_else(|| D::Error::custom(format!("invalid quantity {n}, expected a non-negative whole number")))
}

/// `null` or a value, but the key itself must be present.
pub(super) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Add `keys` to the schema's `required` list; their types stay nullable.
pub(super) fn require_keys(schema: &mut Schema, keys: &[&str]) {
    let required = schema
        .ensure_object()
        .entry("required")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = required {
        for key in keys {
            if !list.iter().any(|v| v.as_str() == Some(*key)) {
                list.push(Value::from(*key));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enum_wire_values_match_contract() {
        assert_eq!(json!(DocumentType::NotPaymentDocument), json!("not_payment_document"));
        assert_eq!(json!(Currency::Nul), json!("NUL"));
        assert_eq!(json!(Currency::Gbp), json!("GBP"));
        assert_eq!(json!(PaymentMethod::Card), json!("card"));
        assert_eq!(json!(OcrQuality::Medium), json!("medium"));
    }

    #[test]
    fn out_of_set_currency_is_rejected() {
        let err = serde_json::from_value::<Currency>(json!("JPY")).unwrap_err();
        assert!(err.to_string().contains("JPY"), "got: {err}");
    }

    #[test]
    fn enum_values_are_case_sensitive() {
        assert!(serde_json::from_value::<Currency>(json!("usd")).is_err());
        assert!(serde_json::from_value::<PaymentMethod>(json!("CASH")).is_err());
    }

    #[test]
    fn negative_quantity_is_rejected() {
        let item = json!({
            "description": "Refund",
            "quantity": -1,
            "unit_price": 1.0,
            "total_price": -1.0
        });
        assert!(serde_json::from_value::<LineItem>(item).is_err());
    }

    fn item_with_quantity(quantity: Value) -> Value {
        json!({
            "description": "Coffee",
            "quantity": quantity,
            "unit_price": 3.5,
            "total_price": 7.0
        })
    }

    #[test]
    fn integral_float_quantity_is_accepted() {
        let item: LineItem = serde_json::from_value(item_with_quantity(json!(2.0))).unwrap();
        assert_eq!(item.quantity, 2);
        let item: LineItem = serde_json::from_value(item_with_quantity(json!(3))).unwrap();
        assert_eq!(item.quantity, 3);
    }

    #[test]
    fn fractional_quantity_is_rejected() {
        let err = serde_json::from_value::<LineItem>(item_with_quantity(json!(2.5))).unwrap_err();
        assert!(err.to_string().contains("2.5"), "got: {err}");
    }

    #[test]
    fn negative_or_textual_quantity_is_rejected() {
        assert!(serde_json::from_value::<LineItem>(item_with_quantity(json!(-1))).is_err());
        assert!(serde_json::from_value::<LineItem>(item_with_quantity(json!(-2.0))).is_err());
        assert!(serde_json::from_value::<LineItem>(item_with_quantity(json!("2"))).is_err());
        assert!(serde_json::from_value::<LineItem>(item_with_quantity(json!(5_000_000_000u64))).is_err());
    }

    #[test]
    fn quantity_schema_stays_integer() {
        let schema = schemars::schema_for!(LineItem);
        assert_eq!(schema.as_value()["properties"]["quantity"]["type"], "integer");
    }

    #[test]
    fn optional_fields_serialise_as_null() {
        let party = Party::named("Acme GmbH");
        let v = serde_json::to_value(&party).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        assert!(obj["address"].is_null());
        assert!(obj["tax_id"].is_null());
    }

    #[test]
    fn expected_total_multiplies_quantity() {
        let item = LineItem {
            description: "Coffee".into(),
            quantity: 2,
            unit_price: 3.5,
            total_price: 7.0,
        };
        assert!((item.expected_total() - 7.0).abs() < f64::EPSILON);
    }
}
