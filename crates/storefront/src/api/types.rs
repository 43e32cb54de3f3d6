//! Request and response types for the MilkMaster REST API.
//!
//! Field names are camelCase on the wire. Response types default every
//! field the backend is known to omit.

use chrono::{DateTime, Utc};
use milkmaster_core::{OrderId, PaymentMethod, PaymentStatus, Price, ProductId, UserId};
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::DeliveryAddress;

// =============================================================================
// Stock validation
// =============================================================================

/// One `(product, quantity)` pair submitted for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockCheckItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Body of `POST /api/products/validate-stock`.
#[derive(Debug, Clone, Serialize)]
pub struct StockValidationRequest {
    pub items: Vec<StockCheckItem>,
}

/// Outcome of a stock validation call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StockValidation {
    /// Whether every requested quantity is available.
    pub valid: bool,
    /// Optional server commentary.
    pub message: Option<String>,
    /// Lines whose requested quantity exceeds live inventory.
    pub invalid_items: Vec<InvalidStockItem>,
}

impl StockValidation {
    /// A validation result that passes everything (used when the server
    /// answers 200 with an empty body).
    #[must_use]
    pub fn assumed_valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }
}

/// A line the server rejected, with the requested-vs-available quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidStockItem {
    #[serde(default)]
    pub name: Option<String>,
    pub requested: u32,
    pub available: u32,
}

impl InvalidStockItem {
    /// The per-line fragment of the user-facing discrepancy message.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{}: Requested {}, only {} in stock",
            self.name.as_deref().unwrap_or("Product"),
            self.requested,
            self.available
        )
    }
}

// =============================================================================
// Orders
// =============================================================================

/// One purchased line inside an order submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Card details attached to a card order.
///
/// Reduced before transmission: the number is digits-only and the CVV is
/// never part of this type, so it cannot be serialized into the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    /// Card number with all separators stripped.
    pub card_number: String,
    /// Last four digits, for display on the confirmation.
    pub last_four: String,
    /// Expiry in MM/YY form.
    pub expiry_date: String,
    /// Name on the card.
    pub card_name: String,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Price,
    pub delivery_address: DeliveryAddress,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_details: Option<PaymentDetails>,
    pub payment_status: PaymentStatus,
}

/// Response of `POST /api/orders`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    /// Order id; older backends answer with `_id`.
    #[serde(alias = "_id")]
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    /// Per-product stock adjustments reported by the server; passed through
    /// opaque to the confirmation page.
    #[serde(default)]
    pub stock_updates: Vec<serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Card / OTP verification
// =============================================================================

/// Body of `POST /api/verify-card`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardVerifyRequest {
    pub card_number: String,
    pub card_expiry: String,
    pub card_cvv: String,
    pub card_name: String,
}

/// Response of `POST /api/verify-card`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CardVerifyResponse {
    pub success: bool,
    /// Server-issued OTP; arrives as a string or a bare number.
    #[serde(default, deserialize_with = "de_opt_string_or_number")]
    pub otp: Option<String>,
    /// Opaque masked-card echo for display.
    pub card_details: Option<serde_json::Value>,
    pub message: Option<String>,
}

/// Body of `POST /api/verify-otp`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifyRequest {
    pub otp: String,
    pub expected_otp: String,
}

/// Response of `POST /api/verify-otp`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OtpVerifyResponse {
    pub success: bool,
    pub message: Option<String>,
}

/// Accept a value that may arrive as a JSON string or number.
fn de_opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }))
}
