//! Domain models for the cart and checkout client.
//!
//! Wire and persistence field names are camelCase to match the existing
//! storage blobs and the REST API contracts.

use milkmaster_core::{Price, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One product queued for purchase by one identity.
///
/// `price` and `stock` are snapshots taken when the line was added or last
/// updated; they are used for local bound-checking only and are never
/// authoritative. `remaining_stock` is derived (`stock - quantity`) and
/// recomputed on every quantity change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Stable join key to the catalog product.
    pub product_id: ProductId,
    /// Owning identity; absent for anonymous lines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Display name carried for rendering.
    pub name: String,
    /// Display image carried for rendering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Unit price snapshot at add time.
    pub price: Price,
    /// Units queued for purchase. Always >= 1.
    pub quantity: u32,
    /// Stock snapshot at the last mutating operation.
    pub stock: u32,
    /// `stock - quantity`, kept current for display.
    pub remaining_stock: u32,
}

impl CartLine {
    /// Total for this line at the snapshot unit price.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price.line_total(self.quantity)
    }
}

/// Catalog snapshot handed to `add_to_cart` by the product pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Product being added.
    #[serde(alias = "_id", alias = "id")]
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Display image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Unit price at the time of the add.
    pub price: Price,
    /// Available stock at the time of the add.
    pub stock: u32,
    /// Units to add; defaults to one when absent or zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

/// Profile record, as returned by `GET /api/user/profile` and as cached
/// under the `user` storage key.
///
/// Every field is optional: the backend omits what the customer never
/// filled in, and older cached records predate some fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    /// User id; older records use `_id`.
    #[serde(alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
}

/// Delivery address block submitted with an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
    /// Recipient full name.
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}
