//! REST client for the MilkMaster order/stock/verification endpoints.
//!
//! # Architecture
//!
//! - [`CheckoutApi`] is the seam the checkout flow is written against; the
//!   endpoints are external collaborators with fixed request/response
//!   contracts, so tests script a fake implementation.
//! - [`http::HttpCheckoutApi`] is the production implementation. Response
//!   bodies are read as text first and classified before JSON decoding, so
//!   an HTML error page from a dead server is distinguished from malformed
//!   JSON in the diagnostics.
//!
//! No call here retries, times out, or is cancellable; the caller's own
//! busy state bounds perceived latency.

pub mod http;
pub mod types;

pub use http::HttpCheckoutApi;
pub use types::{
    CardVerifyRequest, CardVerifyResponse, InvalidStockItem, OrderRequest, OrderResponse,
    OtpVerifyResponse, StockCheckItem, StockValidation,
};

use thiserror::Error;

use crate::models::Profile;

/// Errors that can occur when calling the MilkMaster API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure.
    #[error("Network connection error. Please check your internet connection.")]
    Http(#[from] reqwest::Error),

    /// No bearer token is available for the request.
    #[error("You must be logged in to continue")]
    Unauthorized,

    /// The server answered with an HTML page instead of JSON.
    #[error("Server is down or returned an HTML error page. Please try again later.")]
    HtmlBody {
        /// HTTP status of the offending response.
        status: u16,
    },

    /// The response body was not valid JSON.
    #[error("Server returned an invalid response format. Please try again.")]
    MalformedJson {
        /// HTTP status of the offending response.
        status: u16,
    },

    /// The server reported an error; `message` is surfaced verbatim.
    #[error("{message}")]
    Api {
        /// HTTP status of the response.
        status: u16,
        /// Server-reported message, or a generic `Server error: <status>`.
        message: String,
    },

    /// Stock validation found lines exceeding live inventory.
    #[error("Stock validation failed: {}", format_invalid_items(.0))]
    StockConflict(Vec<types::InvalidStockItem>),
}

/// The checkout flow's view of the MilkMaster REST API.
///
/// One method per consumed endpoint; request/response shapes live in
/// [`types`].
#[allow(async_fn_in_trait)]
pub trait CheckoutApi {
    /// `GET /api/user/profile` - prefill data for the delivery form.
    async fn fetch_profile(&self) -> Result<Profile, ApiError>;

    /// `POST /api/products/validate-stock` - server-authoritative re-check
    /// of the requested quantities.
    async fn validate_stock(
        &self,
        items: &[types::StockCheckItem],
    ) -> Result<types::StockValidation, ApiError>;

    /// `POST /api/orders` - create the order.
    async fn submit_order(
        &self,
        order: &types::OrderRequest,
    ) -> Result<types::OrderResponse, ApiError>;

    /// `POST /api/verify-card` - mock card verification; success carries a
    /// server-issued OTP.
    async fn verify_card(
        &self,
        request: &types::CardVerifyRequest,
    ) -> Result<types::CardVerifyResponse, ApiError>;

    /// `POST /api/verify-otp` - compare the entered OTP against the
    /// server-issued one.
    async fn verify_otp(
        &self,
        otp: &str,
        expected_otp: &str,
    ) -> Result<types::OtpVerifyResponse, ApiError>;
}

fn format_invalid_items(items: &[types::InvalidStockItem]) -> String {
    if items.is_empty() {
        return "(no item details provided)".to_string();
    }

    items
        .iter()
        .map(types::InvalidStockItem::describe)
        .collect::<Vec<_>>()
        .join("; ")
}
