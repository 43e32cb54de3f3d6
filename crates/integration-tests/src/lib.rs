//! Shared fixtures for MilkMaster integration tests.
//!
//! Provides pre-seeded storage, a scripted [`FakeApi`], and a switchable
//! [`FakeMailer`] so the full checkout flow can be driven without a server.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use milkmaster_core::OrderId;
use milkmaster_storefront::api::types::{
    CardVerifyRequest, CardVerifyResponse, OrderRequest, OrderResponse, OtpVerifyResponse,
    StockCheckItem, StockValidation,
};
use milkmaster_storefront::api::{ApiError, CheckoutApi};
use milkmaster_storefront::checkout::DeliveryForm;
use milkmaster_storefront::models::Profile;
use milkmaster_storefront::services::{MailError, OtpMailer, OtpNotice};
use milkmaster_storefront::storage::{MemoryStorage, StoragePort, keys};

static INIT_TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per process.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A JWT-shaped token whose payload carries the given claims.
#[must_use]
pub fn fake_token(claims: &serde_json::Value) -> String {
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("header.{payload}.signature")
}

/// Storage seeded with a bearer token and a cached `user` record.
#[must_use]
pub fn seeded_storage(user_id: &str, email: &str) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    let token = fake_token(&serde_json::json!({"id": user_id, "email": email, "role": "user"}));
    storage.set(keys::TOKEN, &token);
    storage.set(
        keys::USER,
        &serde_json::json!({"id": user_id, "email": email}).to_string(),
    );
    storage
}

/// Write one line directly into a user's cart partition.
pub fn seed_cart_line(
    storage: &dyn StoragePort,
    user_id: &str,
    product_id: &str,
    name: &str,
    price: &str,
    quantity: u32,
    stock: u32,
) {
    let key = format!("{}{user_id}", keys::CART_PREFIX);
    let mut lines: Vec<serde_json::Value> = storage
        .get(&key)
        .and_then(|blob| serde_json::from_str(&blob).ok())
        .unwrap_or_default();
    lines.push(serde_json::json!({
        "productId": product_id,
        "userId": user_id,
        "name": name,
        "price": price,
        "quantity": quantity,
        "stock": stock,
        "remainingStock": stock.saturating_sub(quantity),
    }));
    storage.set(&key, &serde_json::to_string(&lines).expect("serialize seed lines"));
}

/// A fully filled delivery form that passes the Address guard.
#[must_use]
pub fn filled_delivery() -> DeliveryForm {
    DeliveryForm {
        first_name: "Asha".to_string(),
        last_name: "Rao".to_string(),
        email: "asha@example.com".to_string(),
        phone: "9000000000".to_string(),
        address: "12 Dairy Lane".to_string(),
        city: "Pune".to_string(),
        state: "MH".to_string(),
        pincode: "411001".to_string(),
    }
}

/// A plausible order-created response.
#[must_use]
pub fn sample_order_response(paid: bool) -> OrderResponse {
    serde_json::from_value(serde_json::json!({
        "_id": "ord-0001",
        "orderNumber": "MM-2026-0042",
        "status": "Processing",
        "paymentMethod": (if paid { "card" } else { "cod" }),
        "paymentStatus": (if paid { "Paid" } else { "Pending" }),
        "stockUpdates": [],
    }))
    .expect("sample order response")
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// FakeApi
// =============================================================================

/// Scripted API double.
///
/// Each endpoint pops its next scripted result; with nothing queued it
/// answers like a healthy backend (profile found, stock valid, order
/// created, card verified with OTP `123456`, OTP compared by equality).
#[derive(Default)]
pub struct FakeApi {
    profile_results: Mutex<VecDeque<Result<Profile, ApiError>>>,
    stock_results: Mutex<VecDeque<Result<StockValidation, ApiError>>>,
    order_results: Mutex<VecDeque<Result<OrderResponse, ApiError>>>,
    card_results: Mutex<VecDeque<Result<CardVerifyResponse, ApiError>>>,
    /// Every order payload received, serialized to JSON.
    pub submitted_orders: Mutex<Vec<serde_json::Value>>,
    /// Number of stock-validation calls received.
    pub stock_calls: Mutex<u32>,
}

impl FakeApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_profile(&self, result: Result<Profile, ApiError>) {
        lock(&self.profile_results).push_back(result);
    }

    pub fn push_stock(&self, result: Result<StockValidation, ApiError>) {
        lock(&self.stock_results).push_back(result);
    }

    pub fn push_order(&self, result: Result<OrderResponse, ApiError>) {
        lock(&self.order_results).push_back(result);
    }

    pub fn push_card(&self, result: Result<CardVerifyResponse, ApiError>) {
        lock(&self.card_results).push_back(result);
    }

    /// The OTP issued by the default card-verification script.
    pub const DEFAULT_OTP: &'static str = "123456";

    fn default_card_response() -> CardVerifyResponse {
        serde_json::from_value(serde_json::json!({
            "success": true,
            "otp": Self::DEFAULT_OTP,
            "cardDetails": {"lastFour": "1111"},
            "message": "Card verified successfully",
        }))
        .expect("default card response")
    }
}

impl CheckoutApi for &FakeApi {
    async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        lock(&self.profile_results)
            .pop_front()
            .unwrap_or_else(|| Ok(Profile::default()))
    }

    async fn validate_stock(
        &self,
        _items: &[StockCheckItem],
    ) -> Result<StockValidation, ApiError> {
        *lock(&self.stock_calls) += 1;
        lock(&self.stock_results)
            .pop_front()
            .unwrap_or_else(|| Ok(StockValidation::assumed_valid()))
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        lock(&self.submitted_orders)
            .push(serde_json::to_value(order).expect("serialize submitted order"));
        lock(&self.order_results)
            .pop_front()
            .unwrap_or_else(|| Ok(sample_order_response(order.payment_details.is_some())))
    }

    async fn verify_card(
        &self,
        _request: &CardVerifyRequest,
    ) -> Result<CardVerifyResponse, ApiError> {
        lock(&self.card_results)
            .pop_front()
            .unwrap_or_else(|| Ok(FakeApi::default_card_response()))
    }

    async fn verify_otp(
        &self,
        otp: &str,
        expected_otp: &str,
    ) -> Result<OtpVerifyResponse, ApiError> {
        // Mirrors the real endpoint: exact comparison against the issued OTP
        let body = if otp == expected_otp {
            serde_json::json!({"success": true})
        } else {
            serde_json::json!({"success": false, "message": "Invalid OTP. Please check and try again."})
        };
        Ok(serde_json::from_value(body).expect("otp response"))
    }
}

// =============================================================================
// FakeMailer
// =============================================================================

/// Switchable mailer double recording every notice it was asked to send.
#[derive(Default)]
pub struct FakeMailer {
    fail: AtomicBool,
    /// Notices successfully "sent".
    pub sent: Mutex<Vec<OtpNotice>>,
}

impl FakeMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl OtpMailer for &FakeMailer {
    async fn send_otp(&self, notice: &OtpNotice) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Rejected("relay unavailable".to_string()));
        }
        lock(&self.sent).push(notice.clone());
        Ok(())
    }
}

/// Convenience: an order id that tests can compare against
/// [`sample_order_response`].
#[must_use]
pub fn sample_order_id() -> OrderId {
    OrderId::new("ord-0001")
}
