//! `reqwest`-backed implementation of [`CheckoutApi`].

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::api::types::{
    CardVerifyRequest, CardVerifyResponse, InvalidStockItem, OrderRequest, OrderResponse,
    OtpVerifyRequest, OtpVerifyResponse, StockCheckItem, StockValidation, StockValidationRequest,
};
use crate::api::{ApiError, CheckoutApi};
use crate::config::ClientConfig;
use crate::models::Profile;
use crate::storage::{StoragePort, keys};

/// Production API client.
///
/// The bearer token is read from the storage port on every request, so a
/// login or logout mid-session takes effect on the next call without
/// rebuilding the client.
#[derive(Clone)]
pub struct HttpCheckoutApi {
    client: reqwest::Client,
    base_url: String,
    storage: Arc<dyn StoragePort>,
}

impl HttpCheckoutApi {
    /// Create a client for the configured API base URL.
    #[must_use]
    pub fn new(config: &ClientConfig, storage: Arc<dyn StoragePort>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.api_base_url.clone(),
            storage,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn bearer_token(&self) -> Result<String, ApiError> {
        self.storage.get(keys::TOKEN).ok_or(ApiError::Unauthorized)
    }

    async fn get(&self, path: &str) -> Result<(u16, String), ApiError> {
        let token = self.bearer_token()?;
        let response = self
            .client
            .get(self.endpoint(path))
            .bearer_auth(&token)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(u16, String), ApiError> {
        let token = self.bearer_token()?;
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&token)
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

impl CheckoutApi for HttpCheckoutApi {
    #[instrument(skip(self))]
    async fn fetch_profile(&self) -> Result<Profile, ApiError> {
        let (status, body) = self.get("/api/user/profile").await?;
        let value = decode_response(status, &body)?;
        decode_payload(status, value)
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    async fn validate_stock(
        &self,
        items: &[StockCheckItem],
    ) -> Result<StockValidation, ApiError> {
        let request = StockValidationRequest {
            items: items.to_vec(),
        };
        let (status, body) = self.post("/api/products/validate-stock", &request).await?;
        let value = decode_response(status, &body)?;

        if value.is_null() {
            warn!("Stock validation returned an empty body; assuming all items in stock");
            return Ok(StockValidation::assumed_valid());
        }

        let validation: StockValidation = decode_payload(status, value)?;
        // A 200 that still names invalid items is a conflict, same as a 4xx
        if !validation.invalid_items.is_empty() {
            return Err(ApiError::StockConflict(validation.invalid_items));
        }
        Ok(validation)
    }

    #[instrument(skip(self, order), fields(items = order.items.len()))]
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResponse, ApiError> {
        let (status, body) = self.post("/api/orders", order).await?;
        let value = decode_response(status, &body)?;
        decode_payload(status, value)
    }

    #[instrument(skip(self, request))]
    async fn verify_card(
        &self,
        request: &CardVerifyRequest,
    ) -> Result<CardVerifyResponse, ApiError> {
        let (status, body) = self.post("/api/verify-card", request).await?;
        let value = decode_response(status, &body)?;
        decode_payload(status, value)
    }

    #[instrument(skip(self, otp, expected_otp))]
    async fn verify_otp(
        &self,
        otp: &str,
        expected_otp: &str,
    ) -> Result<OtpVerifyResponse, ApiError> {
        let request = OtpVerifyRequest {
            otp: otp.to_string(),
            expected_otp: expected_otp.to_string(),
        };
        let (status, body) = self.post("/api/verify-otp", &request).await?;
        let value = decode_response(status, &body)?;
        decode_payload(status, value)
    }
}

// =============================================================================
// Response classification
// =============================================================================

/// Classify a raw response into a JSON value or a typed error.
///
/// Pure so the taxonomy is testable without a server:
/// - HTML body (any status) ⇒ [`ApiError::HtmlBody`]
/// - unparseable body ⇒ [`ApiError::MalformedJson`]
/// - non-2xx with `invalidItems` ⇒ [`ApiError::StockConflict`]
/// - non-2xx otherwise ⇒ [`ApiError::Api`] with the server's `message`
///   verbatim when present
/// - 2xx with an empty body ⇒ `Value::Null`
fn decode_response(status: u16, body: &str) -> Result<Value, ApiError> {
    let success = (200..300).contains(&status);
    let trimmed = body.trim();

    if trimmed.is_empty() {
        return if success {
            Ok(Value::Null)
        } else {
            Err(ApiError::Api {
                status,
                message: format!("Server error: {status}"),
            })
        };
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(e) => {
            // Only an unparseable body gets sniffed for HTML, so a valid
            // JSON payload containing markup is never misclassified
            if trimmed.starts_with("<!DOCTYPE") || trimmed.contains("<html") {
                return Err(ApiError::HtmlBody { status });
            }
            warn!(status, error = %e, "Response body is not valid JSON");
            return Err(ApiError::MalformedJson { status });
        }
    };

    if success {
        return Ok(value);
    }

    if let Some(items) = value.get("invalidItems").and_then(Value::as_array)
        && !items.is_empty()
        && let Ok(items) = serde_json::from_value::<Vec<InvalidStockItem>>(Value::Array(items.clone()))
    {
        return Err(ApiError::StockConflict(items));
    }

    let message = value.get("message").and_then(Value::as_str).map_or_else(
        || format!("Server error: {status}"),
        ToString::to_string,
    );
    Err(ApiError::Api { status, message })
}

/// Decode a classified JSON value into the endpoint's response type.
fn decode_payload<T: DeserializeOwned>(status: u16, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| {
        warn!(status, error = %e, "Response payload did not match the expected shape");
        ApiError::MalformedJson { status }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_json() {
        let value = decode_response(200, r#"{"valid":true}"#).expect("decode");
        assert_eq!(value["valid"], true);
    }

    #[test]
    fn test_decode_empty_success_is_null() {
        let value = decode_response(200, "").expect("decode");
        assert!(value.is_null());
    }

    #[test]
    fn test_decode_html_error_page() {
        let err = decode_response(502, "<!DOCTYPE html><html><body>Bad Gateway</body></html>")
            .expect_err("html");
        assert!(matches!(err, ApiError::HtmlBody { status: 502 }));
    }

    #[test]
    fn test_decode_html_without_doctype() {
        let err = decode_response(500, "<html><body>boom</body></html>").expect_err("html");
        assert!(matches!(err, ApiError::HtmlBody { .. }));
    }

    #[test]
    fn test_decode_malformed_json() {
        let err = decode_response(200, "{not json").expect_err("malformed");
        assert!(matches!(err, ApiError::MalformedJson { status: 200 }));
    }

    #[test]
    fn test_decode_error_with_invalid_items() {
        let body = r#"{"invalidItems":[{"name":"Milk","requested":5,"available":2}]}"#;
        let err = decode_response(400, body).expect_err("conflict");
        match err {
            ApiError::StockConflict(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].describe(), "Milk: Requested 5, only 2 in stock");
            }
            other => panic!("expected StockConflict, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_with_message() {
        let err = decode_response(400, r#"{"message":"Order total mismatch"}"#).expect_err("api");
        match err {
            ApiError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Order total mismatch");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_without_message() {
        let err = decode_response(500, r"{}").expect_err("api");
        assert_eq!(err.to_string(), "Server error: 500");
    }

    #[test]
    fn test_decode_empty_error_body() {
        let err = decode_response(503, "").expect_err("api");
        assert_eq!(err.to_string(), "Server error: 503");
    }

    #[test]
    fn test_decode_payload_shape_mismatch() {
        let value = serde_json::json!({"success": "definitely"});
        let result: Result<OtpVerifyResponse, ApiError> = decode_payload(200, value);
        assert!(matches!(result, Err(ApiError::MalformedJson { .. })));
    }

    #[test]
    fn test_missing_token_is_unauthorized() {
        let storage = Arc::new(crate::storage::MemoryStorage::new());
        let config = ClientConfig {
            api_base_url: "http://localhost:5000".to_string(),
            mail: crate::config::MailRelayConfig {
                endpoint: "http://localhost:5000/mail".to_string(),
                access_key: secrecy::SecretString::from("59514737-8b60-43af-b7c4-376df900c936"),
            },
            storage_path: None,
        };
        let api = HttpCheckoutApi::new(&config, storage);
        assert!(matches!(api.bearer_token(), Err(ApiError::Unauthorized)));
    }
}
