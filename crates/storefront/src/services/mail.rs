//! Transactional mail relay client for OTP delivery.
//!
//! The card-verification flow emails the server-issued OTP to the account
//! holder through a generic form-to-email relay. This is the mock payment
//! channel, not a production processor: delivery failure is reported to the
//! caller and never blocks the checkout.

use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::MailRelayConfig;

/// Subject line used for every OTP message.
const OTP_SUBJECT: &str = "BankCard OTP";

/// Errors that can occur when relaying mail.
#[derive(Debug, Error)]
pub enum MailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Relay returned an error response.
    #[error("Mail relay error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Relay accepted the request but reported failure.
    #[error("Mail relay rejected the message: {0}")]
    Rejected(String),

    /// Failed to construct the client or parse a response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Everything needed to compose one OTP message.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpNotice {
    /// Server-issued one-time code.
    pub otp: String,
    /// Name on the verified card.
    pub card_name: String,
    /// Account holder's full name, shown in the message body.
    pub holder_name: String,
    /// Order total quoted in the message.
    pub order_total: Decimal,
}

impl OtpNotice {
    /// The message body sent to the customer.
    #[must_use]
    pub fn body(&self) -> String {
        format!(
            "Dear Customer, Your OTP for an online purchase of Rs. {} at MilkMaster (Holder: {}) is {}. Please do not share this OTP with anyone.",
            self.order_total, self.holder_name, self.otp
        )
    }
}

/// Port through which the checkout flow sends OTP mail.
#[allow(async_fn_in_trait)]
pub trait OtpMailer {
    /// Relay one OTP notice to the customer.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] when the relay cannot be reached or reports
    /// failure; callers treat this as non-fatal.
    async fn send_otp(&self, notice: &OtpNotice) -> Result<(), MailError>;
}

/// Production relay client.
#[derive(Clone)]
pub struct TransactionalMailer {
    client: reqwest::Client,
    endpoint: String,
    access_key: SecretString,
}

impl TransactionalMailer {
    /// Create a relay client from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &MailRelayConfig) -> Result<Self, MailError> {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            access_key: config.access_key.clone(),
        })
    }
}

impl OtpMailer for TransactionalMailer {
    #[instrument(skip(self, notice))]
    async fn send_otp(&self, notice: &OtpNotice) -> Result<(), MailError> {
        let body = serde_json::json!({
            "Subject": OTP_SUBJECT,
            "message": notice.body(),
            "access_key": self.access_key.expose_secret(),
        });

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let outcome: RelayResponse = response
            .json()
            .await
            .map_err(|e| MailError::Parse(e.to_string()))?;

        if outcome.success {
            debug!("OTP mail relayed");
            Ok(())
        } else {
            Err(MailError::Rejected(
                outcome.message.unwrap_or_else(|| "unspecified".to_string()),
            ))
        }
    }
}

/// Relay acknowledgement body.
#[derive(Debug, Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}
