//! Checkout wizard state machine.
//!
//! A linear three-step flow - Address, Summary, Payment - over the cart
//! store. Forward transitions are guarded; back transitions are always
//! allowed and never discard form data. Order submission is a terminal
//! action off the Payment step, not a step of its own.
//!
//! The flow owns one wizard session's worth of state: it is created when
//! the wizard mounts (requiring an identity) and discarded after a
//! successful submission or navigation away. Nothing here is persisted.

mod verification;

pub use verification::CardVerification;

use std::sync::Arc;

use milkmaster_core::{Email, OrderId, PaymentMethod, PaymentStatus, Price, UserId};
use tracing::{debug, instrument, warn};

use crate::api::types::{OrderItem, PaymentDetails, StockCheckItem};
use crate::api::{CheckoutApi, OrderResponse};
use crate::cart::CartStore;
use crate::error::{CheckoutError, Result};
use crate::identity::IdentityResolver;
use crate::models::{CartLine, DeliveryAddress, Profile};
use crate::services::{OtpMailer, OtpNotice};
use crate::storage::{StoragePort, keys};

/// Minimum accepted OTP length, checked before the server round-trip.
const MIN_OTP_LENGTH: usize = 6;

/// Delivery form fields, listed in the order they are reported missing.
const REQUIRED_FIELDS: [&str; 8] = [
    "firstName", "lastName", "email", "phone", "address", "city", "state", "pincode",
];

// =============================================================================
// Wizard state
// =============================================================================

/// Current wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CheckoutStep {
    #[default]
    Address,
    Summary,
    Payment,
}

/// Delivery details collected on the Address step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

impl DeliveryForm {
    /// Wire-named labels of the fields still blank.
    fn missing_fields(&self) -> Vec<&'static str> {
        let values = [
            &self.first_name,
            &self.last_name,
            &self.email,
            &self.phone,
            &self.address,
            &self.city,
            &self.state,
            &self.pincode,
        ];
        REQUIRED_FIELDS
            .iter()
            .zip(values)
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(label, _)| *label)
            .collect()
    }

    /// The address block submitted with the order.
    fn to_address(&self) -> DeliveryAddress {
        DeliveryAddress {
            name: format!("{} {}", self.first_name.trim(), self.last_name.trim()),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            pincode: self.pincode.clone(),
        }
    }
}

/// Card details collected on the Payment step.
///
/// The CVV lives only here; it is sent to the verification endpoint and is
/// never part of the order payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardForm {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
    pub holder_name: String,
}

impl CardForm {
    fn is_complete(&self) -> bool {
        !self.number.trim().is_empty()
            && !self.expiry.trim().is_empty()
            && !self.cvv.trim().is_empty()
            && !self.holder_name.trim().is_empty()
    }

    fn digits(&self) -> String {
        self.number.chars().filter(char::is_ascii_digit).collect()
    }
}

/// Where the delivery form's prefill data came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSource {
    /// Prefilled from the backend profile endpoint.
    Backend,
    /// Backend fetch failed; locally cached data was used. Carries the
    /// user-facing notice.
    LocalFallback(String),
}

/// Confirmation data handed off to the order-success page.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub order_number: Option<String>,
    pub status: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    /// Opaque per-product stock adjustments reported by the server.
    pub stock_updates: Vec<serde_json::Value>,
}

impl From<OrderResponse> for OrderConfirmation {
    fn from(response: OrderResponse) -> Self {
        Self {
            order_id: response.id,
            order_number: response.order_number,
            status: response.status,
            payment_method: response.payment_method,
            payment_status: response.payment_status,
            stock_updates: response.stock_updates,
        }
    }
}

// =============================================================================
// CheckoutFlow
// =============================================================================

/// The checkout wizard controller.
///
/// Generic over the API and mailer seams so tests drive the full flow with
/// scripted collaborators.
pub struct CheckoutFlow<A, M> {
    api: A,
    mailer: M,
    storage: Arc<dyn StoragePort>,
    cart: CartStore,
    user_id: UserId,
    token_email: Option<String>,
    step: CheckoutStep,
    /// Delivery details; edited directly by the form bindings.
    pub delivery: DeliveryForm,
    /// Chosen payment method, unset until the customer picks one.
    pub payment_method: Option<PaymentMethod>,
    /// Card details; edited directly by the form bindings.
    pub card: CardForm,
    verification: CardVerification,
    profile_source: Option<ProfileSource>,
    retry_count: u32,
    stock_refresh_advised: bool,
    busy: bool,
}

impl<A: CheckoutApi, M: OtpMailer> CheckoutFlow<A, M> {
    /// Create a flow for the current identity.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::NotAuthenticated`] when no bearer token is
    /// stored or no identity can be resolved; the shell redirects to login
    /// and no checkout state survives that redirect.
    pub fn new(api: A, mailer: M, storage: Arc<dyn StoragePort>) -> Result<Self> {
        let resolver = IdentityResolver::new(Arc::clone(&storage));
        if !resolver.has_token() {
            return Err(CheckoutError::NotAuthenticated);
        }
        let user_id = resolver.resolve().ok_or(CheckoutError::NotAuthenticated)?;
        let token_email = resolver.token_email();
        let cart = CartStore::new(Arc::clone(&storage));

        Ok(Self {
            api,
            mailer,
            storage,
            cart,
            user_id,
            token_email,
            step: CheckoutStep::Address,
            delivery: DeliveryForm::default(),
            payment_method: None,
            card: CardForm::default(),
            verification: CardVerification::Idle,
            profile_source: None,
            retry_count: 0,
            stock_refresh_advised: false,
            busy: false,
        })
    }

    // =========================================================================
    // Profile prefill
    // =========================================================================

    /// Prefill the delivery form from the backend profile, falling back to
    /// the locally cached record when the fetch fails.
    ///
    /// Field precedence on success: API value, then cached value. The email
    /// additionally falls back to the token's email claim. The outcome is
    /// recorded and returned so the shell can show the data-source badge.
    #[instrument(skip(self))]
    pub async fn load_profile(&mut self) -> ProfileSource {
        let cached = self.cached_profile().unwrap_or_default();

        let source = match self.api.fetch_profile().await {
            Ok(profile) => {
                self.fill_delivery(&profile, &cached);
                ProfileSource::Backend
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed; using locally stored data");
                self.fill_delivery(&Profile::default(), &cached);
                ProfileSource::LocalFallback(format!(
                    "Could not load data from backend: {e}. Using locally stored data instead."
                ))
            }
        };

        self.profile_source = Some(source.clone());
        source
    }

    fn cached_profile(&self) -> Option<Profile> {
        let raw = self.storage.get(keys::USER)?;
        match serde_json::from_str(&raw) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "Cached profile record is unreadable");
                None
            }
        }
    }

    fn fill_delivery(&mut self, primary: &Profile, cached: &Profile) {
        let token_email = self.token_email.as_deref();
        self.delivery = DeliveryForm {
            first_name: pick([primary.first_name.as_deref(), cached.first_name.as_deref()]),
            last_name: pick([primary.last_name.as_deref(), cached.last_name.as_deref()]),
            email: pick([
                primary.email.as_deref(),
                token_email,
                cached.email.as_deref(),
            ]),
            phone: pick([primary.phone.as_deref(), cached.phone.as_deref()]),
            address: pick([primary.address.as_deref(), cached.address.as_deref()]),
            city: pick([primary.city.as_deref(), cached.city.as_deref()]),
            state: pick([primary.state.as_deref(), cached.state.as_deref()]),
            pincode: pick([primary.pincode.as_deref(), cached.pincode.as_deref()]),
        };
    }

    // =========================================================================
    // Step transitions
    // =========================================================================

    /// Advance the wizard one step, enforcing the current step's guard.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckoutError::Validation`] or [`CheckoutError::EmptyCart`]
    /// when the guard fails; the step does not change.
    pub fn next_step(&mut self) -> Result<CheckoutStep> {
        match self.step {
            CheckoutStep::Address => {
                let missing = self.delivery.missing_fields();
                if !missing.is_empty() {
                    return Err(CheckoutError::Validation(format!(
                        "Please fill all required fields: {}",
                        missing.join(", ")
                    )));
                }
                if Email::parse(self.delivery.email.trim()).is_err() {
                    return Err(CheckoutError::Validation(
                        "Please enter a valid email address".to_string(),
                    ));
                }
                self.step = CheckoutStep::Summary;
            }
            CheckoutStep::Summary => {
                if self.cart.is_empty() {
                    return Err(CheckoutError::EmptyCart);
                }
                self.step = CheckoutStep::Payment;
            }
            // Forward from Payment is the submit action, not a step change
            CheckoutStep::Payment => {}
        }
        Ok(self.step)
    }

    /// Step back one step. Always permitted; clears no form data.
    pub fn back(&mut self) -> CheckoutStep {
        self.step = match self.step {
            CheckoutStep::Address | CheckoutStep::Summary => CheckoutStep::Address,
            CheckoutStep::Payment => CheckoutStep::Summary,
        };
        self.step
    }

    // =========================================================================
    // Card verification
    // =========================================================================

    /// Run the mock card verification and, on success, relay the
    /// server-issued OTP to the account holder by email.
    ///
    /// A server-side decline lands in [`CardVerification::Failed`] and
    /// returns `Ok`; the customer corrects the card and retries. A relay
    /// failure is non-fatal: the flow still awaits the OTP with
    /// `mail_relayed == false` so the customer can resend.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] when card fields are missing
    /// and [`CheckoutError::Api`] on transport failures.
    #[instrument(skip(self))]
    pub async fn verify_card(&mut self) -> Result<()> {
        if self.payment_method != Some(PaymentMethod::Card) {
            return Err(CheckoutError::Validation(
                "Select card payment before verifying a card".to_string(),
            ));
        }
        if !self.card.is_complete() {
            return Err(CheckoutError::Validation(
                "Please fill in all card details before verifying".to_string(),
            ));
        }

        let request = crate::api::CardVerifyRequest {
            card_number: self.card.number.clone(),
            card_expiry: self.card.expiry.clone(),
            card_cvv: self.card.cvv.clone(),
            card_name: self.card.holder_name.clone(),
        };

        let response = match self.api.verify_card(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.verification = CardVerification::Failed {
                    message: "Error verifying card. Please try again.".to_string(),
                };
                return Err(e.into());
            }
        };

        if !response.success {
            self.verification = CardVerification::Failed {
                message: response
                    .message
                    .unwrap_or_else(|| "Card verification failed".to_string()),
            };
            return Ok(());
        }

        let Some(otp) = response.otp else {
            // The mock processor always issues an OTP with success; a reply
            // without one leaves nothing to verify against.
            self.verification = CardVerification::Failed {
                message: "Card verified but no OTP was issued. Please try again.".to_string(),
            };
            return Ok(());
        };

        let notice = OtpNotice {
            otp: otp.clone(),
            card_name: self.card.holder_name.clone(),
            holder_name: format!(
                "{} {}",
                self.delivery.first_name.trim(),
                self.delivery.last_name.trim()
            ),
            order_total: self.cart.cart_total(),
        };
        let mail_relayed = match self.mailer.send_otp(&notice).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to relay OTP email");
                false
            }
        };

        debug!(mail_relayed, "Card verified, awaiting OTP");
        self.verification = CardVerification::OtpPending {
            expected_otp: otp,
            mail_relayed,
        };
        Ok(())
    }

    /// Check a customer-entered OTP against the server-issued one.
    ///
    /// A mismatch keeps the flow awaiting the same OTP; both retry and
    /// resend stay available. There is no attempt limit.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Verification`] for a short or wrong entry
    /// and [`CheckoutError::Api`] on transport failures.
    #[instrument(skip(self, entered))]
    pub async fn verify_otp(&mut self, entered: &str) -> Result<()> {
        let CardVerification::OtpPending { expected_otp, .. } = &self.verification else {
            return Err(CheckoutError::Verification(
                "No OTP verification is in progress".to_string(),
            ));
        };

        let entered = entered.trim();
        if entered.len() < MIN_OTP_LENGTH {
            return Err(CheckoutError::Verification(
                "Invalid OTP: Please enter a valid 6-digit OTP".to_string(),
            ));
        }

        let expected = expected_otp.clone();
        let response = self.api.verify_otp(entered, &expected).await?;

        if response.success {
            self.verification = CardVerification::OtpVerified;
            Ok(())
        } else {
            Err(CheckoutError::Verification(response.message.unwrap_or_else(
                || "Invalid OTP. Please check and try again.".to_string(),
            )))
        }
    }

    /// Re-run card verification to reissue (and re-send) a fresh OTP.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::verify_card`].
    pub async fn resend_otp(&mut self) -> Result<()> {
        self.verify_card().await
    }

    // =========================================================================
    // Order submission
    // =========================================================================

    /// Submit the order. Terminal action, only valid from the Payment step.
    ///
    /// Runs the local stock re-check, the server stock validation, and the
    /// order post in that order; the first failure aborts. On success the
    /// cart is cleared and the confirmation hand-off is returned.
    ///
    /// # Errors
    ///
    /// Any [`CheckoutError`]; stock-related failures additionally raise the
    /// stale-stock refresh advisory.
    #[instrument(skip(self))]
    pub async fn place_order(&mut self) -> Result<OrderConfirmation> {
        if self.busy {
            return Err(CheckoutError::SubmissionInProgress);
        }
        self.busy = true;
        let result = self.submit().await;
        self.busy = false;
        result
    }

    /// Re-run the server stock validation after a stock failure, then
    /// continue into submission when it passes.
    ///
    /// Each invocation increments the surfaced retry counter. Never called
    /// automatically.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::place_order`].
    #[instrument(skip(self))]
    pub async fn retry_stock_validation(&mut self) -> Result<OrderConfirmation> {
        if self.busy {
            return Err(CheckoutError::SubmissionInProgress);
        }
        self.busy = true;
        self.retry_count += 1;
        let result = self.retry_inner().await;
        self.busy = false;
        result
    }

    async fn retry_inner(&mut self) -> Result<OrderConfirmation> {
        self.ensure_payment_step()?;
        let items = self.cart.user_cart_items();
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        self.validate_stock_remote(&items).await?;
        self.stock_refresh_advised = false;
        let method = self.payment_method.ok_or(CheckoutError::NoPaymentMethod)?;
        self.submit_validated(&items, method).await
    }

    async fn submit(&mut self) -> Result<OrderConfirmation> {
        self.ensure_payment_step()?;
        self.stock_refresh_advised = false;

        let items = self.cart.user_cart_items();
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let method = self.payment_method.ok_or(CheckoutError::NoPaymentMethod)?;
        if method == PaymentMethod::Card {
            if !self.card.is_complete() {
                return Err(CheckoutError::Validation(
                    "Please fill in all card details before placing an order.".to_string(),
                ));
            }
            if !self.verification.is_verified() {
                return Err(CheckoutError::CardNotVerified);
            }
        }

        // Step 1: local re-check against the stock snapshots; no network
        // call is made when this fails.
        let shortages: Vec<String> = items
            .iter()
            .filter(|line| line.quantity > line.stock)
            .map(|line| {
                format!(
                    "{}: Requested {}, only {} in stock",
                    line.name, line.quantity, line.stock
                )
            })
            .collect();
        if !shortages.is_empty() {
            self.stock_refresh_advised = true;
            return Err(CheckoutError::InsufficientStock(shortages.join("; ")));
        }

        // Step 2: server-authoritative validation.
        self.validate_stock_remote(&items).await?;

        self.submit_validated(&items, method).await
    }

    async fn validate_stock_remote(&mut self, items: &[CartLine]) -> Result<()> {
        let checks: Vec<StockCheckItem> = items
            .iter()
            .map(|line| StockCheckItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            })
            .collect();

        match self.api.validate_stock(&checks).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.stock_refresh_advised = true;
                Err(e.into())
            }
        }
    }

    async fn submit_validated(
        &mut self,
        items: &[CartLine],
        method: PaymentMethod,
    ) -> Result<OrderConfirmation> {
        // Step 3: the card path must have completed the OTP round-trip.
        if method == PaymentMethod::Card && !self.verification.is_verified() {
            return Err(CheckoutError::CardNotVerified);
        }

        let order = self.build_order(items, method);
        match self.api.submit_order(&order).await {
            Ok(response) => {
                debug!(order_id = %response.id, "Order placed");
                self.cart.clear_cart();
                Ok(OrderConfirmation::from(response))
            }
            Err(e) => {
                self.stock_refresh_advised = true;
                Err(e.into())
            }
        }
    }

    fn build_order(&self, items: &[CartLine], method: PaymentMethod) -> crate::api::OrderRequest {
        // Card details are reduced before transmission: digits-only number,
        // last four, expiry, holder. The CVV is never serialized.
        let payment_details = match method {
            PaymentMethod::Card => {
                let digits = self.card.digits();
                let last_four = if digits.len() >= 4 {
                    digits.chars().skip(digits.len() - 4).collect()
                } else {
                    "****".to_string()
                };
                Some(PaymentDetails {
                    card_number: digits,
                    last_four,
                    expiry_date: self.card.expiry.clone(),
                    card_name: self.card.holder_name.clone(),
                })
            }
            PaymentMethod::CashOnDelivery => None,
        };

        crate::api::OrderRequest {
            user_id: self.user_id.clone(),
            items: items
                .iter()
                .map(|line| OrderItem {
                    product_id: line.product_id.clone(),
                    name: line.name.clone(),
                    price: line.price,
                    quantity: line.quantity,
                    image_url: line.image_url.clone(),
                })
                .collect(),
            total: Price::new(self.cart.cart_total()),
            delivery_address: self.delivery.to_address(),
            payment_method: method,
            payment_details,
            payment_status: if method == PaymentMethod::Card {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Pending
            },
        }
    }

    fn ensure_payment_step(&self) -> Result<()> {
        if self.step == CheckoutStep::Payment {
            Ok(())
        } else {
            Err(CheckoutError::Validation(
                "Complete the checkout steps before placing the order".to_string(),
            ))
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The current wizard step.
    #[must_use]
    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    /// The identity this session checks out as.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Current card-verification state.
    #[must_use]
    pub const fn verification(&self) -> &CardVerification {
        &self.verification
    }

    /// Where the delivery prefill came from, once loaded.
    #[must_use]
    pub const fn profile_source(&self) -> Option<&ProfileSource> {
        self.profile_source.as_ref()
    }

    /// How many times stock validation has been manually retried.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Whether the stale-stock advisory (full-page reload offer) is up.
    #[must_use]
    pub const fn stock_refresh_advised(&self) -> bool {
        self.stock_refresh_advised
    }

    /// Whether a submission is in flight; the shell disables the submit
    /// control while set.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy
    }

    /// The cart this flow reads from.
    #[must_use]
    pub const fn cart(&self) -> &CartStore {
        &self.cart
    }

    /// Mutable access to the cart (quantity edits on the Summary step).
    pub const fn cart_mut(&mut self) -> &mut CartStore {
        &mut self.cart
    }
}

/// First non-blank candidate, or empty.
fn pick<const N: usize>(candidates: [Option<&str>; N]) -> String {
    candidates
        .into_iter()
        .flatten()
        .find(|value| !value.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}
