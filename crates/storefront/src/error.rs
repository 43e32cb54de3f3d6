//! Unified error type for checkout operations.
//!
//! Every failure a checkout operation can hit is converted to a
//! [`CheckoutError`] at the operation boundary; nothing propagates to the
//! UI shell as an unhandled fault. The `Display` text of each variant is
//! the user-facing message.

use thiserror::Error;

use crate::api::ApiError;

/// Application-level error type for the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// No bearer token or identity; the shell redirects to login.
    #[error("Please login to proceed with checkout")]
    NotAuthenticated,

    /// A form field failed validation; the message names the problem.
    #[error("{0}")]
    Validation(String),

    /// The cart has no lines for the current identity.
    #[error("Your cart is empty. Please add items to your cart before checkout.")]
    EmptyCart,

    /// No payment method chosen yet.
    #[error("Please select a payment method to continue")]
    NoPaymentMethod,

    /// Card payment chosen but the OTP round-trip has not completed.
    #[error("Please verify your card payment before placing the order")]
    CardNotVerified,

    /// Local pre-flight found lines exceeding their stock snapshot.
    #[error("Insufficient stock for the following items: {0}")]
    InsufficientStock(String),

    /// An order submission is already in flight.
    #[error("An order submission is already in progress")]
    SubmissionInProgress,

    /// Card/OTP verification problem; the message names the problem.
    #[error("{0}")]
    Verification(String),

    /// API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CheckoutError {
    /// Whether this failure is recoverable by re-running stock validation.
    #[must_use]
    pub const fn is_retryable_stock(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock(_) | Self::Api(ApiError::StockConflict(_))
        )
    }
}

/// Result type alias for [`CheckoutError`].
pub type Result<T> = std::result::Result<T, CheckoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            CheckoutError::NotAuthenticated.to_string(),
            "Please login to proceed with checkout"
        );
        assert_eq!(
            CheckoutError::Validation("Please enter a valid email address".to_string()).to_string(),
            "Please enter a valid email address"
        );
        assert_eq!(
            CheckoutError::EmptyCart.to_string(),
            "Your cart is empty. Please add items to your cart before checkout."
        );
    }

    #[test]
    fn test_stock_retryability() {
        assert!(CheckoutError::InsufficientStock("Milk: ...".to_string()).is_retryable_stock());
        assert!(CheckoutError::Api(ApiError::StockConflict(vec![])).is_retryable_stock());
        assert!(!CheckoutError::EmptyCart.is_retryable_stock());
        assert!(
            !CheckoutError::Api(ApiError::Api {
                status: 500,
                message: "boom".to_string()
            })
            .is_retryable_stock()
        );
    }
}
