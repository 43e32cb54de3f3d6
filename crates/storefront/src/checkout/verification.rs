//! Card-verification sub-flow state.

/// State of the card/OTP verification sub-flow.
///
/// One tagged value instead of independent booleans, so the illegal
/// combinations (an awaited OTP with no verified card, a verified OTP with
/// no expected value) are unrepresentable. The transient "verifying" phase
/// lives inside the async call driving the transition; between calls the
/// flow is always in exactly one of these states.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CardVerification {
    /// No verification attempted yet.
    #[default]
    Idle,
    /// The card was declined or the attempt errored; retry allowed.
    Failed {
        /// User-facing reason.
        message: String,
    },
    /// Card verified; waiting for the customer to type the emailed OTP.
    OtpPending {
        /// The server-issued OTP the entry will be checked against.
        expected_otp: String,
        /// Whether the OTP mail relay reported success. `false` is
        /// non-fatal: the customer may resend.
        mail_relayed: bool,
    },
    /// OTP matched; the order may be placed as paid.
    OtpVerified,
}

impl CardVerification {
    /// Whether the sub-flow has fully completed.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::OtpVerified)
    }

    /// Whether an OTP entry is currently awaited.
    #[must_use]
    pub const fn is_otp_pending(&self) -> bool {
        matches!(self, Self::OtpPending { .. })
    }
}
