//! Errors raised while gating a request.
//!
//! [`VerificationError`] covers everything the payer can fix by paying again;
//! the gate answers those with a fresh `402` challenge. [`PaygateError`] adds
//! the failures that are not the payer's fault.

use axum_core::response::{IntoResponse, Response};
use http::StatusCode;
use http::header::CONTENT_TYPE;
use paylink::challenge::BuildError;
use paylink::facilitator::FacilitatorError;
use serde_json::json;

/// Problems with the presented proof.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    /// Required payment header is missing.
    #[error("{0} header is required")]
    PaymentHeaderRequired(&'static str),
    /// Payment header is present but malformed.
    #[error("Invalid or malformed payment header")]
    InvalidPaymentHeader,
    /// The nonce was not issued by this server for this route.
    #[error("Payment challenge was not issued for this resource")]
    UnknownChallenge,
    /// The challenge nonce is too old or issued in the future.
    #[error("Payment challenge expired")]
    StaleChallenge,
    /// The proof does not pay for any requirement of this route.
    #[error("Unable to find matching payment requirements")]
    NoPaymentMatching,
    /// The facilitator judged the proof invalid.
    #[error("{0}")]
    Rejected(String),
}

/// Any reason a gated request was not served.
#[derive(Debug, thiserror::Error)]
pub enum PaygateError {
    /// Payment verification failed.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// The facilitator refused to settle a verified payment.
    #[error("Settlement failed: {0}")]
    Settlement(String),
    /// The facilitator could not be reached in time.
    #[error("Payment facilitator unavailable")]
    Unavailable(#[source] FacilitatorError),
    /// The facilitator answered with garbage.
    #[error("Payment facilitator failure")]
    Backend(#[source] FacilitatorError),
    /// The route's price cannot be turned into requirements.
    #[error("Route cannot be quoted: {0}")]
    Quote(#[from] BuildError),
}

impl From<FacilitatorError> for PaygateError {
    fn from(err: FacilitatorError) -> Self {
        if err.is_unavailable() {
            Self::Unavailable(err)
        } else {
            Self::Backend(err)
        }
    }
}

impl PaygateError {
    /// Whether the payer should be sent a fresh challenge.
    #[must_use]
    pub const fn is_challenge(&self) -> bool {
        matches!(self, Self::Verification(_) | Self::Settlement(_))
    }

    /// The status this error is answered with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Verification(_) | Self::Settlement(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Backend(_) | Self::Quote(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A bare JSON error body.
///
/// The gate replaces challenge-worthy errors with a full challenge before this
/// is reached; this rendering is what unavailable and backend failures get.
impl IntoResponse for PaygateError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string() }).to_string();
        (self.status(), [(CONTENT_TYPE, "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facilitator_failures_split_by_availability() {
        let unavailable = PaygateError::from(FacilitatorError::Unavailable("timeout".into()));
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!unavailable.is_challenge());

        let backend = PaygateError::from(FacilitatorError::Backend("bad json".into()));
        assert_eq!(backend.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejected_proofs_are_challenges() {
        let err = PaygateError::from(VerificationError::Rejected("insufficient_funds".into()));
        assert!(err.is_challenge());
        assert_eq!(err.to_string(), "insufficient_funds");
        assert_eq!(err.into_response().status(), StatusCode::PAYMENT_REQUIRED);
    }
}
