//! The facilitator seam.
//!
//! A facilitator checks that a [`PaymentProof`](crate::proto::PaymentProof)
//! really authorizes the transfer a requirement asks for, and later settles
//! it. paylink never does either itself; the gateway talks to whatever
//! implements [`Facilitator`], usually the HTTP client in `paylink-http`.

use std::error::Error;
use std::future::Future;
use std::sync::Arc;

use crate::proto::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

/// Boxed cause of a facilitator failure.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Why a facilitator call produced no verdict.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorError {
    /// Transport failure, timeout, or an overloaded facilitator.
    #[error("facilitator unavailable: {0}")]
    Unavailable(#[source] BoxError),
    /// The facilitator answered with something other than a verdict.
    #[error("facilitator failure: {0}")]
    Backend(#[source] BoxError),
}

impl FacilitatorError {
    /// Whether the failure means the facilitator could not be reached.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Verification and settlement of payment proofs.
pub trait Facilitator: Send + Sync {
    /// Checks a proof against the requirement it claims to satisfy.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, FacilitatorError>> + Send;

    /// Settles a previously verified proof.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, FacilitatorError>> + Send;
}

impl<T: Facilitator> Facilitator for Arc<T> {
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, FacilitatorError>> + Send {
        (**self).verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, FacilitatorError>> + Send {
        (**self).settle(request)
    }
}
