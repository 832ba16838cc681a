//! Reqwest middleware that pays `402 Payment Required` challenges.
//!
//! Build a [`PaymentClient`] from a [`ProofBuilder`](paylink::proof::ProofBuilder)
//! holding a signer, attach it with [`WithPayments::with_payments`] and use
//! the resulting client as usual. A payment failure surfaces as a
//! `reqwest_middleware::Error`; [`payment_error`] recovers the typed
//! [`PaymentError`](paylink::PaymentError).
//!
//! ```ignore
//! let proofs = ProofBuilder::new(AssetBook::known()).with_signer(signer);
//! let client = reqwest::Client::new()
//!     .with_payments(PaymentClient::new(proofs))
//!     .build();
//! let weather = client.get("http://localhost:4021/weather").send().await?;
//! ```
//!
//! [`PaymentClient::with_selector`] replaces the default
//! [`FirstMatch`](paylink::selector::FirstMatch) selection.

mod middleware;

pub use middleware::*;

use reqwest::{Client, ClientBuilder};
use reqwest_middleware as rqm;

/// Attaches a [`PaymentClient`] to a reqwest [`Client`] or [`ClientBuilder`].
pub trait WithPayments: Sized {
    /// Pairs `self` with `payments`; finish with `build` or `builder`.
    fn with_payments<S>(self, payments: PaymentClient<S>) -> PayingClient<Self, S> {
        PayingClient { base: self, payments }
    }
}

impl WithPayments for Client {}

impl WithPayments for ClientBuilder {}

/// A reqwest client or builder waiting for its payment middleware.
#[derive(Debug)]
pub struct PayingClient<B, S> {
    base: B,
    payments: PaymentClient<S>,
}

impl<S> PayingClient<Client, S>
where
    PaymentClient<S>: rqm::Middleware,
{
    /// The middleware builder, for stacking more middleware.
    #[must_use]
    pub fn builder(self) -> rqm::ClientBuilder {
        rqm::ClientBuilder::new(self.base).with(self.payments)
    }

    /// The finished client.
    #[must_use]
    pub fn build(self) -> rqm::ClientWithMiddleware {
        self.builder().build()
    }
}

impl<S> PayingClient<ClientBuilder, S>
where
    PaymentClient<S>: rqm::Middleware,
{
    /// Builds the reqwest client, then wraps it in the payment middleware.
    ///
    /// # Errors
    ///
    /// Returns the [`reqwest::Error`] of building the underlying client.
    pub fn builder(self) -> Result<rqm::ClientBuilder, reqwest::Error> {
        let client = self.base.build()?;
        Ok(rqm::ClientBuilder::new(client).with(self.payments))
    }

    /// The finished client.
    ///
    /// # Errors
    ///
    /// Returns the [`reqwest::Error`] of building the underlying client.
    pub fn build(self) -> Result<rqm::ClientWithMiddleware, reqwest::Error> {
        self.builder().map(rqm::ClientBuilder::build)
    }
}
