//! Axum/tower middleware that charges for priced routes.
//!
//! Wrap a router in a [`PaymentGateLayer`] built from a
//! [`PriceRegistry`](paylink::registry::PriceRegistry), a
//! [`RequirementBuilder`](paylink::challenge::RequirementBuilder) and a
//! facilitator, usually a [`FacilitatorClient`]. Unpriced routes are
//! untouched. Priced routes answer `402 Payment Required` until the request
//! carries an `X-PAYMENT` proof the facilitator accepts.
//!
//! ## Responses
//!
//! - `402` with a fresh challenge for missing, malformed, stale, mismatched or
//!   rejected proofs, and for failed settlements
//! - `503` when the facilitator cannot be reached in time
//! - `500` when the facilitator answers with something unreadable
//!
//! Settlement after the inner service answered is off unless
//! [`PaymentGateLayer::with_settlement`] enables it.

pub mod access;
pub mod cors;
pub mod error;
pub mod facilitator_client;
pub mod layer;
pub mod paygate;

pub use access::AccessCounter;
pub use cors::payment_cors;
pub use error::{PaygateError, VerificationError};
pub use facilitator_client::{FacilitatorClient, FacilitatorClientError};
pub use layer::{PaymentGateLayer, PaymentGateService};
