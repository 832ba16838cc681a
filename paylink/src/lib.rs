#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core of the HTTP 402 payment challenge-response protocol.
//!
//! A resource server prices routes in a [`registry::PriceRegistry`]; unpaid
//! requests to priced routes get a `402 Payment Required` carrying a
//! [`proto::PaymentChallenge`] built by [`challenge::RequirementBuilder`].
//! A client picks one requirement with a [`selector::PaymentSelector`], turns
//! it into a signed [`proto::PaymentProof`] with [`proof::ProofBuilder`] and
//! retries once. The server hands the proof to a [`facilitator::Facilitator`]
//! for verification.
//!
//! This crate holds the transport-independent pieces. HTTP integration lives
//! in `paylink-http`.
//!
//! # Modules
//!
//! - [`amount`] - Prices with explicit currency, atomic unit conversion
//! - [`challenge`] - Requirement builder and challenge nonces
//! - [`encoding`] - Base64 JSON header payloads
//! - [`error`] - Client failure taxonomy
//! - [`facilitator`] - Verification/settlement seam
//! - [`networks`] - Known networks and assets
//! - [`nonce`] - Freshness nonces
//! - [`proof`] - Proof builder and signer seam
//! - [`proto`] - Wire types
//! - [`registry`] - Route pricing
//! - [`selector`] - Requirement selection
//! - [`timestamp`] - Unix timestamps
//!
//! # Feature Flags
//!
//! - `telemetry` - `tracing` instrumentation
//! - `evm` - [`proof::PaymentSigner`] for alloy's `PrivateKeySigner`

pub mod amount;
pub mod challenge;
pub mod encoding;
pub mod error;
pub mod facilitator;
pub mod networks;
pub mod nonce;
pub mod proof;
pub mod proto;
pub mod registry;
pub mod selector;
#[cfg(feature = "evm")]
pub mod signer;
pub mod timestamp;

pub use error::{ErrorKind, PaymentError};
