#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for paylink payments.
//!
//! # Modules
//!
//! - [`constants`] - Header names and default URLs
//! - [`server`] - Payment gate layer and facilitator client (feature: `server`)
//! - [`client`] - Paying `reqwest` middleware (feature: `client`)

pub mod constants;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "server")]
pub mod server;
