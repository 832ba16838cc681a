//! Axum route handlers for the demo API.
//!
//! Which routes cost money is decided by the route table, not here; these
//! handlers only run once the payment gate admitted the request.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use axum::http::Uri;
use axum::routing::get;
use paylink_http::server::AccessCounter;
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::ApiError;

/// Shared state of the demo API.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    /// Paid access counts, shared with the payment gate.
    pub counter: AccessCounter,
}

/// One entry of the `/transfers` feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// Sender address.
    pub from: &'static str,
    /// Recipient address.
    pub to: &'static str,
    /// Amount in USDC.
    pub amount: &'static str,
    /// Network the transfer happened on.
    pub network: &'static str,
}

const TRANSFERS: [Transfer; 2] = [
    Transfer {
        from: "0x857b06519E91e3A54538791bDbb0E22373e36b66",
        to: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        amount: "12.50",
        network: "base-sepolia",
    },
    Transfer {
        from: "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        to: "0x4B20993Bc481177ec7E8f571ceCaE8A9e22C02db",
        amount: "3.00",
        network: "base-sepolia",
    },
];

/// `GET /weather`
pub async fn weather() -> Json<Value> {
    Json(json!({ "weather": "sunny", "temperature": "25°C" }))
}

/// `GET /transfers`
pub async fn transfers() -> Json<Value> {
    Json(json!({ "transfers": TRANSFERS }))
}

/// `GET /free-data`
pub async fn free_data() -> Json<Value> {
    Json(json!({ "message": "This data is free", "paid": false }))
}

/// `GET /api/access-counts` - paid accesses per route.
pub async fn access_counts(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.counter.snapshot())
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fallback for unknown paths.
///
/// # Errors
///
/// Always [`ApiError::NotFound`].
pub async fn not_found(uri: Uri) -> Result<Json<Value>, ApiError> {
    Err(ApiError::NotFound(uri.path().to_owned()))
}

/// All demo endpoints, without the payment gate.
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/weather", get(weather))
        .route("/transfers", get(transfers))
        .route("/free-data", get(free_data))
        .route("/api/access-counts", get(access_counts))
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
}
