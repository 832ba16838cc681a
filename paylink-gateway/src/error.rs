//! Error types for the gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use paylink::amount::AmountError;
use paylink::registry::RegistryError;
use paylink_http::server::FacilitatorClientError;

/// Invalid startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No recipient address.
    #[error("PAY_TO is required: set --pay-to or the PAY_TO environment variable")]
    MissingPayTo,
    /// The route table is unreadable or cannot be priced.
    #[error("invalid route table: {0}")]
    Registry(#[from] RegistryError),
    /// A built-in price does not parse.
    #[error("invalid price: {0}")]
    Price(#[from] AmountError),
    /// The facilitator URL is unusable.
    #[error("invalid facilitator URL: {0}")]
    FacilitatorUrl(#[from] FacilitatorClientError),
}

/// Errors answered by the gateway's own handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No route matches.
    #[error("not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}
