//! Payment-gated demo API.
//!
//! Serves a few JSON endpoints behind a
//! [`PaymentGateLayer`](paylink_http::server::PaymentGateLayer): `/weather` and
//! `/transfers` cost one cent of USDC on Base Sepolia unless a route table
//! says otherwise, everything else is free.
//!
//! # Modules
//!
//! - [`config`] - Flags and environment
//! - [`error`] - Configuration and handler errors
//! - [`handlers`] - Endpoints and router
//! - [`util`] - Signal handling

pub mod config;
pub mod error;
pub mod handlers;
pub mod util;

use axum::Router;
use paylink::challenge::RequirementBuilder;
use paylink::networks::AssetBook;
use paylink_http::server::{PaymentGateLayer, payment_cors};
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::error::ConfigError;
use crate::handlers::AppState;

/// Builds the full application: handlers, payment gate, tracing and CORS
/// (outermost, so challenges carry CORS headers too).
///
/// # Errors
///
/// Returns [`ConfigError`] if the configuration is incomplete or invalid.
pub fn app(config: &GatewayConfig) -> Result<Router, ConfigError> {
    let assets = AssetBook::known();
    let pay_to = config.pay_to()?;
    let registry = config.registry(&assets)?;
    let facilitator = config.facilitator()?;

    for (route, price) in registry.routes() {
        tracing::info!(
            %route,
            price = %price.price,
            networks = ?price.networks,
            assets = ?price.assets,
            "Priced route"
        );
    }

    let mut gate = PaymentGateLayer::new(facilitator, registry, RequirementBuilder::new(pay_to, assets))
        .with_settlement(config.settle);
    if let Some(base_url) = &config.base_url {
        gate = gate.with_base_url(base_url.clone());
    }
    let state = AppState {
        counter: gate.access_counter().clone(),
    };

    Ok(handlers::router(state)
        .layer(gate)
        .layer(TraceLayer::new_for_http())
        .layer(payment_cors(&config.allowed_origins)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clap::Parser;
    use tower::ServiceExt;

    fn config() -> GatewayConfig {
        GatewayConfig::try_parse_from([
            "paylink-gateway",
            "--pay-to",
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
            "--facilitator-url",
            "http://127.0.0.1:9",
        ])
        .unwrap()
    }

    async fn get(app: Router, path: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::get(path)
                    .header("host", "localhost:4021")
                    .header("origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn paid_routes_are_challenged_and_free_routes_served() {
        let app = app(&config()).unwrap();

        let (status, body) = get(app.clone(), "/weather").await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["accepts"][0]["network"], "base-sepolia");
        assert_eq!(body["accepts"][0]["resource"], "http://localhost:4021/weather");

        let (status, _) = get(app.clone(), "/transfers").await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

        let (status, body) = get(app.clone(), "/free-data").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paid"], false);

        let (status, body) = get(app.clone(), "/api/access-counts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({}));

        let (status, body) = get(app.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, _) = get(app, "/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn refuses_to_start_without_pay_to() {
        let config = GatewayConfig::try_parse_from(["paylink-gateway", "--pay-to", ""]).unwrap();
        assert!(matches!(app(&config), Err(ConfigError::MissingPayTo)));
    }
}
