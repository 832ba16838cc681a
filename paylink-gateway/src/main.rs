//! Payment-gated demo API server.
//!
//! # Usage
//!
//! ```bash
//! PAY_TO=0x... cargo run -p paylink-gateway --bin paylink-gateway
//!
//! # Custom route table and log level
//! ROUTES=routes.json RUST_LOG=debug cargo run -p paylink-gateway --bin paylink-gateway
//! ```
//!
//! See [`paylink_gateway::config`] for every option.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use paylink_gateway::config::GatewayConfig;
use paylink_gateway::util::SigDown;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("Gateway failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // reqwest talks TLS to the facilitator
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = GatewayConfig::parse();
    let app = paylink_gateway::app(&config)?;
    tracing::info!(
        facilitator = %config.facilitator_url,
        settle = config.settle,
        origins = ?config.allowed_origins,
        "Loaded configuration"
    );

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on http://{addr}");

    let sig_down = SigDown::try_new()?;
    let token = sig_down.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;
    sig_down.recv().await;

    tracing::info!("Gateway shut down gracefully");
    Ok(())
}
