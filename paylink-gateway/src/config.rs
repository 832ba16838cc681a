//! Gateway configuration.
//!
//! Every option is a command-line flag with an environment fallback; `.env`
//! files are loaded by the binary before parsing.
//!
//! # Environment Variables
//!
//! - `HOST` - Bind address (default: `0.0.0.0`)
//! - `PORT` - Port (default: `4021`)
//! - `PAY_TO` - Recipient address, required
//! - `FACILITATOR_URL` - Facilitator base URL (default: `https://x402.org/facilitator`)
//! - `FACILITATOR_TIMEOUT_SECS` - Per-call facilitator timeout (default: `10`)
//! - `ROUTES` - Path to a JSON route table (default: built-in demo routes)
//! - `BASE_URL` - Public base URL used in challenges (default: request `Host`)
//! - `ALLOWED_ORIGINS` - Comma separated CORS origins (default: `http://localhost:3000`)
//! - `SETTLE` - Settle payments after serving

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use paylink::amount::Price;
use paylink::networks::AssetBook;
use paylink::registry::{PriceRegistry, RouteConfig};
use paylink_http::constants::DEFAULT_FACILITATOR_URL;
use paylink_http::server::FacilitatorClient;
use url::Url;

use crate::error::ConfigError;

/// Network the built-in routes are priced on.
pub const DEFAULT_NETWORK: &str = "base-sepolia";

/// Command-line and environment configuration of the gateway.
#[derive(Debug, Clone, Parser)]
#[command(name = "paylink-gateway", version, about = "Payment-gated demo API")]
pub struct GatewayConfig {
    /// Bind address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port.
    #[arg(long, env = "PORT", default_value_t = 4021)]
    pub port: u16,

    /// Address payments are sent to.
    #[arg(long, env = "PAY_TO")]
    pub pay_to: Option<String>,

    /// Facilitator base URL.
    #[arg(long, env = "FACILITATOR_URL", default_value = DEFAULT_FACILITATOR_URL)]
    pub facilitator_url: String,

    /// Timeout for each facilitator call, in seconds.
    #[arg(long, env = "FACILITATOR_TIMEOUT_SECS", default_value_t = 10)]
    pub facilitator_timeout_secs: u64,

    /// JSON route table; the demo routes are used when absent.
    #[arg(long, env = "ROUTES")]
    pub routes: Option<PathBuf>,

    /// Public base URL of this server.
    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<Url>,

    /// Origins allowed to call the API from a browser.
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// Settle verified payments after the handler answered.
    #[arg(long, env = "SETTLE")]
    pub settle: bool,
}

impl GatewayConfig {
    /// The socket address to bind.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The recipient address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingPayTo`] if none is configured.
    pub fn pay_to(&self) -> Result<&str, ConfigError> {
        self.pay_to
            .as_deref()
            .map(str::trim)
            .filter(|pay_to| !pay_to.is_empty())
            .ok_or(ConfigError::MissingPayTo)
    }

    /// Loads the route table and checks it against `assets`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Registry`] if the table cannot be read or
    /// priced with the known assets.
    pub fn registry(&self, assets: &AssetBook) -> Result<PriceRegistry, ConfigError> {
        let registry = match &self.routes {
            Some(path) => PriceRegistry::from_path(path)?,
            None => default_registry()?,
        };
        registry.validate(assets)?;
        Ok(registry)
    }

    /// The facilitator client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FacilitatorUrl`] if the URL does not parse.
    pub fn facilitator(&self) -> Result<FacilitatorClient, ConfigError> {
        let client = FacilitatorClient::try_from(self.facilitator_url.as_str())?;
        Ok(client.with_timeout(Duration::from_secs(self.facilitator_timeout_secs)))
    }
}

/// `/weather` and `/transfers`, one cent each on [`DEFAULT_NETWORK`].
///
/// # Errors
///
/// Never in practice; the table is static.
pub fn default_registry() -> Result<PriceRegistry, ConfigError> {
    let cent = Price::parse("$0.01")?;
    let registry = PriceRegistry::new()
        .with_route(
            "GET",
            "/weather",
            RouteConfig::new(cent.clone(), DEFAULT_NETWORK).with_description("Current weather"),
        )?
        .with_route(
            "GET",
            "/transfers",
            RouteConfig::new(cent, DEFAULT_NETWORK).with_description("Recent transfers"),
        )?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    #[test]
    fn defaults() {
        let config = GatewayConfig::try_parse_from(["paylink-gateway", "--pay-to", PAY_TO]).unwrap();
        assert_eq!(config.port, 4021);
        assert_eq!(config.pay_to().unwrap(), PAY_TO);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000".to_owned()]);
        assert!(!config.settle);

        let facilitator = config.facilitator().unwrap();
        assert_eq!(facilitator.verify_url().as_str(), "https://x402.org/facilitator/verify");
        assert_eq!(facilitator.timeout(), Duration::from_secs(10));

        let registry = config.registry(&AssetBook::known()).unwrap();
        assert!(registry.contains("GET", "/weather"));
        assert!(registry.contains("GET", "/transfers"));
        assert!(!registry.contains("GET", "/free-data"));
    }

    #[test]
    fn missing_pay_to_is_fatal() {
        let config = GatewayConfig::try_parse_from(["paylink-gateway", "--pay-to", "  "]).unwrap();
        assert!(matches!(config.pay_to(), Err(ConfigError::MissingPayTo)));
    }

    #[test]
    fn origins_split_on_commas() {
        let config = GatewayConfig::try_parse_from([
            "paylink-gateway",
            "--allowed-origins",
            "http://a.example,http://b.example",
        ])
        .unwrap();
        assert_eq!(config.allowed_origins.len(), 2);
    }

    #[test]
    fn route_tables_with_unknown_networks_are_rejected() {
        let path = std::env::temp_dir().join(format!("paylink-routes-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "GET /weather": { "price": "$0.01", "network": "atlantis" } }"#).unwrap();
        let config = GatewayConfig::try_parse_from([
            "paylink-gateway",
            "--routes",
            path.to_str().unwrap(),
        ])
        .unwrap();
        let err = config.registry(&AssetBook::known()).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::Registry(_)));
    }
}
