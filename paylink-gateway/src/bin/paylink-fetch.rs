//! Fetches URLs, paying any `402 Payment Required` challenge on the way.
//!
//! ```bash
//! PRIVATE_KEY=0x... cargo run -p paylink-gateway --bin paylink-fetch -- \
//!     --max-price '$0.05' http://localhost:4021/weather
//! ```
//!
//! Response bodies go to stdout, logs to stderr. Exits with status 1 if any
//! URL could not be fetched.

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use paylink::amount::Price;
use paylink::networks::AssetBook;
use paylink::proof::ProofBuilder;
use paylink::selector::FirstMatch;
use paylink::signer::parse_private_key;
use paylink_http::client::{PaymentClient, WithPayments, payment_error, settlement_of};
use tracing_subscriber::EnvFilter;
use url::Url;

/// Command-line options.
#[derive(Debug, Parser)]
#[command(name = "paylink-fetch", version, about = "Fetch URLs, paying 402 challenges")]
struct Args {
    /// URLs to fetch, in order.
    #[arg(required = true)]
    urls: Vec<Url>,

    /// Payer key: 0x followed by 64 hex characters.
    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    private_key: String,

    /// Networks to pay on, most preferred first.
    #[arg(long, env = "NETWORK", value_delimiter = ',', default_value = "base-sepolia")]
    network: Vec<String>,

    /// Payment scheme.
    #[arg(long, default_value = "exact")]
    scheme: String,

    /// Refuse requirements priced above this, e.g. `$0.05`.
    #[arg(long, env = "MAX_PRICE")]
    max_price: Option<Price>,

    /// Seconds to wait for the signer.
    #[arg(long, default_value_t = 10)]
    signing_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("paylink-fetch failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = Args::parse();
    let signer = parse_private_key(&args.private_key)?;
    let proofs = ProofBuilder::new(AssetBook::known())
        .with_signer(signer)
        .with_timeout(Duration::from_secs(args.signing_timeout_secs));

    let mut selector = FirstMatch::new(args.network).with_schemes([args.scheme]);
    if let Some(ceiling) = args.max_price {
        selector = selector.with_max_price(ceiling);
    }

    let client = reqwest::Client::new()
        .with_payments(PaymentClient::new(proofs).with_selector(selector))
        .build();

    let mut failures = 0usize;
    for url in args.urls {
        match client.get(url.clone()).send().await {
            Ok(response) => {
                if let Some(settlement) = settlement_of(&response) {
                    tracing::info!(
                        %url,
                        transaction = settlement.transaction.as_deref().unwrap_or_default(),
                        "Payment settled"
                    );
                }
                let status = response.status();
                let body = response.text().await?;
                if !status.is_success() {
                    tracing::warn!(%url, %status, "Request failed");
                    failures += 1;
                }
                writeln!(std::io::stdout().lock(), "{body}")?;
            }
            Err(err) => {
                match payment_error(&err) {
                    Some(payment) => {
                        tracing::error!(%url, kind = ?payment.kind(), "{payment}");
                    }
                    None => tracing::error!(%url, "{err}"),
                }
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} request(s) failed").into());
    }
    Ok(())
}
