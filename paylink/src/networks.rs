//! Known networks and the payment assets deployed on them.
//!
//! Requirements name networks by their short x402 name (`base-sepolia`) and
//! assets by contract address. Both sides of the protocol need the asset's
//! decimals to move between a [`Price`](crate::amount::Price) and atomic
//! units, and its signing domain name and version for the proof.
//! An [`AssetBook`] is the local source of that knowledge.

use crate::amount::Currency;

/// A token deployment a payment can be made in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownAsset {
    /// Short network name, e.g. `base-sepolia`.
    pub network: String,
    /// Numeric chain id.
    pub chain_id: u64,
    /// Ticker, e.g. `USDC`.
    pub symbol: String,
    /// Contract address, `0x`-prefixed hex.
    pub address: String,
    /// Fractional digits of the token.
    pub decimals: u8,
    /// Signing domain name.
    pub domain_name: String,
    /// Signing domain version.
    pub domain_version: String,
    /// Currency one token unit is pegged to.
    pub pegged_to: Currency,
}

impl KnownAsset {
    /// Whether a price in `currency` can be paid in this asset one-to-one.
    #[must_use]
    pub fn settles(&self, currency: &Currency) -> bool {
        *currency == self.pegged_to || currency.code().eq_ignore_ascii_case(&self.symbol)
    }

    /// Whether `reference` names this asset, by symbol or address.
    #[must_use]
    pub fn is_named(&self, reference: &str) -> bool {
        reference.eq_ignore_ascii_case(&self.symbol) || reference.eq_ignore_ascii_case(&self.address)
    }
}

/// USDC deployments: network, chain id, contract address, domain name.
const USDC_DEPLOYMENTS: &[(&str, u64, &str, &str)] = &[
    ("base", 8453, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", "USD Coin"),
    ("base-sepolia", 84532, "0x036CbD53842c5426634e7929541eC2318f3dCF7e", "USDC"),
    ("ethereum", 1, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "USD Coin"),
    ("polygon", 137, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", "USD Coin"),
    ("polygon-amoy", 80002, "0x41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF", "USDC"),
    ("avalanche", 43114, "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E", "USD Coin"),
    ("avalanche-fuji", 43113, "0x5425890298aed601595a70AB815c96711a31Bc65", "USD Coin"),
    ("celo", 42220, "0xcebA9300f2b948710d2653dD7B07f33A8B32118C", "USDC"),
];

/// Decimals of every USDC deployment.
pub const USDC_DECIMALS: u8 = 6;

/// Signing domain version shared by USDC deployments.
pub const USDC_DOMAIN_VERSION: &str = "2";

/// A lookup table of assets per network.
#[derive(Debug, Clone, Default)]
pub struct AssetBook {
    assets: Vec<KnownAsset>,
}

impl AssetBook {
    /// An empty book.
    #[must_use]
    pub const fn empty() -> Self {
        Self { assets: Vec::new() }
    }

    /// A book holding the well-known USDC deployments.
    #[must_use]
    pub fn known() -> Self {
        let assets = USDC_DEPLOYMENTS
            .iter()
            .map(|(network, chain_id, address, name)| KnownAsset {
                network: (*network).to_owned(),
                chain_id: *chain_id,
                symbol: "USDC".to_owned(),
                address: (*address).to_owned(),
                decimals: USDC_DECIMALS,
                domain_name: (*name).to_owned(),
                domain_version: USDC_DOMAIN_VERSION.to_owned(),
                pegged_to: Currency::usd(),
            })
            .collect();
        Self { assets }
    }

    /// Adds or replaces an asset (matched by network and address).
    #[must_use]
    pub fn with_asset(mut self, asset: KnownAsset) -> Self {
        self.assets
            .retain(|a| !(a.network == asset.network && a.address.eq_ignore_ascii_case(&asset.address)));
        self.assets.push(asset);
        self
    }

    /// Finds an asset on `network` by symbol or contract address.
    #[must_use]
    pub fn find(&self, network: &str, reference: &str) -> Option<&KnownAsset> {
        self.assets
            .iter()
            .find(|a| a.network == network && a.is_named(reference))
    }

    /// Whether any asset is known on `network`.
    #[must_use]
    pub fn knows_network(&self, network: &str) -> bool {
        self.assets.iter().any(|a| a.network == network)
    }

    /// Iterates over all assets.
    pub fn iter(&self) -> impl Iterator<Item = &KnownAsset> {
        self.assets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_usdc_by_symbol_and_address() {
        let book = AssetBook::known();
        let by_symbol = book.find("base-sepolia", "usdc").unwrap();
        assert_eq!(by_symbol.chain_id, 84532);
        assert_eq!(by_symbol.decimals, 6);
        let by_address = book
            .find("base-sepolia", "0x036cbd53842c5426634e7929541ec2318f3dcf7e")
            .unwrap();
        assert_eq!(by_address, by_symbol);
        assert!(book.find("base-sepolia", "DAI").is_none());
        assert!(book.find("unknown-net", "USDC").is_none());
    }

    #[test]
    fn custom_assets_extend_the_book() {
        let book = AssetBook::empty().with_asset(KnownAsset {
            network: "devnet".to_owned(),
            chain_id: 31337,
            symbol: "TST".to_owned(),
            address: "0x0000000000000000000000000000000000000001".to_owned(),
            decimals: 2,
            domain_name: "Test".to_owned(),
            domain_version: "1".to_owned(),
            pegged_to: Currency::new("EUR"),
        });
        let asset = book.find("devnet", "tst").unwrap();
        assert!(asset.settles(&Currency::new("eur")));
        assert!(asset.settles(&Currency::new("TST")));
        assert!(!asset.settles(&Currency::usd()));
        assert!(book.knows_network("devnet"));
    }
}
