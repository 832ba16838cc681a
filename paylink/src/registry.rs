//! Route pricing.
//!
//! The [`PriceRegistry`] decides which requests need payment. It maps exact
//! `(method, path)` pairs to a [`RouteConfig`] and is never modified once the
//! server starts serving, so a route is either always gated or never gated.
//!
//! Configuration is JSON keyed by `"METHOD /path"`:
//!
//! ```json
//! {
//!   "GET /weather": { "price": "$0.01", "network": "base-sepolia" },
//!   "GET /transfers": { "price": "$0.05", "network": ["base-sepolia", "base"] }
//! }
//! ```
//!
//! `network` and `asset` each take one value or a list. A route is offered
//! on every network/asset pair, networks first, both in declared order.
//! `HEAD` requests are priced like `GET` unless `HEAD` is priced itself.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{DeserializeFromStr, OneOrMany, SerializeDisplay, formats::PreferOne, serde_as};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::amount::Price;
use crate::networks::AssetBook;
use crate::proto::EXACT_SCHEME;

/// Default validity window of a proof, in seconds.
pub const DEFAULT_MAX_TIMEOUT_SECONDS: u64 = 300;

/// Errors raised while building or loading a [`PriceRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A key is not of the form `"METHOD /path"`.
    #[error("invalid route key {0:?}: expected \"METHOD /path\"")]
    InvalidRouteKey(String),
    /// The same route was configured twice.
    #[error("route {0} is already priced")]
    DuplicateRoute(RouteKey),
    /// A route declares no network.
    #[error("route {0} declares no network")]
    NoNetworks(RouteKey),
    /// A route declares no asset.
    #[error("route {0} declares no asset")]
    NoAssets(RouteKey),
    /// A route names an asset the local asset book does not know.
    #[error("route {route}: asset {asset} is unknown on network {network}")]
    UnknownAsset {
        /// The route.
        route: RouteKey,
        /// The network.
        network: String,
        /// The asset reference as configured.
        asset: String,
    },
    /// A route's price cannot be expressed in its asset.
    #[error("route {route}: price {price} cannot be paid in {asset} on {network}")]
    UnpayablePrice {
        /// The route.
        route: RouteKey,
        /// The network.
        network: String,
        /// The asset symbol.
        asset: String,
        /// The configured price.
        price: Price,
    },
    /// The configuration is not valid JSON for a registry.
    #[error("invalid route configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// The configuration file could not be read.
    #[error("failed to read route configuration {path}: {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// An exact `(method, path)` pair. The method is stored uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct RouteKey {
    method: String,
    path: String,
}

impl RouteKey {
    /// Builds a key, uppercasing the method.
    #[must_use]
    pub fn new(method: &str, path: impl Into<String>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.into(),
        }
    }

    /// The uppercased HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl FromStr for RouteKey {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (method, path) = s
            .trim()
            .split_once(char::is_whitespace)
            .ok_or_else(|| RegistryError::InvalidRouteKey(s.to_owned()))?;
        let path = path.trim();
        let valid_method = !method.is_empty() && method.bytes().all(|b| b.is_ascii_alphabetic());
        if !valid_method || !path.starts_with('/') || path.contains(char::is_whitespace) {
            return Err(RegistryError::InvalidRouteKey(s.to_owned()));
        }
        Ok(Self::new(method, path))
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Pricing of one route.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    /// Price with currency.
    pub price: Price,
    /// Accepted networks, most preferred first.
    #[serde(rename = "network")]
    #[serde_as(as = "OneOrMany<_, PreferOne>")]
    pub networks: Vec<String>,
    /// Accepted assets by symbol or contract address, most preferred first.
    #[serde(rename = "asset", default = "default_assets")]
    #[serde_as(as = "OneOrMany<_, PreferOne>")]
    pub assets: Vec<String>,
    /// Payment scheme.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// What the payment grants.
    #[serde(default)]
    pub description: String,
    /// MIME type of the resource.
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    /// Proof validity window in seconds.
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,
}

fn default_assets() -> Vec<String> {
    vec!["USDC".to_owned()]
}

fn default_scheme() -> String {
    EXACT_SCHEME.to_owned()
}

fn default_mime_type() -> String {
    "application/json".to_owned()
}

const fn default_max_timeout_seconds() -> u64 {
    DEFAULT_MAX_TIMEOUT_SECONDS
}

impl RouteConfig {
    /// A USDC `exact` route on one network.
    #[must_use]
    pub fn new(price: Price, network: impl Into<String>) -> Self {
        Self {
            price,
            networks: vec![network.into()],
            assets: default_assets(),
            scheme: default_scheme(),
            description: String::new(),
            mime_type: default_mime_type(),
            max_timeout_seconds: DEFAULT_MAX_TIMEOUT_SECONDS,
        }
    }

    /// Appends a less preferred network.
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.push(network.into());
        self
    }

    /// Replaces the accepted assets with `asset`.
    #[must_use]
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.assets = vec![asset.into()];
        self
    }

    /// Appends a less preferred asset.
    #[must_use]
    pub fn with_extra_asset(mut self, asset: impl Into<String>) -> Self {
        self.assets.push(asset.into());
        self
    }

    /// Every `(network, asset)` pair the route is offered on, in preference order.
    pub fn offers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.networks.iter().flat_map(move |network| {
            self.assets
                .iter()
                .map(move |asset| (network.as_str(), asset.as_str()))
        })
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the proof validity window.
    #[must_use]
    pub const fn with_max_timeout_seconds(mut self, secs: u64) -> Self {
        self.max_timeout_seconds = secs;
        self
    }
}

/// Exact-match route pricing table.
#[derive(Debug, Clone, Default)]
pub struct PriceRegistry {
    routes: HashMap<RouteKey, RouteConfig>,
}

impl PriceRegistry {
    /// An empty registry: every route is free.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prices a route.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateRoute`] if the route is already
    /// priced, [`RegistryError::NoNetworks`] or [`RegistryError::NoAssets`] if
    /// the config lists no network or no asset.
    pub fn insert(&mut self, key: RouteKey, config: RouteConfig) -> Result<(), RegistryError> {
        if config.networks.is_empty() {
            return Err(RegistryError::NoNetworks(key));
        }
        if config.assets.is_empty() {
            return Err(RegistryError::NoAssets(key));
        }
        if self.routes.contains_key(&key) {
            return Err(RegistryError::DuplicateRoute(key));
        }
        self.routes.insert(key, config);
        Ok(())
    }

    /// Builder-style [`Self::insert`].
    ///
    /// # Errors
    ///
    /// See [`Self::insert`].
    pub fn with_route(
        mut self,
        method: &str,
        path: &str,
        config: RouteConfig,
    ) -> Result<Self, RegistryError> {
        self.insert(RouteKey::new(method, path), config)?;
        Ok(self)
    }

    /// Parses a JSON route table.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on malformed JSON, malformed keys, or
    /// duplicate routes (including keys that differ only in method case).
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let RouteEntries(entries) = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for (key, config) in entries {
            registry.insert(key.parse()?, config)?;
        }
        Ok(registry)
    }

    /// Reads and parses a JSON route table from disk.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_json`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks that every route can be quoted with the assets in `assets`.
    ///
    /// # Errors
    ///
    /// Returns the first [`RegistryError::UnknownAsset`] or
    /// [`RegistryError::UnpayablePrice`] found.
    pub fn validate(&self, assets: &AssetBook) -> Result<(), RegistryError> {
        let mut keys: Vec<&RouteKey> = self.routes.keys().collect();
        keys.sort();
        for key in keys {
            let config = &self.routes[key];
            for (network, reference) in config.offers() {
                let asset = assets.find(network, reference).ok_or_else(|| {
                    RegistryError::UnknownAsset {
                        route: key.clone(),
                        network: network.to_owned(),
                        asset: reference.to_owned(),
                    }
                })?;
                let payable = asset.settles(config.price.currency())
                    && config.price.to_atomic(asset.decimals).is_ok();
                if !payable {
                    return Err(RegistryError::UnpayablePrice {
                        route: key.clone(),
                        network: network.to_owned(),
                        asset: asset.symbol.clone(),
                        price: config.price.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Pricing of `method path`, or `None` if the route is free.
    #[must_use]
    pub fn price_for(&self, method: &str, path: &str) -> Option<&RouteConfig> {
        self.lookup(method, path).map(|(_, config)| config)
    }

    /// The priced route serving `method path`, with the key it is priced under.
    ///
    /// A `HEAD` request falls back to the `GET` entry of the same path.
    #[must_use]
    pub fn lookup(&self, method: &str, path: &str) -> Option<(&RouteKey, &RouteConfig)> {
        let key = RouteKey::new(method, path);
        if let Some(entry) = self.routes.get_key_value(&key) {
            return Some(entry);
        }
        if key.method == "HEAD" {
            return self.routes.get_key_value(&RouteKey::new("GET", key.path));
        }
        None
    }

    /// Whether `method path` is priced.
    #[must_use]
    pub fn contains(&self, method: &str, path: &str) -> bool {
        self.price_for(method, path).is_some()
    }

    /// Number of priced routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route is priced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Priced routes in key order.
    #[must_use]
    pub fn routes(&self) -> Vec<(&RouteKey, &RouteConfig)> {
        let mut routes: Vec<_> = self.routes.iter().collect();
        routes.sort_by(|a, b| a.0.cmp(b.0));
        routes
    }
}

/// JSON object entries in document order, duplicates preserved.
struct RouteEntries(Vec<(String, RouteConfig)>);

impl<'de> Deserialize<'de> for RouteEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RouteEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of \"METHOD /path\" keys to route pricing")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or_default());
                while let Some(entry) = map.next_entry::<String, RouteConfig>()? {
                    entries.push(entry);
                }
                Ok(RouteEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather() -> RouteConfig {
        RouteConfig::new(Price::parse("$0.01").unwrap(), "base-sepolia")
    }

    #[test]
    fn unconfigured_routes_are_free() {
        let registry = PriceRegistry::new()
            .with_route("GET", "/weather", weather())
            .unwrap();
        assert!(registry.price_for("GET", "/weather").is_some());
        assert!(registry.price_for("get", "/weather").is_some());
        assert!(registry.price_for("POST", "/weather").is_none());
        assert!(registry.price_for("GET", "/weather/").is_none());
        assert!(!registry.contains("GET", "/free-data"));
    }

    #[test]
    fn duplicate_routes_are_an_explicit_error() {
        let mut registry = PriceRegistry::new();
        registry.insert(RouteKey::new("GET", "/weather"), weather()).unwrap();
        let err = registry
            .insert(RouteKey::new("get", "/weather"), weather())
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRoute(key) if key.to_string() == "GET /weather"));
    }

    #[test]
    fn routes_without_networks_are_refused() {
        let mut config = weather();
        config.networks.clear();
        let err = PriceRegistry::new()
            .with_route("GET", "/weather", config)
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoNetworks(_)));
    }

    #[test]
    fn loads_json_with_one_or_many_networks() {
        let registry = PriceRegistry::from_json(
            r#"{
                "GET /weather": { "price": "$0.01", "network": "base-sepolia" },
                "post /transfers": {
                    "price": "0.05 USDC",
                    "network": ["base-sepolia", "base"],
                    "description": "Transfer history",
                    "maxTimeoutSeconds": 60
                }
            }"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        let weather = registry.price_for("GET", "/weather").unwrap();
        assert_eq!(weather.networks, ["base-sepolia"]);
        assert_eq!(weather.assets, ["USDC"]);
        assert_eq!(weather.scheme, "exact");
        let transfers = registry.price_for("POST", "/transfers").unwrap();
        assert_eq!(transfers.networks, ["base-sepolia", "base"]);
        assert_eq!(transfers.max_timeout_seconds, 60);
        registry.validate(&AssetBook::known()).unwrap();
    }

    #[test]
    fn json_duplicates_and_bad_keys_fail() {
        let duplicate = PriceRegistry::from_json(
            r#"{
                "GET /weather": { "price": "$0.01", "network": "base-sepolia" },
                "GET /weather": { "price": "$0.02", "network": "base-sepolia" }
            }"#,
        );
        assert!(matches!(duplicate, Err(RegistryError::DuplicateRoute(_))));

        let bad_key =
            PriceRegistry::from_json(r#"{ "weather": { "price": "$0.01", "network": "base" } }"#);
        assert!(matches!(bad_key, Err(RegistryError::InvalidRouteKey(_))));

        let bad_price =
            PriceRegistry::from_json(r#"{ "GET /a": { "price": "lots", "network": "base" } }"#);
        assert!(matches!(bad_price, Err(RegistryError::Json(_))));
    }

    #[test]
    fn validation_catches_unknown_assets_and_prices() {
        let unknown = PriceRegistry::new()
            .with_route("GET", "/a", RouteConfig::new(Price::parse("$1").unwrap(), "nowhere"))
            .unwrap();
        assert!(matches!(
            unknown.validate(&AssetBook::known()),
            Err(RegistryError::UnknownAsset { .. })
        ));

        let too_fine = PriceRegistry::new()
            .with_route(
                "GET",
                "/b",
                RouteConfig::new(Price::parse("$0.0000001").unwrap(), "base"),
            )
            .unwrap();
        assert!(matches!(
            too_fine.validate(&AssetBook::known()),
            Err(RegistryError::UnpayablePrice { .. })
        ));

        let euros = PriceRegistry::new()
            .with_route("GET", "/c", RouteConfig::new(Price::parse("1 EUR").unwrap(), "base"))
            .unwrap();
        assert!(euros.validate(&AssetBook::known()).is_err());
    }

    #[test]
    fn head_is_priced_like_get() {
        let registry = PriceRegistry::new()
            .with_route("GET", "/weather", weather())
            .unwrap();
        let (key, _) = registry.lookup("HEAD", "/weather").unwrap();
        assert_eq!(key.to_string(), "GET /weather");
        assert!(registry.contains("head", "/weather"));
        assert!(registry.price_for("HEAD", "/free-data").is_none());

        let own_head = PriceRegistry::new()
            .with_route("GET", "/weather", weather())
            .unwrap()
            .with_route("HEAD", "/weather", weather())
            .unwrap();
        let (key, _) = own_head.lookup("HEAD", "/weather").unwrap();
        assert_eq!(key.to_string(), "HEAD /weather");
    }

    #[test]
    fn loads_one_or_many_assets_and_checks_every_pair() {
        let registry = PriceRegistry::from_json(
            r#"{ "GET /weather": {
                "price": "$0.01",
                "network": ["base-sepolia", "base"],
                "asset": ["USDC", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"]
            } }"#,
        )
        .unwrap();
        let config = registry.price_for("GET", "/weather").unwrap();
        let offers: Vec<_> = config.offers().collect();
        assert_eq!(
            offers,
            [
                ("base-sepolia", "USDC"),
                ("base-sepolia", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
                ("base", "USDC"),
                ("base", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            ]
        );
        // The mainnet address is not deployed on base-sepolia.
        assert!(matches!(
            registry.validate(&AssetBook::known()),
            Err(RegistryError::UnknownAsset { network, .. }) if network == "base-sepolia"
        ));

        let mut config = weather();
        config.assets.clear();
        let err = PriceRegistry::new()
            .with_route("GET", "/weather", config)
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoAssets(_)));
    }
}
