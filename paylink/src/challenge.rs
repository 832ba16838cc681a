//! Expanding route pricing into 402 challenges.

use crate::amount::{AmountError, Price};
use crate::networks::AssetBook;
use crate::nonce::{ChallengeNonce, NonceSource};
use crate::proto::{PaymentChallenge, PaymentRequirement, RequirementExtra, V1};
use crate::registry::{RouteConfig, RouteKey};
use crate::timestamp::UnixTimestamp;

/// A route could not be turned into requirements.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The route declares no network.
    #[error("route declares no network")]
    NoNetworks,
    /// The route declares no asset.
    #[error("route declares no asset")]
    NoAssets,
    /// The route's asset is unknown on one of its networks.
    #[error("asset {asset} is unknown on network {network}")]
    UnknownAsset {
        /// The network.
        network: String,
        /// The configured asset reference.
        asset: String,
    },
    /// The price is in a currency the asset does not track.
    #[error("price {price} cannot be paid in {asset}")]
    CurrencyMismatch {
        /// The asset symbol.
        asset: String,
        /// The price.
        price: Price,
    },
    /// The price cannot be expressed in the asset's atomic units.
    #[error("price {price} cannot be expressed in {asset}: {source}")]
    Amount {
        /// The asset symbol.
        asset: String,
        /// The price.
        price: Price,
        /// The conversion failure.
        #[source]
        source: AmountError,
    },
}

/// Produces the ordered requirement list advertised for a priced route.
///
/// The builder is shared by every request the gateway handles; the only state
/// it mutates is the atomic nonce counter. Nonces are bound to the
/// [`RouteKey`] they were issued for, see [`RequirementBuilder::authenticates`].
#[derive(Debug)]
pub struct RequirementBuilder {
    pay_to: String,
    assets: AssetBook,
    nonces: NonceSource,
}

impl RequirementBuilder {
    /// A builder paying `pay_to`, quoting assets from `assets`.
    #[must_use]
    pub fn new(pay_to: impl Into<String>, assets: AssetBook) -> Self {
        Self {
            pay_to: pay_to.into(),
            assets,
            nonces: NonceSource::new(),
        }
    }

    /// Recipient of every requirement.
    #[must_use]
    pub fn pay_to(&self) -> &str {
        &self.pay_to
    }

    /// Uses `secret` to tag nonces, so that every builder sharing it accepts
    /// the others' challenges.
    #[must_use]
    pub fn with_nonce_secret(mut self, secret: [u8; 32]) -> Self {
        self.nonces = NonceSource::with_secret(secret);
        self
    }

    /// Assets the builder quotes in.
    #[must_use]
    pub const fn assets(&self) -> &AssetBook {
        &self.assets
    }

    /// Whether `nonce` was issued by this builder for a challenge on `key`.
    #[must_use]
    pub fn authenticates(&self, nonce: &ChallengeNonce, key: &RouteKey) -> bool {
        self.nonces.authenticates(nonce, key.to_string().as_bytes())
    }

    /// Builds a challenge for the route priced under `key`, with a fresh
    /// nonce issued now.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the route cannot be quoted.
    pub fn build_challenge(
        &self,
        key: &RouteKey,
        route: &RouteConfig,
        resource: &str,
    ) -> Result<PaymentChallenge, BuildError> {
        self.build_challenge_at(key, route, resource, UnixTimestamp::now())
    }

    /// Builds a challenge with a fresh nonce stamped `now`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the route cannot be quoted.
    pub fn build_challenge_at(
        &self,
        key: &RouteKey,
        route: &RouteConfig,
        resource: &str,
        now: UnixTimestamp,
    ) -> Result<PaymentChallenge, BuildError> {
        let nonce = self.nonces.issue(now, key.to_string().as_bytes());
        let accepts = self.requirements(route, resource, Some(nonce))?;
        Ok(PaymentChallenge {
            x402_version: V1,
            accepts,
            error: None,
        })
    }

    /// Expands `route` into one requirement per network/asset pair, networks
    /// first, in declared order, all carrying `nonce`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the route cannot be quoted.
    pub fn requirements(
        &self,
        route: &RouteConfig,
        resource: &str,
        nonce: Option<ChallengeNonce>,
    ) -> Result<Vec<PaymentRequirement>, BuildError> {
        if route.networks.is_empty() {
            return Err(BuildError::NoNetworks);
        }
        if route.assets.is_empty() {
            return Err(BuildError::NoAssets);
        }
        route
            .offers()
            .map(|(network, reference)| {
                let asset = self.assets.find(network, reference).ok_or_else(|| {
                    BuildError::UnknownAsset {
                        network: network.to_owned(),
                        asset: reference.to_owned(),
                    }
                })?;
                if !asset.settles(route.price.currency()) {
                    return Err(BuildError::CurrencyMismatch {
                        asset: asset.symbol.clone(),
                        price: route.price.clone(),
                    });
                }
                let atomic =
                    route
                        .price
                        .to_atomic(asset.decimals)
                        .map_err(|source| BuildError::Amount {
                            asset: asset.symbol.clone(),
                            price: route.price.clone(),
                            source,
                        })?;
                Ok(PaymentRequirement {
                    scheme: route.scheme.clone(),
                    network: network.to_owned(),
                    price: Some(route.price.clone()),
                    max_amount_required: atomic.to_string(),
                    resource: resource.to_owned(),
                    description: route.description.clone(),
                    mime_type: route.mime_type.clone(),
                    pay_to: self.pay_to.clone(),
                    max_timeout_seconds: route.max_timeout_seconds,
                    asset: asset.address.clone(),
                    extra: Some(RequirementExtra {
                        name: Some(asset.domain_name.clone()),
                        version: Some(asset.domain_version.clone()),
                        nonce,
                    }),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::Currency;
    use crate::networks::KnownAsset;

    const PAY_TO: &str = "0x209693Bc6afc0C5328bA36FaF03C514EF312287C";

    fn key() -> RouteKey {
        RouteKey::new("GET", "/weather")
    }

    fn builder() -> RequirementBuilder {
        RequirementBuilder::new(PAY_TO, AssetBook::known())
    }

    fn weather() -> RouteConfig {
        RouteConfig::new(Price::parse("$0.01").unwrap(), "base-sepolia")
    }

    fn without_nonce(mut challenge: PaymentChallenge) -> PaymentChallenge {
        for requirement in &mut challenge.accepts {
            if let Some(extra) = requirement.extra.as_mut() {
                extra.nonce = None;
            }
        }
        challenge
    }

    #[test]
    fn weather_route_yields_one_base_sepolia_requirement() {
        let challenge = builder()
            .build_challenge(&key(), &weather(), "http://localhost:4021/weather")
            .unwrap();
        assert_eq!(challenge.accepts.len(), 1);
        let requirement = &challenge.accepts[0];
        assert_eq!(requirement.network, "base-sepolia");
        assert_eq!(requirement.price.as_ref().unwrap().to_string(), "$0.01");
        assert_eq!(requirement.max_amount_required, "10000");
        assert_eq!(requirement.pay_to, PAY_TO);
        assert_eq!(requirement.asset, "0x036CbD53842c5426634e7929541eC2318f3dCF7e");
        assert!(requirement.nonce().is_some());

        let json = serde_json::to_value(&challenge).unwrap();
        assert_eq!(json["x402Version"], 1);
        assert_eq!(json["accepts"][0]["price"], "$0.01");
    }

    #[test]
    fn builds_differ_only_in_nonce() {
        let builder = builder();
        let route = weather().with_network("base");
        let first = builder.build_challenge(&key(), &route, "/weather").unwrap();
        let second = builder.build_challenge(&key(), &route, "/weather").unwrap();
        assert_ne!(first.accepts[0].nonce(), second.accepts[0].nonce());
        assert_eq!(without_nonce(first), without_nonce(second));
    }

    #[test]
    fn keeps_declared_network_order() {
        let route = weather().with_network("base").with_network("polygon");
        let challenge = builder().build_challenge(&key(), &route, "/weather").unwrap();
        let networks: Vec<_> = challenge.accepts.iter().map(|r| r.network.as_str()).collect();
        assert_eq!(networks, ["base-sepolia", "base", "polygon"]);
        let nonce = challenge.accepts[0].nonce();
        assert!(challenge.accepts.iter().all(|r| r.nonce() == nonce));
    }

    #[test]
    fn stamps_the_issue_time_into_the_nonce() {
        let now = UnixTimestamp::from_secs(1_750_000_000);
        let challenge = builder().build_challenge_at(&key(), &weather(), "/weather", now).unwrap();
        assert_eq!(challenge.accepts[0].nonce().unwrap().issued_at(), now);
    }

    #[test]
    fn unknown_assets_fail() {
        let route = weather().with_asset("DAI");
        assert!(matches!(
            builder().build_challenge(&key(), &route, "/weather"),
            Err(BuildError::UnknownAsset { .. })
        ));
    }

    #[test]
    fn expands_networks_then_assets_with_one_nonce() {
        let usdt = KnownAsset {
            network: "base-sepolia".to_owned(),
            chain_id: 84532,
            symbol: "USDT".to_owned(),
            address: "0x00000000000000000000000000000000000000aa".to_owned(),
            decimals: 6,
            domain_name: "Tether USD".to_owned(),
            domain_version: "1".to_owned(),
            pegged_to: Currency::usd(),
        };
        let builder = RequirementBuilder::new(PAY_TO, AssetBook::known().with_asset(usdt));

        let route = weather().with_extra_asset("USDT");
        let challenge = builder.build_challenge(&key(), &route, "/weather").unwrap();
        let offered: Vec<_> = challenge
            .accepts
            .iter()
            .map(|r| (r.network.as_str(), r.asset.as_str()))
            .collect();
        assert_eq!(
            offered,
            [
                ("base-sepolia", "0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
                ("base-sepolia", "0x00000000000000000000000000000000000000aa"),
            ]
        );
        let nonce = challenge.accepts[0].nonce();
        assert!(nonce.is_some());
        assert!(challenge.accepts.iter().all(|r| r.nonce() == nonce));
        assert!(challenge.accepts.iter().all(|r| r.max_amount_required == "10000"));

        // USDT is only known on base-sepolia.
        let route = route.with_network("base");
        let err = builder.build_challenge(&key(), &route, "/weather").unwrap_err();
        assert!(matches!(err, BuildError::UnknownAsset { ref network, .. } if network == "base"));
    }

    #[test]
    fn nonces_are_bound_to_their_route() {
        let issuer = builder();
        let challenge = issuer.build_challenge(&key(), &weather(), "/weather").unwrap();
        let nonce = challenge.accepts[0].nonce().unwrap();
        assert!(issuer.authenticates(&nonce, &key()));
        assert!(!issuer.authenticates(&nonce, &RouteKey::new("GET", "/transfers")));
        assert!(!builder().authenticates(&nonce, &key()));

        let issuer = builder().with_nonce_secret([3; 32]);
        let verifier = builder().with_nonce_secret([3; 32]);
        let nonce = issuer
            .build_challenge(&key(), &weather(), "/weather")
            .unwrap()
            .accepts[0]
            .nonce()
            .unwrap();
        assert!(verifier.authenticates(&nonce, &key()));
    }
}
