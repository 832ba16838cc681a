//! Turning a chosen requirement into a signed [`PaymentProof`].
//!
//! The builder only shapes data: it binds recipient, asset, network, amount
//! and the challenge nonce into an [`Authorization`], serializes it together
//! with the asset's signing domain, and asks a [`PaymentSigner`] for a
//! signature. Keys never pass through here.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::error::PaymentError;
use crate::facilitator::BoxError;
use crate::networks::{AssetBook, KnownAsset};
use crate::proto::{Authorization, EXACT_SCHEME, ExactPayload, PaymentProof, PaymentRequirement, V1};
use crate::timestamp::UnixTimestamp;

/// How far back `validAfter` is placed, absorbing clock skew between payer
/// and facilitator.
pub const VALID_AFTER_SKEW_SECS: u64 = 600;

/// Default bound on a single signing call.
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(10);

/// Failure reported by a signing capability.
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    /// The signer refused, e.g. the user rejected the prompt.
    #[error("signer declined: {0}")]
    Declined(String),
    /// The signer failed.
    #[error("signer failed: {0}")]
    Failed(#[source] BoxError),
}

/// An external signing capability, such as a wallet.
///
/// Implementations must tolerate concurrent calls or serialize internally.
#[async_trait::async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Address payments are made from.
    fn address(&self) -> String;

    /// Signs `message`, returning the signature as text (usually `0x` hex).
    async fn sign(&self, message: &[u8]) -> Result<String, SignerError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningDomain<'a> {
    name: &'a str,
    version: &'a str,
    network: &'a str,
    chain_id: u64,
    verifying_contract: &'a str,
}

#[derive(Serialize)]
struct SigningMessage<'a> {
    domain: SigningDomain<'a>,
    authorization: &'a Authorization,
}

/// The exact bytes a payer signs for `authorization` in `asset`.
///
/// # Errors
///
/// Returns [`serde_json::Error`] if serialization fails.
pub fn signing_bytes(
    asset: &KnownAsset,
    authorization: &Authorization,
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&SigningMessage {
        domain: SigningDomain {
            name: &asset.domain_name,
            version: &asset.domain_version,
            network: &asset.network,
            chain_id: asset.chain_id,
            verifying_contract: &asset.address,
        },
        authorization,
    })
}

/// Builds proofs for requirements using local asset knowledge and a signer.
#[derive(Clone)]
pub struct ProofBuilder {
    signer: Option<Arc<dyn PaymentSigner>>,
    assets: AssetBook,
    timeout: Duration,
}

impl std::fmt::Debug for ProofBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofBuilder")
            .field("signer", &self.signer.as_ref().map(|s| s.address()))
            .field("assets", &self.assets)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProofBuilder {
    /// A builder without a signer. Every build fails with
    /// [`PaymentError::SigningUnavailable`] until one is attached.
    #[must_use]
    pub const fn new(assets: AssetBook) -> Self {
        Self {
            signer: None,
            assets,
            timeout: DEFAULT_SIGNING_TIMEOUT,
        }
    }

    /// Attaches a signer.
    #[must_use]
    pub fn with_signer(self, signer: impl PaymentSigner + 'static) -> Self {
        self.with_shared_signer(Arc::new(signer))
    }

    /// Attaches a signer shared with other components.
    #[must_use]
    pub fn with_shared_signer(mut self, signer: Arc<dyn PaymentSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Bounds each signing call.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Networks the asset book knows, in book order without repeats.
    #[must_use]
    pub fn supported_networks(&self) -> Vec<String> {
        let mut networks: Vec<String> = Vec::new();
        for asset in self.assets.iter() {
            if !networks.contains(&asset.network) {
                networks.push(asset.network.clone());
            }
        }
        networks
    }

    /// Builds and signs a proof for `requirement`.
    ///
    /// # Errors
    ///
    /// [`PaymentError::UnsupportedRequirement`] if the requirement cannot be
    /// satisfied locally, [`PaymentError::SigningUnavailable`] if signing fails.
    pub async fn build(&self, requirement: &PaymentRequirement) -> Result<PaymentProof, PaymentError> {
        self.build_at(requirement, UnixTimestamp::now()).await
    }

    /// [`Self::build`] with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// See [`Self::build`].
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "paylink.proof.build", skip_all, err, fields(network = %requirement.network))
    )]
    pub async fn build_at(
        &self,
        requirement: &PaymentRequirement,
        now: UnixTimestamp,
    ) -> Result<PaymentProof, PaymentError> {
        let (asset, value) = self.resolve(requirement)?;
        let nonce = requirement.nonce().ok_or_else(|| {
            PaymentError::UnsupportedRequirement("requirement carries no nonce".to_owned())
        })?;
        let signer = self.signer.as_ref().ok_or_else(|| {
            PaymentError::SigningUnavailable("no signing capability configured".to_owned())
        })?;

        let authorization = Authorization {
            from: signer.address(),
            to: requirement.pay_to.clone(),
            asset: requirement.asset.clone(),
            value: value.to_string(),
            valid_after: now.saturating_sub(VALID_AFTER_SKEW_SECS),
            valid_before: now + requirement.max_timeout_seconds,
            nonce,
        };
        let message = signing_bytes(asset, &authorization)
            .map_err(|e| PaymentError::SigningUnavailable(format!("cannot encode message: {e}")))?;

        let signature = match tokio::time::timeout(self.timeout, signer.sign(&message)).await {
            Ok(Ok(signature)) => signature,
            Ok(Err(err)) => return Err(PaymentError::SigningUnavailable(err.to_string())),
            Err(_) => {
                return Err(PaymentError::SigningUnavailable(format!(
                    "signer did not answer within {:?}",
                    self.timeout
                )));
            }
        };

        #[cfg(feature = "telemetry")]
        tracing::debug!(payer = %authorization.from, value = %authorization.value, "signed payment authorization");

        Ok(PaymentProof {
            x402_version: V1,
            scheme: requirement.scheme.clone(),
            network: requirement.network.clone(),
            payload: ExactPayload {
                signature,
                authorization,
            },
        })
    }

    /// Finds the local asset and the atomic amount, cross-checked against the
    /// advertised price.
    fn resolve(&self, requirement: &PaymentRequirement) -> Result<(&KnownAsset, u128), PaymentError> {
        if requirement.scheme != EXACT_SCHEME {
            return Err(PaymentError::UnsupportedRequirement(format!(
                "scheme {} is not supported",
                requirement.scheme
            )));
        }
        let asset = self
            .assets
            .find(&requirement.network, &requirement.asset)
            .ok_or_else(|| {
                PaymentError::UnsupportedRequirement(format!(
                    "asset {} is unknown on network {}",
                    requirement.asset, requirement.network
                ))
            })?;
        let value: u128 = requirement.max_amount_required.parse().map_err(|_| {
            PaymentError::UnsupportedRequirement(format!(
                "amount {:?} is not an integer",
                requirement.max_amount_required
            ))
        })?;
        if let Some(price) = &requirement.price {
            let expected = asset
                .settles(price.currency())
                .then(|| price.to_atomic(asset.decimals).ok())
                .flatten();
            if expected != Some(value) {
                return Err(PaymentError::UnsupportedRequirement(format!(
                    "amount {value} does not match price {price} in {}",
                    asset.symbol
                )));
            }
        }
        Ok((asset, value))
    }
}
