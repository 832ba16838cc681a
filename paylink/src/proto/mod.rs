//! Wire format of the payment challenge-response exchange.
//!
//! All types serialize to the camelCase JSON that x402 version 1 peers speak:
//!
//! - [`PaymentChallenge`]: body of a `402 Payment Required` response
//! - [`PaymentRequirement`]: one acceptable way to pay
//! - [`PaymentProof`]: the signed authorization a client sends back in `X-PAYMENT`
//! - [`VerifyRequest`], [`VerifyResponse`], [`SettleResponse`]: facilitator messages

mod version;

pub use version::Version;

use serde::{Deserialize, Serialize};

use crate::amount::Price;
use crate::encoding::{HeaderDecodeError, HeaderPayload};
use crate::nonce::ChallengeNonce;
use crate::timestamp::UnixTimestamp;

/// Version marker for x402 protocol version 1.
pub type X402Version1 = Version<1>;

/// Convenience constant for constructing version 1 messages.
pub const V1: X402Version1 = Version;

/// The only scheme paylink builds proofs for.
pub const EXACT_SCHEME: &str = "exact";

/// Scheme-specific data attached to a requirement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementExtra {
    /// Signing domain name of the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Signing domain version of the asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Server-chosen freshness nonce the proof must carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<ChallengeNonce>,
}

/// One acceptable (scheme, network, asset, price, recipient) combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirement {
    /// Payment scheme, e.g. `exact`.
    pub scheme: String,
    /// Network name, e.g. `base-sepolia`.
    pub network: String,
    /// Human price with currency, e.g. `$0.01`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
    /// Price in atomic units of `asset`, as a decimal string.
    pub max_amount_required: String,
    /// URL of the resource being paid for.
    pub resource: String,
    /// What the payment grants.
    #[serde(default)]
    pub description: String,
    /// MIME type of the resource.
    #[serde(default)]
    pub mime_type: String,
    /// Recipient address.
    pub pay_to: String,
    /// How long a proof for this requirement stays acceptable.
    pub max_timeout_seconds: u64,
    /// Asset contract address.
    pub asset: String,
    /// Scheme-specific data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<RequirementExtra>,
}

impl PaymentRequirement {
    /// The nonce the server attached to this requirement, if any.
    #[must_use]
    pub fn nonce(&self) -> Option<ChallengeNonce> {
        self.extra.as_ref().and_then(|extra| extra.nonce)
    }
}

/// Body of a `402 Payment Required` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentChallenge {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Acceptable requirements, most preferred first.
    #[serde(default)]
    pub accepts: Vec<PaymentRequirement>,
    /// Why the previous attempt, if any, was refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentChallenge {
    /// Attaches a refusal reason.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// The transfer a payer authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Payer address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Asset contract address.
    pub asset: String,
    /// Amount in atomic units.
    pub value: String,
    /// Not valid before this time.
    pub valid_after: UnixTimestamp,
    /// Not valid at or after this time.
    pub valid_before: UnixTimestamp,
    /// Nonce copied from the challenge.
    pub nonce: ChallengeNonce,
}

/// Signature plus the authorization it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactPayload {
    /// Signature produced by the payer's signing capability.
    pub signature: String,
    /// The signed authorization.
    pub authorization: Authorization,
}

/// A signed payment bound to one [`PaymentRequirement`].
///
/// Travels in the `X-PAYMENT` request header as base64 JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Scheme of the satisfied requirement.
    pub scheme: String,
    /// Network of the satisfied requirement.
    pub network: String,
    /// The signed authorization.
    pub payload: ExactPayload,
}

impl PaymentProof {
    /// Encodes the proof as an `X-PAYMENT` header value.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_header(&self) -> Result<HeaderPayload, serde_json::Error> {
        HeaderPayload::from_json(self)
    }

    /// Decodes an `X-PAYMENT` header value.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderDecodeError`] if the value is not a base64 JSON proof.
    pub fn from_header(value: &[u8]) -> Result<Self, HeaderDecodeError> {
        HeaderPayload::from(value).to_json()
    }
}

/// Request sent to the facilitator's `/verify` and `/settle` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The proof presented by the client.
    pub payment_payload: PaymentProof,
    /// The requirement the proof claims to satisfy.
    pub payment_requirements: PaymentRequirement,
}

/// Settlement reuses the verification request shape.
pub type SettleRequest = VerifyRequest;

/// Facilitator verdict on a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the proof is acceptable.
    pub is_valid: bool,
    /// Machine-readable reason when invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Payer address recovered by the facilitator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
}

impl VerifyResponse {
    /// A valid verdict for `payer`.
    #[must_use]
    pub fn valid(payer: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
            payer: Some(payer.into()),
        }
    }

    /// An invalid verdict with `reason`.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason.into()),
            payer: None,
        }
    }
}

/// Facilitator settlement outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    /// Whether the payment settled.
    pub success: bool,
    /// Reason when not settled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Payer address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// Settlement transaction reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// Network the payment settled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn challenge_uses_camel_case_and_version_one() {
        let challenge: PaymentChallenge = serde_json::from_value(json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "base-sepolia",
                "price": "$0.01",
                "maxAmountRequired": "10000",
                "resource": "http://localhost:4021/weather",
                "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
                "maxTimeoutSeconds": 300,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
            }]
        }))
        .unwrap();
        let requirement = &challenge.accepts[0];
        assert_eq!(requirement.price.as_ref().unwrap().to_string(), "$0.01");
        assert!(requirement.nonce().is_none());
        assert!(requirement.description.is_empty());
    }

    #[test]
    fn other_versions_are_refused() {
        let result = serde_json::from_value::<PaymentChallenge>(json!({
            "x402Version": 2,
            "accepts": []
        }));
        assert!(result.is_err());
    }

    #[test]
    fn verify_response_reads_facilitator_json() {
        let response: VerifyResponse =
            serde_json::from_value(json!({ "isValid": false, "invalidReason": "expired" }))
                .unwrap();
        assert_eq!(response, VerifyResponse::invalid("expired"));
    }
}
