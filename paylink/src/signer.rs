//! [`PaymentSigner`] for local EVM keys (feature `evm`).

use alloy_primitives::hex;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;

use crate::proof::{PaymentSigner, SignerError};

/// A private key in the form `0x` followed by 64 hex digits was expected.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Wrong length or alphabet.
    #[error("private key must be 0x followed by 64 hex characters")]
    Format,
    /// Right shape but not a valid secp256k1 scalar.
    #[error("invalid private key: {0}")]
    Invalid(String),
}

/// Parses a `0x`-prefixed 32-byte hex private key.
///
/// # Errors
///
/// Returns [`KeyError`] on malformed input.
pub fn parse_private_key(key: &str) -> Result<PrivateKeySigner, KeyError> {
    let key = key.trim();
    let digits = key.strip_prefix("0x").ok_or(KeyError::Format)?;
    if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(KeyError::Format);
    }
    key.parse::<PrivateKeySigner>()
        .map_err(|e| KeyError::Invalid(e.to_string()))
}

#[async_trait::async_trait]
impl PaymentSigner for PrivateKeySigner {
    fn address(&self) -> String {
        Signer::address(self).to_string()
    }

    async fn sign(&self, message: &[u8]) -> Result<String, SignerError> {
        let signature = self
            .sign_message(message)
            .await
            .map_err(|e| SignerError::Failed(Box::new(e)))?;
        Ok(hex::encode_prefixed(signature.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn accepts_only_prefixed_64_hex_keys() {
        assert!(parse_private_key(KEY).is_ok());
        assert!(matches!(parse_private_key(&KEY[2..]), Err(KeyError::Format)));
        assert!(matches!(parse_private_key("0x1234"), Err(KeyError::Format)));
        let zero = format!("0x{}", "0".repeat(64));
        assert!(matches!(parse_private_key(&zero), Err(KeyError::Invalid(_))));
    }

    #[tokio::test]
    async fn signs_with_a_65_byte_signature() {
        let signer = parse_private_key(KEY).unwrap();
        let signature = PaymentSigner::sign(&signer, b"hello").await.unwrap();
        assert_eq!(signature.len(), 2 + 65 * 2);
        assert!(PaymentSigner::address(&signer).starts_with("0x"));
    }
}
