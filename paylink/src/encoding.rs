//! Base64 header payloads.
//!
//! Every structured value paylink puts in an HTTP header (`X-PAYMENT`,
//! `PAYMENT-REQUIRED`, `X-PAYMENT-RESPONSE`) is JSON wrapped in standard
//! base64. [`HeaderPayload`] owns the encoded form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;

/// Base64 text carrying a JSON document, as found in a payment header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPayload(Vec<u8>);

/// Failure to turn a header value back into a typed document.
#[derive(Debug, thiserror::Error)]
pub enum HeaderDecodeError {
    /// The header is not valid base64.
    #[error("header is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON document.
    #[error("header does not contain the expected JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl HeaderPayload {
    /// Serializes `value` to JSON and base64-encodes it.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if `value` cannot be serialized.
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(value)?;
        Ok(Self(b64.encode(json).into_bytes()))
    }

    /// Decodes the base64 text and parses the JSON inside.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderDecodeError`] on invalid base64 or mismatched JSON.
    pub fn to_json<T: DeserializeOwned>(&self) -> Result<T, HeaderDecodeError> {
        let raw = b64.decode(self.0.trim_ascii())?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Returns the encoded text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Base64 output and trimmed header bytes are ASCII.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl AsRef<[u8]> for HeaderPayload {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for HeaderPayload {
    fn from(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }
}

impl Display for HeaderPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_what_it_encodes() {
        let doc = json!({ "x402Version": 1, "accepts": [] });
        let encoded = HeaderPayload::from_json(&doc).unwrap();
        assert!(encoded.as_str().starts_with("eyJ"));
        let decoded: serde_json::Value = encoded.to_json().unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn rejects_garbage() {
        let err = HeaderPayload::from(b"%%%not-base64".as_slice())
            .to_json::<serde_json::Value>()
            .unwrap_err();
        assert!(matches!(err, HeaderDecodeError::Base64(_)));

        let not_json = HeaderPayload::from(b"aGVsbG8=".as_slice());
        assert!(matches!(
            not_json.to_json::<serde_json::Value>(),
            Err(HeaderDecodeError::Json(_))
        ));
    }
}
