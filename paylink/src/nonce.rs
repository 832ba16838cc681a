//! Challenge nonces.
//!
//! Each 402 challenge carries a fresh 32-byte nonce which the client copies
//! into its authorization. The layout is
//!
//! | bytes  | content                                 |
//! |--------|-----------------------------------------|
//! | 0..8   | issue time, unix seconds, big endian    |
//! | 8..16  | per-process counter, big endian         |
//! | 16..32 | keyed tag over bytes 0..16 and a scope   |
//!
//! The tag is the first 16 bytes of `keccak256(secret || bytes[0..16] || scope)`
//! where `secret` belongs to the issuing [`NonceSource`] and the scope names
//! what the challenge was issued for. A server can then reject forged, stale
//! or misdirected proofs from the nonce alone, without keeping a table of
//! issued challenges.

use alloy_primitives::{hex, keccak256};
use rand::RngExt;
use rand::rng;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::timestamp::UnixTimestamp;

/// How far in the future a nonce may claim to be issued.
pub const MAX_CLOCK_SKEW_SECS: u64 = 60;

/// A 32-byte challenge nonce, written as `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct ChallengeNonce([u8; 32]);

/// The text is not a 32-byte hex nonce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("nonce must be 32 bytes of hex")]
pub struct InvalidNonce;

impl ChallengeNonce {
    /// When the nonce was issued.
    #[must_use]
    pub fn issued_at(&self) -> UnixTimestamp {
        let mut secs = [0u8; 8];
        secs.copy_from_slice(&self.0[..8]);
        UnixTimestamp::from_secs(u64::from_be_bytes(secs))
    }

    /// Whether a proof carrying this nonce is still acceptable at `now`.
    ///
    /// Rejects nonces older than `max_age_secs` and nonces issued more than
    /// [`MAX_CLOCK_SKEW_SECS`] ahead of `now`.
    #[must_use]
    pub fn is_fresh_at(&self, now: UnixTimestamp, max_age_secs: u64) -> bool {
        let issued_at = self.issued_at();
        issued_at <= now + MAX_CLOCK_SKEW_SECS && issued_at >= now.saturating_sub(max_age_secs)
    }

    /// The counter value at issue.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&self.0[8..16]);
        u64::from_be_bytes(seq)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ChallengeNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0))
    }
}

impl fmt::Debug for ChallengeNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChallengeNonce({self})")
    }
}

impl FromStr for ChallengeNonce {
    type Err = InvalidNonce;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| InvalidNonce)?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| InvalidNonce)?;
        Ok(Self(bytes))
    }
}

/// Issues strictly increasing nonces tagged with a private secret.
pub struct NonceSource {
    counter: AtomicU64,
    secret: [u8; 32],
}

impl NonceSource {
    /// A source with a random secret, starting at sequence zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_secret(rng().random())
    }

    /// A source with a fixed secret, for several servers accepting each
    /// other's challenges.
    #[must_use]
    pub const fn with_secret(secret: [u8; 32]) -> Self {
        Self {
            counter: AtomicU64::new(0),
            secret,
        }
    }

    /// Issues the next nonce stamped with `now` and bound to `scope`.
    pub fn issue(&self, now: UnixTimestamp, scope: &[u8]) -> ChallengeNonce {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&now.as_secs().to_be_bytes());
        bytes[8..16].copy_from_slice(&sequence.to_be_bytes());
        let tag = self.tag(&bytes[..16], scope);
        bytes[16..].copy_from_slice(&tag);
        ChallengeNonce(bytes)
    }

    /// Whether `nonce` was issued by this source for `scope`.
    #[must_use]
    pub fn authenticates(&self, nonce: &ChallengeNonce, scope: &[u8]) -> bool {
        let expected = self.tag(&nonce.0[..16], scope);
        // Constant time.
        expected
            .iter()
            .zip(&nonce.0[16..])
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
    }

    fn tag(&self, header: &[u8], scope: &[u8]) -> [u8; 16] {
        let mut input = Vec::with_capacity(self.secret.len() + header.len() + scope.len());
        input.extend_from_slice(&self.secret);
        input.extend_from_slice(header);
        input.extend_from_slice(scope);
        let digest = keccak256(&input);
        let mut tag = [0u8; 16];
        tag.copy_from_slice(&digest[..16]);
        tag
    }
}

impl Default for NonceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NonceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceSource")
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_are_fresh_and_carry_their_issue_time() {
        let source = NonceSource::new();
        let now = UnixTimestamp::from_secs(1_700_000_000);
        let first = source.issue(now, b"GET /weather");
        let second = source.issue(now, b"GET /weather");
        assert_ne!(first, second);
        assert_eq!(first.issued_at(), now);
        assert_eq!(second.sequence(), first.sequence() + 1);
    }

    #[test]
    fn freshness_window() {
        let source = NonceSource::new();
        let now = UnixTimestamp::from_secs(1_700_000_000);
        assert!(source.issue(now, b"GET /weather").is_fresh_at(now, 300));
        assert!(source.issue(now.saturating_sub(300), b"GET /weather").is_fresh_at(now, 300));
        assert!(!source.issue(now.saturating_sub(301), b"GET /weather").is_fresh_at(now, 300));
        assert!(source.issue(now + 60, b"GET /weather").is_fresh_at(now, 300));
        assert!(!source.issue(now + 61, b"GET /weather").is_fresh_at(now, 300));
    }

    #[test]
    fn parses_its_own_text() {
        let nonce = NonceSource::new().issue(UnixTimestamp::now(), b"GET /weather");
        let text = nonce.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<ChallengeNonce>(), Ok(nonce));
        assert_eq!("0x1234".parse::<ChallengeNonce>(), Err(InvalidNonce));
        assert_eq!("zz".parse::<ChallengeNonce>(), Err(InvalidNonce));
    }

    #[test]
    fn only_issued_nonces_authenticate_and_only_for_their_scope() {
        let source = NonceSource::new();
        let now = UnixTimestamp::from_secs(1_700_000_000);
        let nonce = source.issue(now, b"GET /weather");
        assert!(source.authenticates(&nonce, b"GET /weather"));
        assert!(!source.authenticates(&nonce, b"GET /transfers"));
        assert!(!NonceSource::new().authenticates(&nonce, b"GET /weather"));

        let mut forged = *nonce.as_bytes();
        forged[16..].fill(0xab);
        let forged = ChallengeNonce(forged);
        assert_eq!(forged.issued_at(), now);
        assert!(!source.authenticates(&forged, b"GET /weather"));

        let mut backdated = *nonce.as_bytes();
        backdated[..8].copy_from_slice(&(now.as_secs() + 1).to_be_bytes());
        assert!(!source.authenticates(&ChallengeNonce(backdated), b"GET /weather"));
    }

    #[test]
    fn shared_secrets_accept_each_others_nonces() {
        let first = NonceSource::with_secret([7; 32]);
        let second = NonceSource::with_secret([7; 32]);
        let nonce = first.issue(UnixTimestamp::now(), b"GET /weather");
        assert!(second.authenticates(&nonce, b"GET /weather"));
    }
}
