//! Wall-clock seconds for authorization windows and nonce issue times.

use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::num::ParseIntError;
use std::ops::Add;
use std::str::FromStr;
use std::time::SystemTime;

/// Whole seconds since the Unix epoch.
///
/// Written as a decimal string (`"1699999999"`) on the wire, the way
/// authorization windows are exchanged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct UnixTimestamp(u64);

impl UnixTimestamp {
    /// Wraps a raw seconds value.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// The current wall-clock time. A clock set before the epoch reads as zero.
    #[must_use]
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(Self(0), |since| Self(since.as_secs()))
    }

    /// Raw seconds.
    #[must_use]
    pub const fn as_secs(&self) -> u64 {
        self.0
    }

    /// `secs` earlier, clamped at the epoch.
    #[must_use]
    pub const fn saturating_sub(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

/// `secs` later, clamped at `u64::MAX`.
impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}

impl fmt::Display for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for UnixTimestamp {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travels_as_a_decimal_string() {
        let at = UnixTimestamp::from_secs(1_700_000_000);
        assert_eq!(serde_json::to_string(&at).unwrap(), "\"1700000000\"");
        assert_eq!(serde_json::from_str::<UnixTimestamp>("\"1700000000\"").unwrap(), at);
        assert!(serde_json::from_str::<UnixTimestamp>("1700000000").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"-5\"").is_err());
    }

    #[test]
    fn arithmetic_saturates() {
        assert_eq!(UnixTimestamp::from_secs(10).saturating_sub(60), UnixTimestamp::from_secs(0));
        assert_eq!(UnixTimestamp::from_secs(u64::MAX) + 1, UnixTimestamp::from_secs(u64::MAX));
        assert!(UnixTimestamp::now() > UnixTimestamp::from_secs(1_600_000_000));
    }
}
