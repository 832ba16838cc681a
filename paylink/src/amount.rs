//! Human-readable prices.
//!
//! A [`Price`] is a positive decimal with an explicit currency, written the way
//! route configuration and 402 challenges show it: `"$0.01"`, `"0.25 USDC"`,
//! `"1,000 EUR"`. A bare number is read as US dollars. Conversion to and from
//! an asset's atomic units is exact; no floating point is involved.

use regex::Regex;
use rust_decimal::Decimal;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Smallest accepted price.
pub const MIN_PRICE: &str = "0.000000001";
/// Largest accepted price.
pub const MAX_PRICE: &str = "999999999";

static PRICE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\$)?\s*(-?[0-9][0-9,]*(?:\.[0-9]+)?|-?\.[0-9]+)\s*([A-Za-z]{3,6})?\s*$")
        .expect("price pattern is valid")
});

static MIN: LazyLock<Decimal> =
    LazyLock::new(|| Decimal::from_str(MIN_PRICE).expect("valid decimal"));
static MAX: LazyLock<Decimal> =
    LazyLock::new(|| Decimal::from_str(MAX_PRICE).expect("valid decimal"));

/// Currency code of a [`Price`], uppercased (`USD`, `USDC`, `EUR`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Currency(String);

impl Currency {
    /// US dollars, the currency of `$`-prefixed prices.
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_owned())
    }

    /// Builds a currency from a code, normalizing case.
    #[must_use]
    pub fn new(code: &str) -> Self {
        Self(code.to_ascii_uppercase())
    }

    /// The uppercased code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors produced when parsing or converting a [`Price`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input is not a recognizable price.
    #[error("invalid price format: {0:?}")]
    InvalidFormat(String),
    /// The price is negative.
    #[error("negative prices are not allowed")]
    Negative,
    /// The price lies outside the accepted range.
    #[error("price must be between {MIN_PRICE} and {MAX_PRICE}")]
    OutOfRange,
    /// `$` was combined with a non-dollar currency code.
    #[error("'$' cannot be combined with currency {0}")]
    ConflictingCurrency(String),
    /// The price has more fractional digits than the asset supports.
    #[error("price has {price} fractional digits but the asset only has {asset}")]
    WrongPrecision {
        /// Fractional digits in the price.
        price: u32,
        /// Decimals of the asset.
        asset: u8,
    },
    /// The atomic value does not fit the target integer.
    #[error("amount overflows the atomic representation")]
    Overflow,
}

/// A positive decimal amount with an explicit currency.
#[derive(Debug, Clone, PartialEq, Eq, SerializeDisplay, DeserializeFromStr)]
pub struct Price {
    amount: Decimal,
    currency: Currency,
}

impl Price {
    /// Builds a price from an amount and a currency, enforcing the accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Negative`] or [`AmountError::OutOfRange`].
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, AmountError> {
        if amount.is_sign_negative() {
            return Err(AmountError::Negative);
        }
        if amount < *MIN || amount > *MAX {
            return Err(AmountError::OutOfRange);
        }
        Ok(Self {
            amount: amount.normalize(),
            currency,
        })
    }

    /// Parses strings like `"$0.01"`, `"0.01 USDC"` or `"1,000"`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] when the text is not a valid price.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let captures = PRICE_PATTERN
            .captures(input)
            .ok_or_else(|| AmountError::InvalidFormat(input.to_owned()))?;
        let dollar = captures.get(1).is_some();
        let digits = captures
            .get(2)
            .map(|m| m.as_str().replace(',', ""))
            .ok_or_else(|| AmountError::InvalidFormat(input.to_owned()))?;
        let currency = match (dollar, captures.get(3)) {
            (true, Some(code)) if !code.as_str().eq_ignore_ascii_case("USD") => {
                return Err(AmountError::ConflictingCurrency(code.as_str().to_owned()));
            }
            (_, Some(code)) => Currency::new(code.as_str()),
            (_, None) => Currency::usd(),
        };
        let amount =
            Decimal::from_str(&digits).map_err(|_| AmountError::InvalidFormat(input.to_owned()))?;
        Self::new(amount, currency)
    }

    /// Reconstructs a price from an atomic amount of an asset with `decimals`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] if the value overflows or is out of range.
    pub fn from_atomic(atomic: u128, decimals: u8, currency: Currency) -> Result<Self, AmountError> {
        let mantissa = i128::try_from(atomic).map_err(|_| AmountError::Overflow)?;
        let amount = Decimal::try_from_i128_with_scale(mantissa, u32::from(decimals))
            .map_err(|_| AmountError::Overflow)?;
        Self::new(amount, currency)
    }

    /// Converts to atomic units of an asset with `decimals` fractional digits.
    ///
    /// `$0.01` at 6 decimals is `10000`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::WrongPrecision`] when the price is finer than the
    /// asset can represent, or [`AmountError::Overflow`].
    pub fn to_atomic(&self, decimals: u8) -> Result<u128, AmountError> {
        let normalized = self.amount.normalize();
        let scale = normalized.scale();
        let decimals_u32 = u32::from(decimals);
        if scale > decimals_u32 {
            return Err(AmountError::WrongPrecision {
                price: scale,
                asset: decimals,
            });
        }
        let factor = 10u128
            .checked_pow(decimals_u32 - scale)
            .ok_or(AmountError::Overflow)?;
        normalized
            .mantissa()
            .unsigned_abs()
            .checked_mul(factor)
            .ok_or(AmountError::Overflow)
    }

    /// The decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency.
    #[must_use]
    pub const fn currency(&self) -> &Currency {
        &self.currency
    }
}

impl FromStr for Price {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.currency.code() == "USD" {
            write!(f, "${}", self.amount)
        } else {
            write!(f, "{} {}", self.amount, self.currency)
        }
    }
}
