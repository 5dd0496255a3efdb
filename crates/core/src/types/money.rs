//! Integer minor-unit money.
//!
//! All financial arithmetic in Toolbelt happens in integer minor currency
//! units (pence, cents). Conversion to and from decimal display units is
//! confined to this module and uses round-half-up, so totals are identical
//! regardless of which process computed them.

use core::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing [`Money`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The decimal amount does not fit in 64-bit minor units.
    #[error("amount out of range for minor units")]
    OutOfRange,
    /// The input string is not a decimal amount.
    #[error("invalid decimal amount: {0}")]
    InvalidAmount(String),
}

/// A monetary amount in integer minor units.
///
/// `Money` is deliberately currency-blind; pair it with a [`CurrencyCode`]
/// on the owning record. Arithmetic is checked so an overflowing sum
/// surfaces as a storage-level corruption error instead of wrapping.
///
/// ## Examples
///
/// ```
/// use toolbelt_core::Money;
///
/// let unit = Money::from_minor(1999);
/// let pair = Money::from_minor(500).checked_mul(2).unwrap();
/// let shipping = Money::from_minor(450);
///
/// let total = unit
///     .checked_add(pair)
///     .and_then(|t| t.checked_add(shipping))
///     .unwrap();
/// assert_eq!(total.minor_units(), 3449);
/// assert_eq!(total.to_string(), "34.49");
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Zero in any currency.
    pub const ZERO: Self = Self(0);

    /// Wrap an amount already expressed in minor units.
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The amount in minor units.
    #[must_use]
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Whether the amount is negative.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => Some(Self(sum)),
            None => None,
        }
    }

    /// Checked multiplication by a quantity.
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as i64) {
            Some(product) => Some(Self(product)),
            None => None,
        }
    }

    /// Convert a decimal display amount (e.g. `19.99`) into minor units.
    ///
    /// Sub-minor precision is resolved with round-half-up, the only place
    /// rounding is permitted.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::OutOfRange`] if the scaled amount does not fit
    /// in an `i64`.
    pub fn from_decimal(amount: Decimal) -> Result<Self, MoneyError> {
        let scaled = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or(MoneyError::OutOfRange)?;
        let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        rounded.to_i64().map(Self).ok_or(MoneyError::OutOfRange)
    }

    /// Parse a decimal display string (e.g. `"34.49"`) into minor units.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::InvalidAmount`] for non-decimal input and
    /// [`MoneyError::OutOfRange`] for amounts that do not fit.
    pub fn from_decimal_str(s: &str) -> Result<Self, MoneyError> {
        let amount = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| MoneyError::InvalidAmount(s.to_owned()))?;
        Self::from_decimal(amount)
    }

    /// The amount in decimal display units.
    #[must_use]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let minor = <i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(minor))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// ISO 4217 currency codes accepted by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    GBP,
    USD,
    EUR,
}

impl CurrencyCode {
    /// The ISO code as provider APIs expect it (lowercase).
    #[must_use]
    pub const fn as_provider_str(&self) -> &'static str {
        match self {
            Self::GBP => "gbp",
            Self::USD => "usd",
            Self::EUR => "eur",
        }
    }

    /// The ISO code in canonical uppercase form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GBP => "GBP",
            Self::USD => "USD",
            Self::EUR => "EUR",
        }
    }

    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::GBP => "£",
            Self::USD => "$",
            Self::EUR => "€",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GBP" => Ok(Self::GBP),
            "USD" => Ok(Self::USD),
            "EUR" => Ok(Self::EUR),
            _ => Err(format!("invalid currency code: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_line_items_in_minor_units() {
        let subtotal = Money::from_minor(1999)
            .checked_add(Money::from_minor(500).checked_mul(2).unwrap())
            .unwrap();
        let total = subtotal.checked_add(Money::from_minor(450)).unwrap();
        assert_eq!(total, Money::from_minor(3449));
    }

    #[test]
    fn decimal_conversion_is_exact_for_two_places() {
        assert_eq!(
            Money::from_decimal_str("19.99").unwrap(),
            Money::from_minor(1999)
        );
        assert_eq!(
            Money::from_decimal_str("5").unwrap(),
            Money::from_minor(500)
        );
        assert_eq!(Money::from_minor(3449).to_string(), "34.49");
    }

    #[test]
    fn sub_minor_amounts_round_half_up() {
        assert_eq!(
            Money::from_decimal_str("4.505").unwrap(),
            Money::from_minor(451)
        );
        assert_eq!(
            Money::from_decimal_str("4.504").unwrap(),
            Money::from_minor(450)
        );
        // Away from zero on the negative side
        assert_eq!(
            Money::from_decimal_str("-4.505").unwrap(),
            Money::from_minor(-451)
        );
    }

    #[test]
    fn rejects_non_decimal_input() {
        assert!(matches!(
            Money::from_decimal_str("nineteen"),
            Err(MoneyError::InvalidAmount(_))
        ));
    }

    #[test]
    fn checked_arithmetic_catches_overflow() {
        assert!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)).is_none());
        assert!(Money::from_minor(i64::MAX / 2).checked_mul(3).is_none());
    }

    #[test]
    fn currency_codes_round_trip() {
        assert_eq!("gbp".parse::<CurrencyCode>().unwrap(), CurrencyCode::GBP);
        assert_eq!(CurrencyCode::EUR.as_provider_str(), "eur");
        assert!("XYZ".parse::<CurrencyCode>().is_err());
    }
}
