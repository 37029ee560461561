//! Fixed-point monetary amounts.
//!
//! All arithmetic is exact decimal arithmetic on [`rust_decimal::Decimal`].
//! Nothing is rounded while values are being combined; callers round with
//! [`Money::round_for_storage`] at the point a value is persisted or returned.
//! Rounding is banker's rounding (half-even) to two decimal places.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Mul, Sub};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount in the store currency's standard unit (dollars, not cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Number of decimal places amounts are stored with.
    pub const SCALE: u32 = 2;

    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wrap a decimal amount.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build an amount from minor units (e.g., cents).
    ///
    /// ```
    /// use orderline_core::Money;
    /// assert_eq!(Money::from_cents(1050).to_string(), "10.50");
    /// ```
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, Self::SCALE))
    }

    /// Get the underlying decimal.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether the amount is below zero.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Round half-even to two decimal places.
    ///
    /// Only call this where the value leaves the computation (persisted or
    /// returned); intermediate sums stay unrounded.
    #[must_use]
    pub fn round_for_storage(self) -> Self {
        Self(
            self.0
                .round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointNearestEven),
        )
    }

    /// Multiply by a dimensionless rate (e.g., a tax rate of `0.10`).
    #[must_use]
    pub fn apply_rate(self, rate: Decimal) -> Self {
        Self(self.0 * rate)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.round_for_storage().0)
    }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

/// Price times quantity.
impl Mul<i32> for Money {
    type Output = Self;

    fn mul(self, quantity: i32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Self> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn money(s: &str) -> Money {
        Money::new(s.parse().unwrap_or_default())
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(money("2.345").round_for_storage(), money("2.34"));
        assert_eq!(money("2.355").round_for_storage(), money("2.36"));
        assert_eq!(money("0.125").round_for_storage(), money("0.12"));
        assert_eq!(money("0.135").round_for_storage(), money("0.14"));
    }

    #[test]
    fn test_price_times_quantity() {
        assert_eq!(money("10.00") * 2, money("20.00"));
        assert_eq!(money("0.99") * 3, money("2.97"));
    }

    #[test]
    fn test_apply_rate_is_not_rounded() {
        let tax = money("0.25").apply_rate("0.1".parse().unwrap_or_default());
        assert_eq!(tax.amount(), "0.025".parse().unwrap_or_default());
    }

    #[test]
    fn test_display_uses_two_places() {
        assert_eq!(money("37.5").to_string(), "37.50");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_sum() {
        let total: Money = [money("1.10"), money("2.20"), money("3.30")].iter().sum();
        assert_eq!(total, money("6.60"));
    }

    #[test]
    fn test_is_negative() {
        assert!(money("-0.01").is_negative());
        assert!(!Money::ZERO.is_negative());
        assert!(!money("0.01").is_negative());
    }

    proptest! {
        /// Rounding never moves a value by more than half a cent.
        #[test]
        fn rounding_stays_within_half_a_cent(mills in -10_000_000i64..10_000_000i64) {
            let value = Money::new(Decimal::new(mills, 3));
            let rounded = value.round_for_storage();
            let diff = (rounded.amount() - value.amount()).abs();
            prop_assert!(diff <= Decimal::new(5, 3));
            prop_assert!(rounded.amount().scale() <= Money::SCALE);
        }
    }
}
