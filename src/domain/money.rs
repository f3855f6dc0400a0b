//! Fixed-point monetary values and split percentages.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CENT_PLACES: u32 = 2;
const HUNDRED: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Single-currency amount backed by an exact decimal.
///
/// Arithmetic never rounds; callers round with [`Money::round_cents`] once a
/// figure has been fully aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Ceiling for any single expense, template or payment amount. Keeps
    /// every monthly aggregate far inside the decimal range.
    pub const MAX_AMOUNT: Money = Money(Decimal::from_parts(1_000_000_000, 0, 0, false, 0));

    /// create from whole currency units
    pub fn from_major(amount: i64) -> Self {
        Money(Decimal::from(amount))
    }

    /// create from cents
    pub fn from_cents(cents: i64) -> Self {
        Money(Decimal::new(cents, CENT_PLACES))
    }

    /// Half-up rounding at the cent (midpoints move away from zero).
    pub fn round_cents(&self) -> Self {
        Money(
            self.0
                .round_dp_with_strategy(CENT_PLACES, RoundingStrategy::MidpointAwayFromZero),
        )
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// No precision finer than a cent.
    pub fn is_whole_cents(&self) -> bool {
        self.0.normalize().scale() <= CENT_PLACES
    }

    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Money(Decimal::from_str(s.trim())?))
    }
}

impl From<Decimal> for Money {
    fn from(d: Decimal) -> Self {
        Money(d)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("split ratio must be between 0 and 100, got {0}")]
pub struct InvalidSplitRatio(pub Decimal);

/// Percentage of a shared amount attributed to the person who paid it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct SplitRatio(Decimal);

impl SplitRatio {
    pub const EVEN: SplitRatio = SplitRatio(Decimal::from_parts(50, 0, 0, false, 0));

    pub fn new(percent: Decimal) -> Result<Self, InvalidSplitRatio> {
        if percent < Decimal::ZERO || percent > HUNDRED {
            return Err(InvalidSplitRatio(percent));
        }
        Ok(SplitRatio(percent))
    }

    /// Treats a missing or zero ratio as an even split.
    pub fn or_even(percent: Option<Decimal>) -> Result<Self, InvalidSplitRatio> {
        match percent {
            None => Ok(Self::EVEN),
            Some(value) if value.is_zero() => Ok(Self::EVEN),
            Some(value) => Self::new(value),
        }
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// Unrounded share of `amount` owned by the creator.
    pub fn creator_share(&self, amount: Money) -> Money {
        Money(amount.0 * self.0 / HUNDRED)
    }

    /// Unrounded remainder owned by the counterparty; sums with
    /// [`SplitRatio::creator_share`] back to `amount` exactly.
    pub fn other_share(&self, amount: Money) -> Money {
        amount - self.creator_share(amount)
    }
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self::EVEN
    }
}

impl TryFrom<Decimal> for SplitRatio {
    type Error = InvalidSplitRatio;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        SplitRatio::new(value)
    }
}

impl From<SplitRatio> for Decimal {
    fn from(ratio: SplitRatio) -> Self {
        ratio.0
    }
}

impl fmt::Display for SplitRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn round_cents_moves_midpoints_away_from_zero() {
        assert_eq!(Money::from(dec!(10.005)).round_cents(), Money::from(dec!(10.01)));
        assert_eq!(Money::from(dec!(10.004)).round_cents(), Money::from(dec!(10.00)));
        assert_eq!(Money::from(dec!(-2.125)).round_cents(), Money::from(dec!(-2.13)));
    }

    #[test]
    fn split_shares_add_back_to_amount() {
        let ratio = SplitRatio::new(dec!(33.33)).unwrap();
        let amount = Money::from(dec!(101.17));
        let creator = ratio.creator_share(amount);
        let other = ratio.other_share(amount);
        assert_eq!(creator + other, amount);
    }

    #[test]
    fn zero_or_missing_ratio_means_even_split() {
        assert_eq!(SplitRatio::or_even(None).unwrap(), SplitRatio::EVEN);
        assert_eq!(SplitRatio::or_even(Some(dec!(0))).unwrap(), SplitRatio::EVEN);
        assert_eq!(
            SplitRatio::or_even(Some(dec!(70))).unwrap().percent(),
            dec!(70)
        );
    }

    #[test]
    fn ratio_outside_percentage_range_is_rejected() {
        assert!(SplitRatio::new(dec!(100.01)).is_err());
        assert!(SplitRatio::new(dec!(-1)).is_err());
        assert!(serde_json::from_str::<SplitRatio>("\"120\"").is_err());
    }

    #[test]
    fn whole_cents_ignores_trailing_zeros() {
        assert!(Money::from(dec!(10.50)).is_whole_cents());
        assert!(Money::from(dec!(10.5000)).is_whole_cents());
        assert!(!Money::from(dec!(10.005)).is_whole_cents());
        assert!(Money::MAX_AMOUNT > Money::from_major(999_999_999));
    }

    #[test]
    fn money_parses_and_displays_two_places() {
        let amount: Money = " 12.5 ".parse().unwrap();
        assert_eq!(amount.to_string(), "12.50");
    }
}
