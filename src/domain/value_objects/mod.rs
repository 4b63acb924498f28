//! Value Objects for the storefront

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest quantity accepted for a single cart or order line.
pub const MAX_LINE_QUANTITY: u32 = 10_000;

/// Rounds a money amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("quantity must be between 1 and {MAX_LINE_QUANTITY}")]
    Quantity,
    #[error("discount must be between 0 and 100 percent")]
    Discount,
    #[error("score must be between 1 and 5")]
    Score,
    #[error("amount must not be negative")]
    NegativeAmount,
}

/// Quantity value object: a strictly positive unit count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: i64) -> Result<Self, ValueError> {
        if value < 1 || value > i64::from(MAX_LINE_QUANTITY) { return Err(ValueError::Quantity); }
        Ok(Self(value as u32))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn as_i32(&self) -> i32 { self.0 as i32 }
    pub fn as_decimal(&self) -> Decimal { Decimal::from(self.0) }
    pub fn add(&self, other: Quantity) -> Result<Self, ValueError> { Self::new(i64::from(self.0) + i64::from(other.0)) }
}

impl TryFrom<i64> for Quantity {
    type Error = ValueError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for i64 {
    fn from(q: Quantity) -> Self { i64::from(q.0) }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Percentage discount in `[0, 100]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Discount(Decimal);

impl Discount {
    pub const NONE: Discount = Discount(Decimal::ZERO);

    pub fn new(percent: Decimal) -> Result<Self, ValueError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED { return Err(ValueError::Discount); }
        Ok(Self(percent.normalize()))
    }
    pub fn percent(&self) -> Decimal { self.0 }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    /// Price after the discount, rounded to cents.
    pub fn apply(&self, price: Decimal) -> Decimal {
        round_money(price * (Decimal::ONE_HUNDRED - self.0) / Decimal::ONE_HUNDRED)
    }
}

impl Default for Discount { fn default() -> Self { Self::NONE } }

impl TryFrom<Decimal> for Discount {
    type Error = ValueError;
    fn try_from(value: Decimal) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Discount> for Decimal {
    fn from(d: Discount) -> Self { d.0 }
}

/// Rating score on a 1 to 5 scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
    pub fn new(value: i64) -> Result<Self, ValueError> {
        if !(1..=5).contains(&value) { return Err(ValueError::Score); }
        Ok(Self(value as u8))
    }
    pub fn value(&self) -> u8 { self.0 }
}

impl TryFrom<i64> for Score {
    type Error = ValueError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Score> for i64 {
    fn from(s: Score) -> Self { i64::from(s.0) }
}

/// Validates a money amount and rounds it to cents.
pub fn non_negative_money(amount: Decimal) -> Result<Decimal, ValueError> {
    if amount.is_sign_negative() && !amount.is_zero() { return Err(ValueError::NegativeAmount); }
    Ok(round_money(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_bounds() {
        assert!(Quantity::new(0).is_err());
        assert!(Quantity::new(-3).is_err());
        assert_eq!(Quantity::new(3).unwrap().value(), 3);
        assert!(Quantity::new(i64::from(MAX_LINE_QUANTITY) + 1).is_err());
        let merged = Quantity::new(2).unwrap().add(Quantity::new(5).unwrap()).unwrap();
        assert_eq!(merged.value(), 7);
    }

    #[test]
    fn test_discount_apply() {
        let d = Discount::new(Decimal::new(25, 0)).unwrap();
        assert_eq!(d.apply(Decimal::new(10000, 2)), Decimal::new(7500, 2));
        // 19.99 * 0.85 = 16.9915
        let d = Discount::new(Decimal::new(15, 0)).unwrap();
        assert_eq!(d.apply(Decimal::new(1999, 2)), Decimal::new(1699, 2));
        assert_eq!(Discount::NONE.apply(Decimal::new(1999, 2)), Decimal::new(1999, 2));
        assert_eq!(Discount::new(Decimal::ONE_HUNDRED).unwrap().apply(Decimal::new(1999, 2)), Decimal::ZERO);
    }

    #[test]
    fn test_discount_rejects_out_of_range() {
        assert!(Discount::new(Decimal::new(-1, 0)).is_err());
        assert!(Discount::new(Decimal::new(101, 0)).is_err());
    }

    #[test]
    fn test_score_and_money() {
        assert!(Score::new(0).is_err());
        assert!(Score::new(6).is_err());
        assert_eq!(Score::new(5).unwrap().value(), 5);
        assert_eq!(round_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert!(non_negative_money(Decimal::new(-1, 2)).is_err());
    }
}
