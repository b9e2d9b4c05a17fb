//! Value Objects for the marketplace

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use uuid::Uuid;

/// Opaque record id. All persisted entities are keyed by strings.
pub fn new_id() -> String { Uuid::now_v7().to_string() }

/// Money value object.
///
/// The marketplace settles in a single currency (see `AppConfig::currency`), so the
/// amount is carried alone. Conversion to processor minor units happens only at the
/// gateway boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);
    /// Highest unit price a listing may carry (1,000,000.00).
    pub const MAX_PRICE: Money = Money(Decimal::from_parts(100_000_000, 0, 0, false, 2));

    pub fn new(amount: Decimal) -> Self { Self(amount) }
    /// Builds an amount from integer cents, e.g. `Money::from_cents(54999)` is 549.99.
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_positive(&self) -> bool { self.0 > Decimal::ZERO }
    pub fn is_negative(&self) -> bool { self.0 < Decimal::ZERO }

    /// Rounds half away from zero to whole cents.
    pub fn round_cents(&self) -> Money {
        Money(self.0.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Integer minor units (cents). `None` only when the amount overflows `i64`.
    pub fn to_minor_units(&self) -> Option<i64> {
        self.0
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    pub fn checked_times(&self, qty: Quantity) -> Option<Money> { self.0.checked_mul(Decimal::from(qty.value())).map(Money) }
    pub fn checked_add(&self, other: Money) -> Option<Money> { self.0.checked_add(other.0).map(Money) }

    /// Saturates at the `Decimal` bounds; callers that must not saturate use `checked_times`.
    pub fn times(&self, qty: Quantity) -> Money { Money(self.0.saturating_mul(Decimal::from(qty.value()))) }
    pub fn scale(&self, rate: Decimal) -> Money { Money(self.0.saturating_mul(rate)) }
    pub fn clamp_zero(self) -> Money { if self.is_negative() { Money::ZERO } else { self } }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Self(amount) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0.saturating_add(rhs.0)) }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) { *self = *self + rhs; }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0.saturating_sub(rhs.0)) }
}

impl Mul<Quantity> for Money {
    type Output = Money;
    fn mul(self, rhs: Quantity) -> Money { self.times(rhs) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money { iter.copied().sum() }
}

/// Quantity value object. Cart lines never hold zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);

    pub fn new(value: u32) -> Result<Self, QuantityError> {
        if value == 0 { return Err(QuantityError::Zero); }
        Ok(Self(value))
    }
    pub fn value(&self) -> u32 { self.0 }
    pub fn increment(&self) -> Self { Self(self.0.saturating_add(1)) }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Quantity> for u32 {
    fn from(q: Quantity) -> u32 { q.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum QuantityError { Zero }
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Quantity must be at least 1") }
}

/// Shipping destination captured at checkout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub full_name: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

impl Address {
    /// Names of required fields that are blank, in declaration order.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        [
            ("fullName", &self.full_name),
            ("streetAddress", &self.street_address),
            ("city", &self.city),
            ("state", &self.state),
            ("zipCode", &self.zip_code),
            ("country", &self.country),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool { self.blank_fields().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_minor_units() {
        assert_eq!(Money::new(Decimal::new(54999, 2)).to_minor_units(), Some(54999));
        assert_eq!(Money::new(Decimal::new(10005, 3)).to_minor_units(), Some(1001));
        assert_eq!(Money::new(Decimal::MAX).to_minor_units(), None);
        assert_eq!(Money::new(Decimal::from(u64::MAX)).to_minor_units(), None);
    }

    #[test]
    fn test_money_arithmetic_never_panics() {
        let huge = Money::new(Decimal::MAX);
        let qty = Quantity::new(4).unwrap();
        assert_eq!(huge.checked_times(qty), None);
        assert_eq!(huge.checked_add(Money::from_cents(1)), None);
        assert_eq!(huge.times(qty), huge);
        assert_eq!(huge + huge, huge);
        assert_eq!([huge, huge].iter().sum::<Money>(), huge);
        assert_eq!(Money::from_cents(250).checked_times(qty), Some(Money::from_cents(1000)));
        assert_eq!(Money::MAX_PRICE, Money::from_cents(100_000_000));
    }

    #[test]
    fn test_money_round_half_away() {
        assert_eq!(Money::new(Decimal::new(36, 1)).round_cents(), Money::from_cents(360));
        assert_eq!(Money::new(Decimal::new(12345, 3)).round_cents(), Money::from_cents(1235));
    }

    #[test]
    fn test_money_sum() {
        let total: Money = [Money::from_cents(140848), Money::from_cents(89255)].iter().sum();
        assert_eq!(total, Money::from_cents(230103));
    }

    #[test]
    fn test_quantity_rejects_zero() {
        assert_eq!(Quantity::new(0), Err(QuantityError::Zero));
        assert_eq!(Quantity::ONE.increment().value(), 2);
    }

    #[test]
    fn test_address_blank_fields() {
        let addr = Address { full_name: "Ada".into(), street_address: "  ".into(), city: "Austin".into(), state: "TX".into(), zip_code: "".into(), country: "US".into() };
        assert_eq!(addr.blank_fields(), vec!["streetAddress", "zipCode"]);
        assert!(!addr.is_complete());
    }
}
