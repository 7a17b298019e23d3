//! # Money Module
//!
//! Provides the `Money` and `Rate` types for handling monetary values safely.
//!
//! ## Why Fixed-Point Decimals?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Tenants bill in different currencies with different minor units:      │
//! │    USD 2 places, JPY 0 places, KWD 3 places                            │
//! │                                                                         │
//! │  OUR SOLUTION: Decimal values + explicit scale                          │
//! │    "10.00" / 3 → 3.3333333... kept exact until the final round_to(2)   │
//! │    Rounding happens ONCE per stored amount, half away from zero        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use keystone_core::money::Money;
//!
//! let price = Money::parse("10.99").unwrap();
//! let total = price + Money::parse("5.00").unwrap();
//! assert_eq!(total.to_fixed(2), "15.99");
//!
//! // Amounts enter the system as strings, never as floats
//! assert!(Money::parse("ten dollars").is_err());
//! ```

use rust_decimal::prelude::*;
use rust_decimal::RoundingStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::MAX_SCALE;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value with arbitrary decimal precision.
///
/// ## Design Decisions
/// - **Unrounded internally**: intermediate results keep full precision,
///   callers decide when to [`Money::round_to`] a currency scale
/// - **Signed**: negative values represent credits and refunds
/// - **String on the wire**: serializes as `"12.50"` so no JSON consumer
///   ever sees a float
///
/// ## Where Money Is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  SaleLine.unit_price × quantity ──► line subtotal                      │
/// │                                          │                              │
/// │  SaleTotal::calculate ◄──────────────────┘                              │
/// │     subtotal ─► discount ─► tax ─► total                               │
/// │                                          │                              │
/// │  Order.total (stored as TEXT) ◄──────────┘                              │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Parses a decimal string such as `"1099.50"` or `"-5"`.
    ///
    /// ## Example
    /// ```rust
    /// use keystone_core::money::Money;
    ///
    /// let price = Money::parse("10.99").unwrap();
    /// assert_eq!(price.to_fixed(2), "10.99");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ValidationError::Required {
                field: "amount".to_string(),
            });
        }

        Decimal::from_str(raw)
            .map(Money)
            .map_err(|e| ValidationError::invalid_format("amount", e.to_string()))
    }

    /// Wraps an existing decimal.
    #[inline]
    pub const fn from_decimal(value: Decimal) -> Self {
        Money(value)
    }

    /// Creates money from an integer number of minor units at `scale`.
    ///
    /// ```rust
    /// use keystone_core::money::Money;
    ///
    /// assert_eq!(Money::from_minor(1099, 2).to_fixed(2), "10.99");
    /// ```
    #[inline]
    pub fn from_minor(minor: i64, scale: u32) -> Self {
        Money(Decimal::new(minor, scale))
    }

    /// Returns the underlying decimal.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    /// Returns the absolute value.
    #[inline]
    pub fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Rounds to `scale` decimal places, half away from zero.
    ///
    /// ## Rounding Rule
    /// ```text
    /// 7.425  → 7.43
    /// 7.424  → 7.42
    /// -7.425 → -7.43   (symmetric for refunds)
    /// ```
    ///
    /// ```rust
    /// use keystone_core::money::Money;
    ///
    /// let tax = Money::parse("7.425").unwrap();
    /// assert_eq!(tax.round_to(2).to_fixed(2), "7.43");
    /// ```
    pub fn round_to(&self, scale: u32) -> Self {
        let mut rounded = self
            .0
            .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
        if rounded.is_zero() {
            rounded.set_sign_positive(true);
        }
        Money(rounded)
    }

    /// Renders the amount rounded to exactly `scale` decimal places.
    ///
    /// ```rust
    /// use keystone_core::money::Money;
    ///
    /// assert_eq!(Money::parse("5").unwrap().to_fixed(2), "5.00");
    /// assert_eq!(Money::parse("5.005").unwrap().to_fixed(2), "5.01");
    /// ```
    pub fn to_fixed(&self, scale: u32) -> String {
        let rounded = self.round_to(scale);
        format!("{:.*}", scale as usize, rounded.0)
    }

    /// Multiplies by a quantity, failing instead of panicking on overflow.
    pub fn checked_mul(&self, factor: Decimal) -> CoreResult<Self> {
        self.0
            .checked_mul(factor)
            .map(Money)
            .ok_or_else(|| CoreError::Overflow(format!("{} × {}", self.0, factor)))
    }

    /// Adds two amounts, failing instead of panicking on overflow.
    pub fn checked_add(&self, other: Money) -> CoreResult<Self> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| CoreError::Overflow(format!("{} + {}", self.0, other.0)))
    }
}

// =============================================================================
// Rate Type
// =============================================================================

/// A percentage rate used for taxes and discounts.
///
/// `Rate` stores the percentage itself: `8.25` means 8.25%.
///
/// ```rust
/// use keystone_core::money::Rate;
///
/// let vat = Rate::from_percent_str("20").unwrap();
/// assert_eq!(vat, Rate::from_bps(2000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(Decimal);

impl Rate {
    /// Parses a percentage such as `"8.25"`.
    pub fn from_percent_str(raw: &str) -> Result<Self, ValidationError> {
        Decimal::from_str(raw.trim())
            .map(Rate)
            .map_err(|e| ValidationError::invalid_format("rate", e.to_string()))
    }

    /// Creates a rate from basis points (825 bps = 8.25%).
    #[inline]
    pub fn from_bps(bps: u32) -> Self {
        Rate(Decimal::new(bps as i64, 2))
    }

    /// Wraps a percentage decimal.
    #[inline]
    pub const fn from_percent(percent: Decimal) -> Self {
        Rate(percent)
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(Decimal::ZERO)
    }

    /// Checks if the rate is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns the percentage value (8.25 for 8.25%).
    #[inline]
    pub const fn percent(&self) -> Decimal {
        self.0
    }

    /// Returns the rate as a fraction (0.0825 for 8.25%).
    #[inline]
    pub fn fraction(&self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }

    /// Applies the rate to an amount without rounding.
    ///
    /// ```rust
    /// use keystone_core::money::{Money, Rate};
    ///
    /// let base = Money::parse("10.00").unwrap();
    /// let tax = Rate::from_bps(825).apply_to(base).unwrap();
    /// assert_eq!(tax.to_fixed(3), "0.825");
    /// ```
    pub fn apply_to(&self, amount: Money) -> CoreResult<Money> {
        amount.checked_mul(self.fraction())
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0.normalize())
    }
}

/// Checks that a scale is within `0..=MAX_SCALE`.
pub fn check_scale(scale: u32) -> CoreResult<()> {
    if scale > MAX_SCALE {
        return Err(CoreError::InvalidScale {
            requested: scale,
            max: MAX_SCALE,
        });
    }
    Ok(())
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows the exact stored value; use [`Money::to_fixed`] for output.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by a decimal quantity.
impl Mul<Decimal> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: Decimal) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn money(raw: &str) -> Money {
        Money::parse(raw).unwrap()
    }

    #[test]
    fn test_parse() {
        assert_eq!(money("10.99").amount(), Decimal::new(1099, 2));
        assert_eq!(money(" 3 ").to_fixed(2), "3.00");
        assert!(Money::parse("").is_err());
        assert!(Money::parse("12,50").is_err());
    }

    #[test]
    fn test_no_float_drift() {
        let sum = money("0.1") + money("0.2");
        assert_eq!(sum, money("0.3"));
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(money("2.345").to_fixed(2), "2.35");
        assert_eq!(money("2.344").to_fixed(2), "2.34");
        assert_eq!(money("-2.345").to_fixed(2), "-2.35");
        assert_eq!(money("0.5").to_fixed(0), "1");
    }

    #[test]
    fn test_negative_zero_is_rendered_unsigned() {
        assert_eq!(money("-0.001").to_fixed(2), "0.00");
    }

    #[test]
    fn test_to_fixed_pads() {
        assert_eq!(money("7").to_fixed(3), "7.000");
        assert_eq!(Money::from_minor(5, 2).to_fixed(2), "0.05");
    }

    #[test]
    fn test_arithmetic() {
        let a = money("10.00");
        let b = money("5.00");

        assert_eq!((a + b).to_fixed(2), "15.00");
        assert_eq!((a - b).to_fixed(2), "5.00");
        assert_eq!((a * Decimal::new(3, 0)).to_fixed(2), "30.00");
        assert_eq!(vec![a, b, b].into_iter().sum::<Money>().to_fixed(2), "20.00");
    }

    #[test]
    fn test_rate_application() {
        let rate = Rate::from_percent_str("8.25").unwrap();
        assert_eq!(rate, Rate::from_bps(825));
        assert_eq!(rate.fraction(), Decimal::new(825, 4));
        assert_eq!(rate.apply_to(money("100")).unwrap().to_fixed(2), "8.25");
        assert_eq!(rate.to_string(), "8.25%");
    }

    #[test]
    fn test_checked_mul_overflow() {
        let huge = Money::from_decimal(Decimal::MAX);
        assert!(matches!(
            huge.checked_mul(Decimal::new(2, 0)),
            Err(CoreError::Overflow(_))
        ));
    }

    #[test]
    fn test_check_scale() {
        assert!(check_scale(0).is_ok());
        assert!(check_scale(MAX_SCALE).is_ok());
        assert!(check_scale(MAX_SCALE + 1).is_err());
    }

    /// Splitting 10.00 three ways loses a cent only when the parts are
    /// rounded; the unrounded parts still sum back exactly.
    #[test]
    fn test_division_precision_documented() {
        let ten = money("10.00");
        let third = Money::from_decimal(ten.amount() / Decimal::new(3, 0));
        let rounded_third = third.round_to(2);

        let reconstructed = rounded_third * Decimal::new(3, 0);
        assert_eq!(reconstructed.to_fixed(2), "9.99");
        assert_eq!((ten - reconstructed).to_fixed(2), "0.01");
    }
}
