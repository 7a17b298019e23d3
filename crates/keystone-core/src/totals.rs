//! # Sale Totals
//!
//! Fixed-scale calculation of sale, order and quotation totals.
//!
//! ## Calculation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    SaleTotal::calculate                                 │
//! │                                                                         │
//! │  subtotal ────────────────► must be >= 0                               │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  discount  = pct × subtotal  |  fixed amount   (rounded to scale)      │
//! │      │       must be <= subtotal                                        │
//! │      ▼                                                                  │
//! │  taxable   = subtotal - discount                                        │
//! │      │                                                                  │
//! │      ├── Exclusive: tax = round(taxable × rate)                        │
//! │      │              total = taxable + tax                               │
//! │      │                                                                  │
//! │      └── Inclusive: tax = round(taxable - taxable / (1 + rate))        │
//! │                     total = taxable                                     │
//! │                                                                         │
//! │  Every stored part is rounded ONCE, so the parts always add up:        │
//! │    subtotal - discount + tax == total   (exclusive)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{check_scale, Money, Rate};

// =============================================================================
// Tax Mode
// =============================================================================

/// How the tax rate relates to the prices entered for a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxMode {
    /// Price + tax shown separately.
    #[default]
    Exclusive,
    /// Price already includes tax.
    Inclusive,
}

impl std::fmt::Display for TaxMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaxMode::Exclusive => write!(f, "exclusive"),
            TaxMode::Inclusive => write!(f, "inclusive"),
        }
    }
}

impl std::str::FromStr for TaxMode {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exclusive" => Ok(TaxMode::Exclusive),
            "inclusive" => Ok(TaxMode::Inclusive),
            _ => Err(crate::error::ValidationError::NotAllowed {
                field: "tax_mode".to_string(),
                allowed: vec!["exclusive".to_string(), "inclusive".to_string()],
            }),
        }
    }
}

// =============================================================================
// Discount
// =============================================================================

/// A discount applied before tax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// No discount.
    #[default]
    None,
    /// A percentage of the subtotal.
    Percentage(Rate),
    /// A fixed amount off the subtotal.
    Fixed(Money),
}

impl Discount {
    /// Resolves the discount amount for `subtotal`, rounded to `scale`.
    pub fn amount_for(&self, subtotal: Money, scale: u32) -> CoreResult<Money> {
        let amount = match self {
            Discount::None => Money::zero(),
            Discount::Percentage(rate) => {
                if rate.percent() < Decimal::ZERO || rate.percent() > Decimal::ONE_HUNDRED {
                    return Err(CoreError::InvalidAmount {
                        field: "discount".to_string(),
                        reason: format!("percentage {} must be between 0 and 100", rate),
                    });
                }
                rate.apply_to(subtotal)?
            }
            Discount::Fixed(amount) => {
                if amount.is_negative() {
                    return Err(CoreError::InvalidAmount {
                        field: "discount".to_string(),
                        reason: "fixed discount cannot be negative".to_string(),
                    });
                }
                *amount
            }
        };

        Ok(amount.round_to(scale))
    }
}

// =============================================================================
// Sale Total
// =============================================================================

/// The rounded components of a sale total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotal {
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub scale: u32,
}

impl SaleTotal {
    /// All-zero totals at `scale`.
    pub fn zero(scale: u32) -> Self {
        SaleTotal {
            subtotal: Money::zero(),
            discount: Money::zero(),
            tax: Money::zero(),
            total: Money::zero(),
            scale,
        }
    }

    /// Calculates subtotal → discount → tax → total at a fixed scale.
    ///
    /// ## Example
    /// ```rust
    /// use keystone_core::money::{Money, Rate};
    /// use keystone_core::totals::{Discount, SaleTotal, TaxMode};
    ///
    /// let totals = SaleTotal::calculate(
    ///     Money::parse("200.00").unwrap(),
    ///     &Discount::Fixed(Money::parse("20.00").unwrap()),
    ///     Rate::from_bps(1000),
    ///     TaxMode::Exclusive,
    ///     2,
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(totals.tax.to_fixed(2), "18.00");
    /// assert_eq!(totals.total.to_fixed(2), "198.00");
    /// ```
    pub fn calculate(
        subtotal: Money,
        discount: &Discount,
        tax_rate: Rate,
        mode: TaxMode,
        scale: u32,
    ) -> CoreResult<Self> {
        check_scale(scale)?;

        if subtotal.is_negative() {
            return Err(CoreError::InvalidAmount {
                field: "subtotal".to_string(),
                reason: "subtotal cannot be negative".to_string(),
            });
        }
        if tax_rate.percent() < Decimal::ZERO {
            return Err(CoreError::InvalidAmount {
                field: "tax_rate".to_string(),
                reason: "tax rate cannot be negative".to_string(),
            });
        }

        let subtotal = subtotal.round_to(scale);
        let discount = discount.amount_for(subtotal, scale)?;

        if discount > subtotal {
            return Err(CoreError::DiscountExceedsSubtotal {
                discount: discount.to_fixed(scale),
                subtotal: subtotal.to_fixed(scale),
            });
        }

        let taxable = subtotal - discount;

        let (tax, total) = match mode {
            TaxMode::Exclusive => {
                let tax = tax_rate.apply_to(taxable)?.round_to(scale);
                (tax, taxable.checked_add(tax)?)
            }
            TaxMode::Inclusive => {
                let divisor = Decimal::ONE + tax_rate.fraction();
                let net = taxable
                    .amount()
                    .checked_div(divisor)
                    .ok_or_else(|| CoreError::Overflow("inclusive tax base".to_string()))?;
                let tax = (taxable - Money::from_decimal(net)).round_to(scale);
                (tax, taxable)
            }
        };

        Ok(SaleTotal {
            subtotal,
            discount,
            tax,
            total,
            scale,
        })
    }

    /// Calculates totals for a list of lines.
    ///
    /// Each line is rounded on its own, then the rounded parts are summed.
    /// Printed documents show per-line amounts, so their sum must match
    /// the document total.
    pub fn from_lines(lines: &[SaleLine], mode: TaxMode, scale: u32) -> CoreResult<Self> {
        check_scale(scale)?;

        lines.iter().try_fold(SaleTotal::zero(scale), |acc, line| {
            let line_total = line.totals(mode, scale)?;
            acc.plus(&line_total)
        })
    }

    /// Applies an order-level discount on top of already computed line
    /// totals.
    ///
    /// The discount reduces the tax proportionally: the effective tax rate of
    /// the lines (tax / taxable) is kept.
    pub fn with_order_discount(&self, discount: &Discount, mode: TaxMode) -> CoreResult<Self> {
        if matches!(discount, Discount::None) {
            return Ok(*self);
        }

        let taxable = self.subtotal - self.discount;
        let extra = discount.amount_for(taxable, self.scale)?;
        if extra > taxable {
            return Err(CoreError::DiscountExceedsSubtotal {
                discount: extra.to_fixed(self.scale),
                subtotal: taxable.to_fixed(self.scale),
            });
        }

        let remaining = taxable - extra;
        let tax = if taxable.is_zero() {
            Money::zero()
        } else {
            let ratio = remaining
                .amount()
                .checked_div(taxable.amount())
                .ok_or_else(|| CoreError::Overflow("order discount ratio".to_string()))?;
            self.tax.checked_mul(ratio)?.round_to(self.scale)
        };

        let total = match mode {
            TaxMode::Exclusive => remaining.checked_add(tax)?,
            TaxMode::Inclusive => remaining,
        };

        Ok(SaleTotal {
            subtotal: self.subtotal,
            discount: self.discount + extra,
            tax,
            total,
            scale: self.scale,
        })
    }

    /// Adds the parts of two totals at the same scale.
    pub fn plus(&self, other: &SaleTotal) -> CoreResult<Self> {
        Ok(SaleTotal {
            subtotal: self.subtotal.checked_add(other.subtotal)?,
            discount: self.discount.checked_add(other.discount)?,
            tax: self.tax.checked_add(other.tax)?,
            total: self.total.checked_add(other.total)?,
            scale: self.scale,
        })
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// One priced line of an order or quotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub tax_rate: Rate,
}

impl SaleLine {
    /// Unrounded `quantity × unit_price`.
    pub fn line_subtotal(&self) -> CoreResult<Money> {
        if self.quantity <= Decimal::ZERO {
            return Err(CoreError::InvalidAmount {
                field: "quantity".to_string(),
                reason: format!("quantity {} must be positive", self.quantity),
            });
        }
        self.unit_price.checked_mul(self.quantity)
    }

    /// Totals for this line alone.
    pub fn totals(&self, mode: TaxMode, scale: u32) -> CoreResult<SaleTotal> {
        SaleTotal::calculate(self.line_subtotal()?, &self.discount, self.tax_rate, mode, scale)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
