//! # Validation Module
//!
//! Input validation utilities for Keystone ERP.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Services (Rust)                                              │
//! │  ├── Deserialization into typed inputs (NewOrder, SettingValue)        │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Calculation (totals)                                         │
//! │  └── Negative amounts, discount > subtotal, scale bounds               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE(tenant_id, …) constraints                      │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use keystone_core::validation::{validate_setting_key, validate_tenant_slug};
//!
//! validate_setting_key("sales.tax_mode").unwrap();
//! validate_tenant_slug("acme-trading").unwrap();
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::money::Rate;
use crate::totals::SaleLine;
use crate::{MAX_ORDER_LINES, MAX_SCALE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn max_len(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// Setting Validators
// =============================================================================

fn is_key_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'
}

/// Validates a setting key.
///
/// ## Rules
/// - 1 to 100 characters
/// - Lowercase letters, digits, `_`, `-`, and `.` as a namespace separator
/// - No empty segments (`sales..mode`, `.mode`)
///
/// ## Example
/// ```rust
/// use keystone_core::validation::validate_setting_key;
///
/// assert!(validate_setting_key("sales.quotation_validity_days").is_ok());
/// assert!(validate_setting_key("Sales.Mode").is_err());
/// assert!(validate_setting_key("sales.").is_err());
/// ```
pub fn validate_setting_key(key: &str) -> ValidationResult<()> {
    required("key", key)?;
    max_len("key", key, 100)?;

    if key.split('.').any(|segment| segment.is_empty() || !segment.chars().all(is_key_char)) {
        return Err(ValidationError::InvalidFormat {
            field: "key".to_string(),
            reason: "must be lowercase letters, digits, '_' or '-' separated by dots".to_string(),
        });
    }

    Ok(())
}

/// Validates a setting group (same alphabet as keys, no dots).
pub fn validate_setting_group(group: &str) -> ValidationResult<()> {
    required("group", group)?;
    max_len("group", group, 50)?;

    if !group.chars().all(is_key_char) {
        return Err(ValidationError::InvalidFormat {
            field: "group".to_string(),
            reason: "must be lowercase letters, digits, '_' or '-'".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Tenant Validators
// =============================================================================

/// Validates a tenant display name (1 to 200 characters).
pub fn validate_tenant_name(name: &str) -> ValidationResult<()> {
    required("name", name)?;
    max_len("name", name.trim(), 200)
}

/// Validates a tenant slug.
///
/// ## Rules
/// - 3 to 63 characters
/// - Lowercase letters, digits and hyphens
/// - Cannot start or end with a hyphen
///
/// ## Example
/// ```rust
/// use keystone_core::validation::validate_tenant_slug;
///
/// assert!(validate_tenant_slug("acme").is_ok());
/// assert!(validate_tenant_slug("ac").is_err());
/// assert!(validate_tenant_slug("-acme").is_err());
/// ```
pub fn validate_tenant_slug(slug: &str) -> ValidationResult<()> {
    required("slug", slug)?;

    if slug.len() < 3 {
        return Err(ValidationError::TooShort {
            field: "slug".to_string(),
            min: 3,
        });
    }
    max_len("slug", slug, 63)?;

    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if !valid_chars || slug.starts_with('-') || slug.ends_with('-') {
        return Err(ValidationError::InvalidFormat {
            field: "slug".to_string(),
            reason: "must be lowercase letters, digits and inner hyphens".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity (any positive decimal).
pub fn validate_quantity(qty: Decimal) -> ValidationResult<()> {
    if qty <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    Ok(())
}

/// Validates a percentage rate.
///
/// ## Rules
/// - Must be between 0 and 100 inclusive
///
/// ```rust
/// use keystone_core::money::Rate;
/// use keystone_core::validation::validate_rate;
///
/// assert!(validate_rate("tax_rate", Rate::from_bps(825)).is_ok());
/// assert!(validate_rate("tax_rate", Rate::from_bps(10001)).is_err());
/// ```
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.percent() < Decimal::ZERO || rate.percent() > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: "0".to_string(),
            max: "100".to_string(),
        });
    }
    Ok(())
}

/// Validates a currency scale (0 to MAX_SCALE decimal places).
pub fn validate_scale(scale: i64) -> ValidationResult<u32> {
    if scale < 0 || scale > MAX_SCALE as i64 {
        return Err(ValidationError::OutOfRange {
            field: "currency_scale".to_string(),
            min: "0".to_string(),
            max: MAX_SCALE.to_string(),
        });
    }
    Ok(scale as u32)
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the lines of an order before totals are calculated.
///
/// ## Rules
/// - At least one line, at most MAX_ORDER_LINES
/// - Every line has a description, a positive quantity, a non-negative
///   unit price and a tax rate within 0..=100
pub fn validate_order_lines(lines: &[SaleLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        });
    }

    if lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "lines".to_string(),
            min: "1".to_string(),
            max: MAX_ORDER_LINES.to_string(),
        });
    }

    for line in lines {
        required("description", &line.description)?;
        max_len("description", &line.description, 500)?;
        validate_quantity(line.quantity)?;
        if line.unit_price.is_negative() {
            return Err(ValidationError::OutOfRange {
                field: "unit_price".to_string(),
                min: "0".to_string(),
                max: "unbounded".to_string(),
            });
        }
        validate_rate("tax_rate", line.tax_rate)?;
    }

    Ok(())
}

/// Validates a customer name on orders and quotations.
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    required("customer_name", name)?;
    max_len("customer_name", name.trim(), 200)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::totals::Discount;

    fn line(qty: i64, price: &str) -> SaleLine {
        SaleLine {
            description: "Consulting hour".to_string(),
            quantity: Decimal::new(qty, 0),
            unit_price: Money::parse(price).unwrap(),
            discount: Discount::None,
            tax_rate: Rate::from_bps(1900),
        }
    }

    #[test]
    fn test_validate_setting_key() {
        assert!(validate_setting_key("timezone").is_ok());
        assert!(validate_setting_key("sales.tax_mode").is_ok());
        assert!(validate_setting_key("mail.smtp-host").is_ok());

        assert!(validate_setting_key("").is_err());
        assert!(validate_setting_key("has space").is_err());
        assert!(validate_setting_key("a..b").is_err());
        assert!(validate_setting_key(&"a".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_setting_group() {
        assert!(validate_setting_group("sales").is_ok());
        assert!(validate_setting_group("sales.tax").is_err());
        assert!(validate_setting_group("  ").is_err());
    }

    #[test]
    fn test_validate_tenant_slug() {
        assert!(validate_tenant_slug("acme-trading").is_ok());
        assert!(validate_tenant_slug("abc").is_ok());

        assert!(validate_tenant_slug("ab").is_err());
        assert!(validate_tenant_slug("Acme").is_err());
        assert!(validate_tenant_slug("acme-").is_err());
        assert!(validate_tenant_slug(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_tenant_name() {
        assert!(validate_tenant_name("Acme Trading Ltd").is_ok());
        assert!(validate_tenant_name("").is_err());
        assert!(validate_tenant_name(&"A".repeat(201)).is_err());
    }

    #[test]
    fn test_validate_rate_and_scale() {
        assert!(validate_rate("discount", Rate::zero()).is_ok());
        assert!(validate_rate("discount", Rate::from_bps(10000)).is_ok());
        assert!(validate_rate("discount", Rate::from_percent_str("-1").unwrap()).is_err());

        assert_eq!(validate_scale(2).unwrap(), 2);
        assert!(validate_scale(-1).is_err());
        assert!(validate_scale(MAX_SCALE as i64 + 1).is_err());
    }

    #[test]
    fn test_validate_order_lines() {
        assert!(validate_order_lines(&[line(1, "10.00")]).is_ok());
        assert!(validate_order_lines(&[]).is_err());
        assert!(validate_order_lines(&[line(0, "10.00")]).is_err());
        assert!(validate_order_lines(&[line(1, "-10.00")]).is_err());

        let too_many = vec![line(1, "1.00"); MAX_ORDER_LINES + 1];
        assert!(validate_order_lines(&too_many).is_err());
    }
}
