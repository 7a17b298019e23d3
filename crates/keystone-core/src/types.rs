//! # Domain Types
//!
//! Core domain types shared by the database layer and the services.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Tenant      │   │     Setting     │   │      Order      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  tenant_id (FK) │   │  tenant_id (FK) │       │
//! │  │  slug           │   │  key, group     │   │  order_number   │       │
//! │  │  is_active      │   │  SettingValue   │   │  SaleTotal parts│       │
//! │  └─────────────────┘   └─────────────────┘   └────────┬────────┘       │
//! │                                                       │ OrderPlaced    │
//! │                                              ┌────────▼────────┐       │
//! │                                              │    Quotation    │       │
//! │                                              │  order_id (FK)  │       │
//! │                                              │  valid_until    │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (slug, order_number, quotation_number) - human-readable

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::tenant::{BelongsToTenant, TenantId};
use crate::totals::{Discount, SaleLine, SaleTotal, TaxMode};

// =============================================================================
// Tenant
// =============================================================================

/// An organization whose data is isolated from every other tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,

    /// Display name.
    pub name: String,

    /// URL-safe unique handle (e.g. `acme-trading`).
    pub slug: String,

    /// Inactive tenants keep their data but are skipped by background jobs.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTenant {
    pub name: String,
    pub slug: String,
}

// =============================================================================
// Settings
// =============================================================================

/// Group used when a key has no dotted prefix.
pub const DEFAULT_SETTING_GROUP: &str = "general";

/// A typed setting value.
///
/// ## Storage Format
/// ```text
/// SettingValue::Integer(30)      ──► ("integer", "30")
/// SettingValue::Boolean(true)    ──► ("boolean", "true")
/// SettingValue::Decimal(8.25)    ──► ("decimal", "8.25")
/// SettingValue::Json({...})      ──► ("json",    "{...}")
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SettingValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Decimal(Decimal),
    Json(serde_json::Value),
}

impl SettingValue {
    /// Storage tag for the value type.
    pub fn type_tag(&self) -> &'static str {
        match self {
            SettingValue::Text(_) => "text",
            SettingValue::Integer(_) => "integer",
            SettingValue::Boolean(_) => "boolean",
            SettingValue::Decimal(_) => "decimal",
            SettingValue::Json(_) => "json",
        }
    }

    /// Encodes the value for the `value` column.
    pub fn encode(&self) -> String {
        match self {
            SettingValue::Text(s) => s.clone(),
            SettingValue::Integer(i) => i.to_string(),
            SettingValue::Boolean(b) => b.to_string(),
            SettingValue::Decimal(d) => d.to_string(),
            SettingValue::Json(v) => v.to_string(),
        }
    }

    /// Decodes a stored `(value_type, value)` pair.
    ///
    /// ```rust
    /// use keystone_core::types::SettingValue;
    ///
    /// let v = SettingValue::decode("sales.quotation_validity_days", "integer", "14").unwrap();
    /// assert_eq!(v.as_i64(), Some(14));
    /// assert!(SettingValue::decode("k", "integer", "fourteen").is_err());
    /// ```
    pub fn decode(key: &str, value_type: &str, raw: &str) -> CoreResult<Self> {
        let invalid = |reason: String| CoreError::InvalidSettingValue {
            key: key.to_string(),
            value_type: value_type.to_string(),
            reason,
        };

        match value_type {
            "text" => Ok(SettingValue::Text(raw.to_string())),
            "integer" => raw
                .trim()
                .parse::<i64>()
                .map(SettingValue::Integer)
                .map_err(|e| invalid(e.to_string())),
            "boolean" => match raw.trim() {
                "true" | "1" => Ok(SettingValue::Boolean(true)),
                "false" | "0" => Ok(SettingValue::Boolean(false)),
                other => Err(invalid(format!("'{}' is not a boolean", other))),
            },
            "decimal" => Decimal::from_str(raw.trim())
                .map(SettingValue::Decimal)
                .map_err(|e| invalid(e.to_string())),
            "json" => serde_json::from_str(raw)
                .map(SettingValue::Json)
                .map_err(|e| invalid(e.to_string())),
            other => Err(invalid(format!("unknown value type '{}'", other))),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; decimals with no fractional part also qualify.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SettingValue::Integer(i) => Some(*i),
            SettingValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            SettingValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Boolean(b) => Some(*b),
            SettingValue::Integer(i) => Some(*i != 0),
            SettingValue::Text(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SettingValue::Decimal(d) => Some(*d),
            SettingValue::Integer(i) => Some(Decimal::from(*i)),
            SettingValue::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }
}

/// One tenant setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub tenant_id: TenantId,
    pub key: String,
    pub group: String,
    pub value: SettingValue,
    pub updated_at: DateTime<Utc>,
}

impl Setting {
    /// Group a key falls into when none is given: the part before the
    /// first dot (`sales.tax_mode` → `sales`).
    pub fn default_group(key: &str) -> &str {
        match key.split_once('.') {
            Some((prefix, _)) if !prefix.is_empty() => prefix,
            _ => DEFAULT_SETTING_GROUP,
        }
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order lifecycle.
///
/// ```text
/// Placed ──► Invoiced
///    │
///    └────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Invoiced,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "placed",
            OrderStatus::Invoiced => "invoiced",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Placed, OrderStatus::Invoiced) | (OrderStatus::Placed, OrderStatus::Cancelled)
        )
    }

    /// Checks a transition, returning a typed error when it is not allowed.
    pub fn ensure_transition(&self, next: OrderStatus) -> CoreResult<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidStatusTransition {
                entity: "order".to_string(),
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A placed sales order with its rounded totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub tenant_id: TenantId,

    /// Human-readable number (e.g. `SO-20240115-1A2B3C`).
    pub order_number: String,

    pub customer_name: String,
    pub status: OrderStatus,

    /// Scale every amount on the order was rounded to.
    pub currency_scale: u32,
    pub tax_mode: TaxMode,

    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,

    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Rebuilds the totals value stored on the order.
    pub fn totals(&self) -> SaleTotal {
        SaleTotal {
            subtotal: self.subtotal,
            discount: self.discount,
            tax: self.tax,
            total: self.total,
            scale: self.currency_scale,
        }
    }
}

/// A stored order line with its computed amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub line_number: u32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Money,
    pub discount: Money,
    pub tax_rate: Rate,
    pub tax: Money,
    pub line_total: Money,
}

/// Input for placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    /// Filled in by the tenant context when left empty.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    pub customer_name: String,
    pub lines: Vec<SaleLine>,

    /// Discount applied to the whole order after line discounts.
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewOrder {
    /// Prices every line, then applies the order-level discount.
    ///
    /// ```rust
    /// use keystone_core::money::{Money, Rate};
    /// use keystone_core::totals::{Discount, SaleLine, TaxMode};
    /// use keystone_core::types::NewOrder;
    /// use rust_decimal::Decimal;
    ///
    /// let order = NewOrder {
    ///     tenant_id: None,
    ///     customer_name: "Globex".to_string(),
    ///     lines: vec![SaleLine {
    ///         description: "Support plan".to_string(),
    ///         quantity: Decimal::new(3, 0),
    ///         unit_price: Money::parse("19.99").unwrap(),
    ///         discount: Discount::None,
    ///         tax_rate: Rate::from_bps(2000),
    ///     }],
    ///     discount: Discount::None,
    ///     notes: None,
    /// };
    ///
    /// let priced = order.price(TaxMode::Exclusive, 2).unwrap();
    /// assert_eq!(priced.totals.total.to_fixed(2), "71.96");
    /// ```
    pub fn price(&self, mode: TaxMode, scale: u32) -> CoreResult<PricedOrder> {
        let mut lines = Vec::with_capacity(self.lines.len());
        let mut sum = SaleTotal::zero(scale);

        for line in &self.lines {
            let totals = line.totals(mode, scale)?;
            sum = sum.plus(&totals)?;
            lines.push(PricedLine {
                line: line.clone(),
                totals,
            });
        }

        Ok(PricedOrder {
            tax_mode: mode,
            totals: sum.with_order_discount(&self.discount, mode)?,
            lines,
        })
    }
}

impl BelongsToTenant for NewOrder {
    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn assign_tenant(&mut self, tenant: TenantId) {
        self.tenant_id = Some(tenant);
    }
}

/// A line together with its rounded totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub line: SaleLine,
    pub totals: SaleTotal,
}

/// The result of pricing a [`NewOrder`], ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedOrder {
    pub tax_mode: TaxMode,
    pub lines: Vec<PricedLine>,

    /// Sum of the line totals after the order-level discount.
    pub totals: SaleTotal,
}

// =============================================================================
// Quotations
// =============================================================================

/// Quotation lifecycle.
///
/// ```text
/// Draft ──► Sent ──► Accepted
///   │        │
///   └────────┴─────► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    #[default]
    Draft,
    Sent,
    Accepted,
    Expired,
}

impl QuotationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotationStatus::Draft => "draft",
            QuotationStatus::Sent => "sent",
            QuotationStatus::Accepted => "accepted",
            QuotationStatus::Expired => "expired",
        }
    }

    pub fn can_transition_to(&self, next: QuotationStatus) -> bool {
        use QuotationStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Accepted) | (Draft, Expired) | (Sent, Expired)
        )
    }
}

impl std::fmt::Display for QuotationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quotation, usually drafted from a placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quotation {
    pub id: String,
    pub tenant_id: TenantId,
    pub quotation_number: String,

    /// Order this quotation was drafted from, if any.
    pub order_id: Option<String>,

    pub customer_name: String,
    pub status: QuotationStatus,
    pub currency_scale: u32,
    pub subtotal: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
    pub valid_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Quotation {
    /// Whether the quotation is past its validity window at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == QuotationStatus::Expired || now > self.valid_until
    }
}

/// Input for creating a quotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuotation {
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    pub order_id: Option<String>,
    pub customer_name: String,
    pub totals: SaleTotal,
    pub valid_until: DateTime<Utc>,
}

impl NewQuotation {
    /// Drafts a quotation carrying the order's customer and totals.
    pub fn from_order(order: &Order, valid_until: DateTime<Utc>) -> Self {
        NewQuotation {
            tenant_id: Some(order.tenant_id.clone()),
            order_id: Some(order.id.clone()),
            customer_name: order.customer_name.clone(),
            totals: order.totals(),
            valid_until,
        }
    }
}

impl BelongsToTenant for NewQuotation {
    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn assign_tenant(&mut self, tenant: TenantId) {
        self.tenant_id = Some(tenant);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_order() -> Order {
        let now = Utc::now();
        Order {
            id: "order-1".to_string(),
            tenant_id: TenantId::generate(),
            order_number: "SO-1".to_string(),
            customer_name: "Globex".to_string(),
            status: OrderStatus::Placed,
            currency_scale: 2,
            tax_mode: TaxMode::Exclusive,
            subtotal: Money::parse("100.00").unwrap(),
            discount: Money::zero(),
            tax: Money::parse("10.00").unwrap(),
            total: Money::parse("110.00").unwrap(),
            notes: None,
            placed_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_setting_value_encode_decode() {
        let cases = vec![
            SettingValue::Text("EUR".to_string()),
            SettingValue::Integer(-4),
            SettingValue::Boolean(true),
            SettingValue::Decimal(Decimal::new(825, 2)),
            SettingValue::Json(serde_json::json!({"a": [1, 2]})),
        ];

        for value in cases {
            let decoded = SettingValue::decode("k", value.type_tag(), &value.encode()).unwrap();
            assert_eq!(decoded, value);
        }
    }

    #[test]
    fn test_setting_value_decode_errors() {
        let err = SettingValue::decode("feature.enabled", "boolean", "yes").unwrap_err();
        assert!(matches!(err, CoreError::InvalidSettingValue { .. }));
        assert!(SettingValue::decode("k", "blob", "x").is_err());
        assert!(SettingValue::decode("k", "json", "{").is_err());
    }

    #[test]
    fn test_setting_value_accessors() {
        assert_eq!(SettingValue::Text("12".into()).as_i64(), Some(12));
        assert_eq!(SettingValue::Decimal(Decimal::new(30, 0)).as_i64(), Some(30));
        assert_eq!(SettingValue::Decimal(Decimal::new(305, 1)).as_i64(), None);
        assert_eq!(SettingValue::Integer(0).as_bool(), Some(false));
        assert_eq!(SettingValue::Integer(7).as_decimal(), Some(Decimal::new(7, 0)));
        assert_eq!(SettingValue::Boolean(true).as_str(), None);
    }

    #[test]
    fn test_default_group() {
        assert_eq!(Setting::default_group("sales.tax_mode"), "sales");
        assert_eq!(Setting::default_group("timezone"), DEFAULT_SETTING_GROUP);
        assert_eq!(Setting::default_group(".odd"), DEFAULT_SETTING_GROUP);
    }

    #[test]
    fn test_order_status_transitions() {
        assert!(OrderStatus::Placed.ensure_transition(OrderStatus::Invoiced).is_ok());
        assert!(OrderStatus::Placed.can_transition_to(OrderStatus::Cancelled));
        assert!(matches!(
            OrderStatus::Invoiced.ensure_transition(OrderStatus::Placed),
            Err(CoreError::InvalidStatusTransition { .. })
        ));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Invoiced));
    }

    #[test]
    fn test_quotation_status_transitions() {
        assert!(QuotationStatus::Draft.can_transition_to(QuotationStatus::Sent));
        assert!(QuotationStatus::Sent.can_transition_to(QuotationStatus::Expired));
        assert!(!QuotationStatus::Accepted.can_transition_to(QuotationStatus::Draft));
        assert_eq!(QuotationStatus::default(), QuotationStatus::Draft);
    }

    #[test]
    fn test_quotation_from_order_copies_totals() {
        let order = sample_order();
        let valid_until = order.placed_at + Duration::days(30);
        let q = NewQuotation::from_order(&order, valid_until);

        assert_eq!(q.tenant_id.as_ref(), Some(&order.tenant_id));
        assert_eq!(q.order_id.as_deref(), Some("order-1"));
        assert_eq!(q.totals.total.to_fixed(2), "110.00");
        assert_eq!(q.valid_until, valid_until);
    }

    #[test]
    fn test_price_order_with_order_discount() {
        let order = NewOrder {
            tenant_id: None,
            customer_name: "Globex".to_string(),
            lines: vec![
                SaleLine {
                    description: "Licence".to_string(),
                    quantity: Decimal::new(2, 0),
                    unit_price: Money::parse("40.00").unwrap(),
                    discount: Discount::None,
                    tax_rate: Rate::from_bps(1000),
                },
                SaleLine {
                    description: "Setup".to_string(),
                    quantity: Decimal::ONE,
                    unit_price: Money::parse("20.00").unwrap(),
                    discount: Discount::None,
                    tax_rate: Rate::from_bps(1000),
                },
            ],
            discount: Discount::Percentage(Rate::from_bps(1000)),
            notes: None,
        };

        let priced = order.price(TaxMode::Exclusive, 2).unwrap();

        assert_eq!(priced.lines.len(), 2);
        assert_eq!(priced.lines[0].totals.total.to_fixed(2), "88.00");
        assert_eq!(priced.totals.subtotal.to_fixed(2), "100.00");
        assert_eq!(priced.totals.discount.to_fixed(2), "10.00");
        assert_eq!(priced.totals.tax.to_fixed(2), "9.00");
        assert_eq!(priced.totals.total.to_fixed(2), "99.00");
    }

    #[test]
    fn test_status_serde_is_snake_case() {
        let json = serde_json::to_string(&OrderStatus::Invoiced).unwrap();
        assert_eq!(json, "\"invoiced\"");
    }
}
