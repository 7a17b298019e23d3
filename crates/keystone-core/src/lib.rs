//! # keystone-core: Pure Business Logic for Keystone ERP
//!
//! This crate holds the parts of the ERP that are pure computation: decimal
//! money, sale totals, the tenant context and the domain events every module
//! emits. Nothing in here touches a database, a cache or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Keystone ERP Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 keystone-worker (binary)                        │   │
//! │  │        config ──► database ──► dispatcher ──► listeners         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 keystone-services                               │   │
//! │  │      SettingService (cache) · OrderService · EventDispatcher    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ keystone-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │   │
//! │  │   │  money   │  │  totals  │  │  tenant  │  │    events    │   │   │
//! │  │   │  Money   │  │SaleTotal │  │ TenantId │  │ DomainEvent  │   │   │
//! │  │   │  Rate    │  │ Discount │  │ Context  │  │ OrderPlaced  │   │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 keystone-db (Database Layer)                    │   │
//! │  │       TenantScope, repositories, migrations, event outbox       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` and `Rate` over fixed-point decimals
//! - [`totals`] - `SaleTotal::calculate` (subtotal → discount → tax → total)
//! - [`tenant`] - `TenantId`, `TenantContext`, `BelongsToTenant`
//! - [`types`] - Domain entities (Tenant, Setting, Order, Quotation)
//! - [`events`] - Domain events dispatched through the outbox
//! - [`validation`] - Business rule validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use keystone_core::money::{Money, Rate};
//! use keystone_core::totals::{Discount, SaleTotal, TaxMode};
//!
//! let subtotal = Money::parse("100.00").unwrap();
//! let discount = Discount::Percentage(Rate::from_percent_str("10").unwrap());
//! let tax_rate = Rate::from_percent_str("8.25").unwrap();
//!
//! let totals = SaleTotal::calculate(subtotal, &discount, tax_rate, TaxMode::Exclusive, 2).unwrap();
//!
//! assert_eq!(totals.discount.to_fixed(2), "10.00");
//! assert_eq!(totals.tax.to_fixed(2), "7.43");
//! assert_eq!(totals.total.to_fixed(2), "97.43");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod money;
pub mod tenant;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use events::DomainEvent;
pub use money::{Money, Rate};
pub use tenant::{BelongsToTenant, TenantContext, TenantId};
pub use totals::{Discount, SaleLine, SaleTotal, TaxMode};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of decimal places used for currency amounts unless a tenant
/// overrides it through the `sales.currency_scale` setting.
pub const DEFAULT_SCALE: u32 = 2;

/// Upper bound for any configured scale.
pub const MAX_SCALE: u32 = 10;

/// Maximum number of lines accepted on a single order.
pub const MAX_ORDER_LINES: usize = 500;

/// Default validity window for quotations created from orders.
pub const DEFAULT_QUOTATION_VALIDITY_DAYS: i64 = 30;
