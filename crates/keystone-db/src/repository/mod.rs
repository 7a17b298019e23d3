//! # Repository Module
//!
//! Database repository implementations for Keystone ERP.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Scoped Repositories                                  │
//! │                                                                         │
//! │  Service                                                               │
//! │       │  db.orders(TenantScope::current(&ctx)?)                        │
//! │       ▼                                                                 │
//! │  OrderRepository { pool, scope }                                       │
//! │  ├── reads:  ScopedQuery  → WHERE tenant_id = ? AND …                 │
//! │  ├── writes: scope.stamp(&mut input) → tenant_id filled / checked     │
//! │  └── events: insert_event(&mut tx, …) in the same transaction         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TenantRepository`](tenant::TenantRepository) - Tenant registry (unscoped)
//! - [`SettingRepository`](setting::SettingRepository) - Per-tenant settings
//! - [`OrderRepository`](order::OrderRepository) - Orders and order lines
//! - [`QuotationRepository`](quotation::QuotationRepository) - Quotations
//! - [`EventOutboxRepository`](outbox::EventOutboxRepository) - Domain event outbox

pub mod order;
pub mod outbox;
pub mod quotation;
pub mod setting;
pub mod tenant;
