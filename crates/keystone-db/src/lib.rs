//! # keystone-db: Database Layer for Keystone ERP
//!
//! This crate provides database access for Keystone ERP. It uses SQLite
//! with sqlx for async operations, and owns the tenant predicate: no query
//! against a tenant-owned table is built anywhere else.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Keystone Data Flow                               │
//! │                                                                         │
//! │  OrderService::place_order(&ctx, input)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   keystone-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  + TenantScope│    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SettingRepo   │    │ 001_initial_ │  │   │
//! │  │   │ Connection    │    │ OrderRepo     │    │ schema.sql   │  │   │
//! │  │   │ Management    │    │ OutboxRepo    │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`scope`] - Tenant predicate and scoped queries
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keystone_core::TenantContext;
//! use keystone_db::{Database, DbConfig, TenantScope};
//!
//! let db = Database::new(DbConfig::new("keystone.db")).await?;
//!
//! let scope = TenantScope::current(&ctx)?;
//! let mode = db.settings(scope).find("sales.tax_mode").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod scope;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationStatus;
pub use pool::{Database, DbConfig};
pub use scope::{ScopedQuery, TenantScope};

// Repository re-exports for convenience
pub use repository::order::OrderRepository;
pub use repository::outbox::{EventOutboxRepository, OutboxEntry};
pub use repository::quotation::QuotationRepository;
pub use repository::setting::{SettingChange, SettingRepository};
pub use repository::tenant::TenantRepository;
