//! # keystone-services: Application Services for Keystone ERP
//!
//! Composes the tenant-scoped repositories of `keystone-db` with a settings
//! cache, domain event dispatch and the order workflow.
//!
//! ## Module Organization
//!
//! - [`config`] - TOML + environment configuration
//! - [`cache`] - Tenant-qualified cache keys and cache backends
//! - [`settings`] - Read-through settings service
//! - [`events`] - Listener trait, in-process bus, outbox dispatcher
//! - [`listeners`] - Built-in listeners
//! - [`orders`] - Order placement and invoicing
//! - [`error`] - Service error types
//!
//! ## Wiring
//!
//! ```rust,ignore
//! let db = Database::new(config.db_config()).await?;
//! let bus = EventBus::default();
//! let settings = Arc::new(
//!     SettingService::new(
//!         Arc::new(SqlSettingsStore::new(db.clone())),
//!         Arc::new(MemoryCache::new(config.cache.ttl())),
//!     )
//!     .with_bus(bus.clone()),
//! );
//!
//! let (mut dispatcher, handle) = EventDispatcher::new(db.clone(), bus, config.events.clone());
//! dispatcher.register(Arc::new(CreateQuotationOnOrderPlaced::new(
//!     db.clone(),
//!     settings.clone(),
//!     config.sales.quotation_validity_days,
//! )));
//! tokio::spawn(dispatcher.run());
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod listeners;
pub mod orders;
pub mod settings;

pub use cache::{CacheKey, MemoryCache, RedisCache, SettingsCache};
pub use config::{AppConfig, CacheBackend, CacheSettings, EventSettings, SalesSettings};
pub use error::{ConfigError, ConfigResult, ServiceError, ServiceResult};
pub use events::{DispatchReport, DispatcherHandle, EventBus, EventDispatcher, EventListener};
pub use listeners::CreateQuotationOnOrderPlaced;
pub use orders::OrderService;
pub use settings::{SettingService, SettingsStore, SqlSettingsStore};
