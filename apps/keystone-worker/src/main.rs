//! # Keystone Worker
//!
//! Background process that delivers domain events.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Keystone Worker                                  │
//! │                                                                         │
//! │  AppConfig ──► Database ──► SettingService (memory | redis cache)      │
//! │                   │                 │                                   │
//! │                   ▼                 ▼                                   │
//! │             EventDispatcher ──► CreateQuotationOnOrderPlaced           │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │               EventBus ──► event log                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```bash
//! RUST_LOG=keystone=debug keystone-worker
//! KEYSTONE_CONFIG=/etc/keystone/keystone.toml keystone-worker
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use keystone_core::DomainEvent;
use keystone_db::Database;
use keystone_services::{
    AppConfig, CacheBackend, CreateQuotationOnOrderPlaced, EventBus, EventDispatcher,
    MemoryCache, RedisCache, ServiceError, SettingService, SettingsCache, SqlSettingsStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Keystone worker...");

    let config = AppConfig::load(None).context("Failed to load configuration")?;
    info!(
        db_path = %config.database.path.display(),
        cache = %config.cache.backend,
        poll_ms = config.events.poll_interval_ms,
        "Configuration loaded"
    );

    let db = Database::new(config.db_config())
        .await
        .context("Failed to open database")?;
    let migrations = db.migration_status().await?;
    info!(
        applied = migrations.applied,
        total = migrations.total,
        pending = migrations.pending(),
        "Database ready"
    );

    let cache = build_cache(&config).await?;
    let bus = EventBus::default();

    let settings = Arc::new(
        SettingService::new(Arc::new(SqlSettingsStore::new(db.clone())), cache)
            .with_bus(bus.clone()),
    );

    let (mut dispatcher, handle) = EventDispatcher::new(db.clone(), bus.clone(), config.events.clone());
    dispatcher.register(Arc::new(CreateQuotationOnOrderPlaced::new(
        db.clone(),
        settings.clone(),
        config.sales.quotation_validity_days,
    )));

    let pending = db.outbox().count_pending().await?;
    info!(pending, "Outbox backlog");

    let log_task = tokio::spawn(log_events(bus.subscribe()));
    let dispatcher_task = tokio::spawn(dispatcher.run());

    shutdown_signal().await;

    handle.shutdown().await?;
    if let Err(e) = dispatcher_task.await {
        error!(?e, "Dispatcher task panicked");
    }
    log_task.abort();

    db.close().await;
    info!("Worker shutdown complete");
    Ok(())
}

/// Builds the configured settings cache.
///
/// Redis is optional infrastructure: when it cannot be reached the worker
/// falls back to a process-local cache.
async fn build_cache(config: &AppConfig) -> anyhow::Result<Arc<dyn SettingsCache>> {
    let ttl = config.cache.ttl();

    let cache: Arc<dyn SettingsCache> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new(ttl)),
        CacheBackend::Redis => {
            let url = config
                .cache
                .redis_url
                .as_deref()
                .context("cache.redis_url is required for the redis backend")?;

            let connected = async {
                let cache = RedisCache::connect(url, ttl).await?;
                cache.ping().await?;
                Ok::<_, ServiceError>(cache)
            }
            .await;

            match connected {
                Ok(cache) => Arc::new(cache),
                Err(e) => {
                    warn!(?e, "Failed to connect to Redis, continuing with in-memory cache");
                    Arc::new(MemoryCache::new(ttl))
                }
            }
        }
    };

    Ok(cache)
}

/// Logs every delivered event.
async fn log_events(mut rx: broadcast::Receiver<DomainEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => debug!(
                event = event.name(),
                tenant_id = %event.tenant_id(),
                aggregate_id = event.aggregate_id(),
                "Event delivered"
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(?e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
