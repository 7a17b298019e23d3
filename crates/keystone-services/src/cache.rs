//! # Settings Cache
//!
//! Cache backends for tenant settings.
//!
//! ## Key Layout
//! ```text
//! settings:{tenant_id}:key:{setting_key}      one setting
//! settings:{tenant_id}:group:{group}          every setting of a group
//! ```
//!
//! Every key embeds the tenant, and a [`CacheKey`] can only be built from
//! a [`TenantId`], so two tenants never share an entry.
//!
//! Values are opaque strings (JSON produced by the
//! [`SettingService`](crate::SettingService)) so the in-process map and
//! Redis behave the same way.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info};

use keystone_core::TenantId;

use crate::error::ServiceResult;

// =============================================================================
// Cache Keys
// =============================================================================

/// A tenant-qualified cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a single setting.
    pub fn setting(tenant: &TenantId, key: &str) -> Self {
        CacheKey(format!("settings:{}:key:{}", tenant, key))
    }

    /// Key for all settings of a group.
    pub fn group(tenant: &TenantId, group: &str) -> Self {
        CacheKey(format!("settings:{}:group:{}", tenant, group))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Cache Trait
// =============================================================================

/// Storage for cached setting payloads.
#[async_trait]
pub trait SettingsCache: Send + Sync {
    /// Returns the payload, or `None` on a miss or an expired entry.
    async fn get(&self, key: &CacheKey) -> ServiceResult<Option<String>>;

    async fn put(&self, key: &CacheKey, payload: String) -> ServiceResult<()>;

    /// Removes an entry. Removing a missing entry is not an error.
    async fn forget(&self, key: &CacheKey) -> ServiceResult<()>;
}

// =============================================================================
// In-memory Backend
// =============================================================================

struct MemoryEntry {
    payload: String,
    expires_at: Option<Instant>,
}

/// Process-local cache with an optional TTL.
pub struct MemoryCache {
    entries: RwLock<HashMap<CacheKey, MemoryEntry>>,
    ttl: Option<Duration>,
}

impl MemoryCache {
    /// Creates a cache; `ttl = None` keeps entries until they are forgotten.
    pub fn new(ttl: Option<Duration>) -> Self {
        MemoryCache {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl SettingsCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> ServiceResult<Option<String>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at.map_or(true, |at| at > now) => {
                    return Ok(Some(entry.payload.clone()));
                }
                Some(_) => {}
            }
        }

        // Expired: drop it so the map does not grow without bound
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.expires_at.is_some_and(|at| at <= now))
        {
            entries.remove(key);
            debug!(key = %key, "Expired cache entry evicted");
        }
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, payload: String) -> ServiceResult<()> {
        let expires_at = self.ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.clone(), MemoryEntry { payload, expires_at });
        Ok(())
    }

    async fn forget(&self, key: &CacheKey) -> ServiceResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

// =============================================================================
// Redis Backend
// =============================================================================

/// Cache shared between processes through Redis.
///
/// `ConnectionManager` reconnects on its own; it is cloned per call since
/// commands need `&mut`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    ttl: Option<Duration>,
}

impl RedisCache {
    /// Connects to `url` (`redis://host:port[/db]`).
    pub async fn connect(url: &str, ttl: Option<Duration>) -> ServiceResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!(ttl_secs = ttl.map(|t| t.as_secs()), "Connected to Redis settings cache");
        Ok(RedisCache { conn, ttl })
    }

    /// Round-trips a PING.
    pub async fn ping(&self) -> ServiceResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsCache for RedisCache {
    async fn get(&self, key: &CacheKey) -> ServiceResult<Option<String>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(key.as_str()).await?;
        Ok(payload)
    }

    async fn put(&self, key: &CacheKey, payload: String) -> ServiceResult<()> {
        let mut conn = self.conn.clone();
        match self.ttl {
            // SETEX rejects 0, so sub-second TTLs round up
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                let _: () = conn.set_ex(key.as_str(), payload, secs).await?;
            }
            None => {
                let _: () = conn.set(key.as_str(), payload).await?;
            }
        }
        Ok(())
    }

    async fn forget(&self, key: &CacheKey) -> ServiceResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key.as_str()).await?;
        Ok(())
    }
}
