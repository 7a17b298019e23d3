//! # Tenant Settings
//!
//! Read-through cached access to per-tenant settings.
//!
//! ## Read Path
//! ```text
//! get(&ctx, "sales.tax_mode")
//!      │
//!      ▼
//! ctx.require() ──► TenantNotBound when no tenant is bound
//!      │
//!      ▼
//! cache.get(settings:{tenant}:key:sales.tax_mode)
//!      │ hit ──────────────────────────────► value
//!      │ miss / cache error
//!      ▼
//! store.find(tenant, key)
//!      │ None ─────────────────────────────► None (not cached)
//!      ▼
//! cache.put(...) ──────────────────────────► value
//!   skipped if a write bumped the key's generation
//!   while the store read was in flight
//! ```
//!
//! ## Write Path
//! ```text
//! set(&ctx, key, value)
//!      │
//!      ▼
//! store.upsert ──► SettingChange { current, previous }
//!      │
//!      ▼
//! bump generations, then
//! forget key entry
//! forget group entry of current.group
//! forget group entry of previous.group (if the key moved)
//!      │
//!      ▼
//! EventBus ◄── SettingUpdated
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use keystone_core::{CoreError, DomainEvent, Setting, SettingValue, TenantContext, TenantId};
use keystone_db::{Database, SettingChange, TenantScope};

use crate::cache::{CacheKey, SettingsCache};
use crate::error::{ServiceError, ServiceResult};
use crate::events::EventBus;

// =============================================================================
// Store
// =============================================================================

/// Durable storage for settings, keyed by tenant.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn find(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>>;

    async fn find_group(&self, tenant: &TenantId, group: &str) -> ServiceResult<Vec<Setting>>;

    async fn upsert(
        &self,
        tenant: &TenantId,
        key: &str,
        group: &str,
        value: SettingValue,
    ) -> ServiceResult<SettingChange>;

    async fn remove(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>>;
}

/// [`SettingsStore`] over the `settings` table.
#[derive(Clone)]
pub struct SqlSettingsStore {
    db: Database,
}

impl SqlSettingsStore {
    pub fn new(db: Database) -> Self {
        SqlSettingsStore { db }
    }
}

#[async_trait]
impl SettingsStore for SqlSettingsStore {
    async fn find(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>> {
        Ok(self.db.settings(TenantScope::tenant(tenant.clone())).find(key).await?)
    }

    async fn find_group(&self, tenant: &TenantId, group: &str) -> ServiceResult<Vec<Setting>> {
        Ok(self
            .db
            .settings(TenantScope::tenant(tenant.clone()))
            .find_group(group)
            .await?)
    }

    async fn upsert(
        &self,
        tenant: &TenantId,
        key: &str,
        group: &str,
        value: SettingValue,
    ) -> ServiceResult<SettingChange> {
        Ok(self
            .db
            .settings(TenantScope::tenant(tenant.clone()))
            .upsert(key, group, value)
            .await?)
    }

    async fn remove(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>> {
        Ok(self.db.settings(TenantScope::tenant(tenant.clone())).remove(key).await?)
    }
}

// =============================================================================
// Service
// =============================================================================

/// Cached settings access for the tenant bound to a [`TenantContext`].
pub struct SettingService {
    store: Arc<dyn SettingsStore>,
    cache: Arc<dyn SettingsCache>,
    bus: Option<EventBus>,
    /// Write counter per cache entry. A read only populates the cache if no
    /// write touched the entry since the read started.
    generations: Mutex<HashMap<CacheKey, u64>>,
}

impl SettingService {
    pub fn new(store: Arc<dyn SettingsStore>, cache: Arc<dyn SettingsCache>) -> Self {
        SettingService {
            store,
            cache,
            bus: None,
            generations: Mutex::new(HashMap::new()),
        }
    }

    /// Publishes a `SettingUpdated` event on every successful write.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns the full setting row.
    pub async fn get_setting(&self, ctx: &TenantContext, key: &str) -> ServiceResult<Option<Setting>> {
        let tenant = ctx.require()?;
        let cache_key = CacheKey::setting(&tenant, key);

        if let Some(setting) = self.cached::<Setting>(&cache_key).await {
            return Ok(Some(setting));
        }

        let generation = self.generation(&cache_key);
        let found = self.store.find(&tenant, key).await?;
        if let Some(ref setting) = found {
            self.populate(&cache_key, generation, setting).await;
        }
        Ok(found)
    }

    /// Returns the value of `key`, or `None` when the tenant has not set it.
    pub async fn get(&self, ctx: &TenantContext, key: &str) -> ServiceResult<Option<SettingValue>> {
        Ok(self.get_setting(ctx, key).await?.map(|s| s.value))
    }

    pub async fn get_or(
        &self,
        ctx: &TenantContext,
        key: &str,
        default: SettingValue,
    ) -> ServiceResult<SettingValue> {
        Ok(self.get(ctx, key).await?.unwrap_or(default))
    }

    pub async fn get_bool(&self, ctx: &TenantContext, key: &str, default: bool) -> ServiceResult<bool> {
        match self.get(ctx, key).await? {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| wrong_type(key, &value, "boolean")),
        }
    }

    pub async fn get_i64(&self, ctx: &TenantContext, key: &str, default: i64) -> ServiceResult<i64> {
        match self.get(ctx, key).await? {
            None => Ok(default),
            Some(value) => value
                .as_i64()
                .ok_or_else(|| wrong_type(key, &value, "integer")),
        }
    }

    pub async fn get_decimal(
        &self,
        ctx: &TenantContext,
        key: &str,
        default: Decimal,
    ) -> ServiceResult<Decimal> {
        match self.get(ctx, key).await? {
            None => Ok(default),
            Some(value) => value
                .as_decimal()
                .ok_or_else(|| wrong_type(key, &value, "decimal")),
        }
    }

    pub async fn get_text(&self, ctx: &TenantContext, key: &str) -> ServiceResult<Option<String>> {
        match self.get(ctx, key).await? {
            None => Ok(None),
            Some(SettingValue::Text(s)) => Ok(Some(s)),
            Some(value) => Err(wrong_type(key, &value, "text")),
        }
    }

    /// Returns every setting of `group`, ordered by key.
    pub async fn get_group(&self, ctx: &TenantContext, group: &str) -> ServiceResult<Vec<Setting>> {
        let tenant = ctx.require()?;
        let cache_key = CacheKey::group(&tenant, group);

        if let Some(settings) = self.cached::<Vec<Setting>>(&cache_key).await {
            return Ok(settings);
        }

        let generation = self.generation(&cache_key);
        let settings = self.store.find_group(&tenant, group).await?;
        if !settings.is_empty() {
            self.populate(&cache_key, generation, &settings).await;
        }
        Ok(settings)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Writes `key` into the group derived from its prefix.
    pub async fn set(&self, ctx: &TenantContext, key: &str, value: SettingValue) -> ServiceResult<Setting> {
        let group = Setting::default_group(key).to_string();
        self.set_in_group(ctx, key, &group, value).await
    }

    /// Writes `key` into an explicit group. Last write wins.
    pub async fn set_in_group(
        &self,
        ctx: &TenantContext,
        key: &str,
        group: &str,
        value: SettingValue,
    ) -> ServiceResult<Setting> {
        let tenant = ctx.require()?;
        let change = self.store.upsert(&tenant, key, group, value).await?;

        let mut stale = vec![
            CacheKey::setting(&tenant, key),
            CacheKey::group(&tenant, &change.current.group),
        ];
        if let Some(previous) = change.previous.as_ref() {
            if previous.group != change.current.group {
                stale.push(CacheKey::group(&tenant, &previous.group));
            }
        }
        self.bump(&stale);
        self.invalidate(&stale).await?;

        if let Some(bus) = &self.bus {
            bus.publish(DomainEvent::setting_updated(&change.current));
        }

        debug!(tenant_id = %tenant, key = %key, group = %group, "Setting written");
        Ok(change.current)
    }

    /// Deletes `key`, returning the removed setting.
    pub async fn forget(&self, ctx: &TenantContext, key: &str) -> ServiceResult<Option<Setting>> {
        let tenant = ctx.require()?;
        let removed = self.store.remove(&tenant, key).await?;

        if let Some(ref setting) = removed {
            let stale = [
                CacheKey::setting(&tenant, key),
                CacheKey::group(&tenant, &setting.group),
            ];
            self.bump(&stale);
            self.invalidate(&stale).await?;
        }
        Ok(removed)
    }

    // =========================================================================
    // Cache helpers
    // =========================================================================

    /// Reads and decodes a cache entry. Any failure counts as a miss.
    async fn cached<T: serde::de::DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    debug!(key = %key, "Settings cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Undecodable cache entry, dropping it");
                    if let Err(e) = self.cache.forget(key).await {
                        warn!(key = %key, error = %e, "Failed to drop cache entry");
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Settings cache read failed, using store");
                None
            }
        }
    }

    /// Caches a value read from the store at `generation`.
    ///
    /// A write that lands between the check and the put bumps the generation
    /// before it invalidates, so the re-check after the put drops the entry.
    async fn populate<T: serde::Serialize + ?Sized>(&self, key: &CacheKey, generation: u64, value: &T) {
        if self.generation(key) != generation {
            debug!(key = %key, "Setting changed during read, not caching");
            return;
        }
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode setting for cache");
                return;
            }
        };
        if let Err(e) = self.cache.put(key, payload).await {
            warn!(key = %key, error = %e, "Settings cache write failed");
            return;
        }
        if self.generation(key) != generation {
            if let Err(e) = self.cache.forget(key).await {
                warn!(key = %key, error = %e, "Failed to drop stale cache entry");
            }
        }
    }

    fn generation(&self, key: &CacheKey) -> u64 {
        let generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        generations.get(key).copied().unwrap_or(0)
    }

    fn bump(&self, keys: &[CacheKey]) {
        let mut generations = self.generations.lock().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            let entry = generations.entry(key.clone()).or_insert(0);
            *entry = entry.wrapping_add(1);
        }
    }

    /// Forgets every key, reporting the first failure after trying them all.
    async fn invalidate(&self, keys: &[CacheKey]) -> ServiceResult<()> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.cache.forget(key).await {
                error!(key = %key, error = %e, "Settings cache invalidation failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn wrong_type(key: &str, value: &SettingValue, expected: &str) -> ServiceError {
    CoreError::InvalidSettingValue {
        key: key.to_string(),
        value_type: value.type_tag().to_string(),
        reason: format!("expected {}", expected),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use chrono::Utc;
    use keystone_core::NewTenant;
    use keystone_db::DbConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Map-backed store that counts reads.
    #[derive(Default)]
    struct CountingStore {
        rows: Mutex<HashMap<(TenantId, String), Setting>>,
        finds: AtomicUsize,
        group_finds: AtomicUsize,
    }

    impl CountingStore {
        fn finds(&self) -> usize {
            self.finds.load(Ordering::SeqCst)
        }

        fn group_finds(&self) -> usize {
            self.group_finds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SettingsStore for CountingStore {
        async fn find(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>> {
            self.finds.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(&(tenant.clone(), key.to_string())).cloned())
        }

        async fn find_group(&self, tenant: &TenantId, group: &str) -> ServiceResult<Vec<Setting>> {
            self.group_finds.fetch_add(1, Ordering::SeqCst);
            let rows = self.rows.lock().unwrap();
            let mut found: Vec<Setting> = rows
                .values()
                .filter(|s| &s.tenant_id == tenant && s.group == group)
                .cloned()
                .collect();
            found.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(found)
        }

        async fn upsert(
            &self,
            tenant: &TenantId,
            key: &str,
            group: &str,
            value: SettingValue,
        ) -> ServiceResult<SettingChange> {
            let current = Setting {
                tenant_id: tenant.clone(),
                key: key.to_string(),
                group: group.to_string(),
                value,
                updated_at: Utc::now(),
            };
            let previous = self
                .rows
                .lock()
                .unwrap()
                .insert((tenant.clone(), key.to_string()), current.clone());
            Ok(SettingChange { current, previous })
        }

        async fn remove(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>> {
            Ok(self.rows.lock().unwrap().remove(&(tenant.clone(), key.to_string())))
        }
    }

    /// Store whose reads can be held after they have fetched their row.
    #[derive(Default)]
    struct GatedStore {
        inner: CountingStore,
        hold: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl SettingsStore for GatedStore {
        async fn find(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>> {
            let found = self.inner.find(tenant, key).await?;
            if self.hold.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(found)
        }

        async fn find_group(&self, tenant: &TenantId, group: &str) -> ServiceResult<Vec<Setting>> {
            let found = self.inner.find_group(tenant, group).await?;
            if self.hold.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(found)
        }

        async fn upsert(
            &self,
            tenant: &TenantId,
            key: &str,
            group: &str,
            value: SettingValue,
        ) -> ServiceResult<SettingChange> {
            self.inner.upsert(tenant, key, group, value).await
        }

        async fn remove(&self, tenant: &TenantId, key: &str) -> ServiceResult<Option<Setting>> {
            self.inner.remove(tenant, key).await
        }
    }

    /// Cache whose every operation fails.
    struct BrokenCache;

    #[async_trait]
    impl SettingsCache for BrokenCache {
        async fn get(&self, _key: &CacheKey) -> ServiceResult<Option<String>> {
            Err(ServiceError::Cache("connection refused".into()))
        }

        async fn put(&self, _key: &CacheKey, _payload: String) -> ServiceResult<()> {
            Err(ServiceError::Cache("connection refused".into()))
        }

        async fn forget(&self, _key: &CacheKey) -> ServiceResult<()> {
            Err(ServiceError::Cache("connection refused".into()))
        }
    }

    fn service() -> (SettingService, Arc<CountingStore>, Arc<MemoryCache>) {
        let store = Arc::new(CountingStore::default());
        let cache = Arc::new(MemoryCache::default());
        let service = SettingService::new(store.clone(), cache.clone());
        (service, store, cache)
    }

    #[tokio::test]
    async fn test_second_read_served_from_cache() {
        let (service, store, _) = service();
        let ctx = TenantContext::for_tenant(TenantId::generate());

        service
            .set(&ctx, "sales.tax_mode", SettingValue::Text("inclusive".into()))
            .await
            .unwrap();

        let first = service.get(&ctx, "sales.tax_mode").await.unwrap();
        let second = service.get(&ctx, "sales.tax_mode").await.unwrap();

        assert_eq!(first, Some(SettingValue::Text("inclusive".into())));
        assert_eq!(first, second);
        assert_eq!(store.finds(), 1);
    }

    #[tokio::test]
    async fn test_missing_value_not_cached() {
        let (service, store, cache) = service();
        let ctx = TenantContext::for_tenant(TenantId::generate());

        assert_eq!(service.get(&ctx, "general.timezone").await.unwrap(), None);
        assert_eq!(service.get(&ctx, "general.timezone").await.unwrap(), None);

        assert_eq!(store.finds(), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_write_invalidates_key_entry() {
        let (service, _, _) = service();
        let ctx = TenantContext::for_tenant(TenantId::generate());

        service
            .set(&ctx, "sales.currency_scale", SettingValue::Integer(2))
            .await
            .unwrap();
        assert_eq!(service.get_i64(&ctx, "sales.currency_scale", 0).await.unwrap(), 2);

        service
            .set(&ctx, "sales.currency_scale", SettingValue::Integer(3))
            .await
            .unwrap();
        assert_eq!(service.get_i64(&ctx, "sales.currency_scale", 0).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_group_entries_follow_a_moved_key() {
        let (service, store, _) = service();
        let ctx = TenantContext::for_tenant(TenantId::generate());

        service
            .set_in_group(&ctx, "timezone", "sales", SettingValue::Text("UTC".into()))
            .await
            .unwrap();

        assert_eq!(service.get_group(&ctx, "sales").await.unwrap().len(), 1);
        assert_eq!(service.get_group(&ctx, "sales").await.unwrap().len(), 1);
        assert_eq!(store.group_finds(), 1);

        // Moving the key must refresh both the old and the new group
        service
            .set_in_group(&ctx, "timezone", "general", SettingValue::Text("UTC".into()))
            .await
            .unwrap();

        assert!(service.get_group(&ctx, "sales").await.unwrap().is_empty());
        let general = service.get_group(&ctx, "general").await.unwrap();
        assert_eq!(general.len(), 1);
        assert_eq!(general[0].key, "timezone");
    }

    #[tokio::test]
    async fn test_read_racing_a_write_does_not_cache_old_value() {
        let store = Arc::new(GatedStore::default());
        let service = SettingService::new(store.clone(), Arc::new(MemoryCache::default()));
        let ctx = TenantContext::for_tenant(TenantId::generate());

        service
            .set(&ctx, "sales.tax_mode", SettingValue::Text("exclusive".into()))
            .await
            .unwrap();
        store.hold.store(true, Ordering::SeqCst);

        let (read, ()) = tokio::join!(service.get(&ctx, "sales.tax_mode"), async {
            // The reader holds the old row; the write lands before it resumes
            store.entered.notified().await;
            store.hold.store(false, Ordering::SeqCst);
            service
                .set(&ctx, "sales.tax_mode", SettingValue::Text("inclusive".into()))
                .await
                .unwrap();
            store.release.notify_one();
        });
        assert_eq!(read.unwrap(), Some(SettingValue::Text("exclusive".into())));

        assert_eq!(
            service.get_text(&ctx, "sales.tax_mode").await.unwrap().as_deref(),
            Some("inclusive")
        );
        assert_eq!(
            service.get_text(&ctx, "sales.tax_mode").await.unwrap().as_deref(),
            Some("inclusive")
        );

        // Same for group reads
        store.hold.store(true, Ordering::SeqCst);
        let (group, ()) = tokio::join!(service.get_group(&ctx, "sales"), async {
            store.entered.notified().await;
            store.hold.store(false, Ordering::SeqCst);
            service
                .set(&ctx, "sales.tax_mode", SettingValue::Text("exclusive".into()))
                .await
                .unwrap();
            store.release.notify_one();
        });
        assert_eq!(group.unwrap()[0].value, SettingValue::Text("inclusive".into()));

        let group = service.get_group(&ctx, "sales").await.unwrap();
        assert_eq!(group[0].value, SettingValue::Text("exclusive".into()));
    }

    #[tokio::test]
    async fn test_forget_invalidates() {
        let (service, _, cache) = service();
        let tenant = TenantId::generate();
        let ctx = TenantContext::for_tenant(tenant.clone());

        service
            .set(&ctx, "general.timezone", SettingValue::Text("UTC".into()))
            .await
            .unwrap();
        service.get(&ctx, "general.timezone").await.unwrap();
        assert!(cache.contains(&CacheKey::setting(&tenant, "general.timezone")).await);

        let removed = service.forget(&ctx, "general.timezone").await.unwrap();
        assert!(removed.is_some());
        assert!(!cache.contains(&CacheKey::setting(&tenant, "general.timezone")).await);
        assert_eq!(service.get(&ctx, "general.timezone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_tenants_do_not_share_entries() {
        let (service, _, _) = service();
        let acme = TenantContext::for_tenant(TenantId::generate());
        let globex = TenantContext::for_tenant(TenantId::generate());

        service
            .set(&acme, "sales.tax_mode", SettingValue::Text("exclusive".into()))
            .await
            .unwrap();
        service
            .set(&globex, "sales.tax_mode", SettingValue::Text("inclusive".into()))
            .await
            .unwrap();

        assert_eq!(
            service.get_text(&acme, "sales.tax_mode").await.unwrap().as_deref(),
            Some("exclusive")
        );
        assert_eq!(
            service.get_text(&globex, "sales.tax_mode").await.unwrap().as_deref(),
            Some("inclusive")
        );
    }

    #[tokio::test]
    async fn test_unbound_context_fails_closed() {
        let (service, store, _) = service();
        let ctx = TenantContext::new();

        let err = service.get(&ctx, "sales.tax_mode").await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::TenantNotBound)));
        assert_eq!(store.finds(), 0);
    }

    #[tokio::test]
    async fn test_cache_failure_falls_back_to_store() {
        let store = Arc::new(CountingStore::default());
        let service = SettingService::new(store.clone(), Arc::new(BrokenCache));
        let tenant = TenantId::generate();
        let ctx = TenantContext::for_tenant(tenant.clone());

        store
            .upsert(&tenant, "sales.quotation_validity_days", "sales", SettingValue::Integer(14))
            .await
            .unwrap();

        let days = service
            .get_i64(&ctx, "sales.quotation_validity_days", 30)
            .await
            .unwrap();
        assert_eq!(days, 14);
        assert_eq!(store.finds(), 1);
    }

    #[tokio::test]
    async fn test_failed_invalidation_is_reported() {
        let store = Arc::new(CountingStore::default());
        let service = SettingService::new(store.clone(), Arc::new(BrokenCache));
        let tenant = TenantId::generate();
        let ctx = TenantContext::for_tenant(tenant.clone());

        let err = service
            .set(&ctx, "general.timezone", SettingValue::Text("UTC".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Cache(_)));

        // The write itself went through
        assert!(store.find(&tenant, "general.timezone").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_typed_getters() {
        let (service, _, _) = service();
        let ctx = TenantContext::for_tenant(TenantId::generate());

        assert!(service.get_bool(&ctx, "general.maintenance", true).await.unwrap());
        assert_eq!(
            service.get_decimal(&ctx, "sales.rounding", Decimal::new(5, 2)).await.unwrap(),
            Decimal::new(5, 2)
        );

        service
            .set(&ctx, "general.maintenance", SettingValue::Text("soon".into()))
            .await
            .unwrap();
        let err = service
            .get_bool(&ctx, "general.maintenance", false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InvalidSettingValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_publishes_setting_updated() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let service = SettingService::new(
            Arc::new(CountingStore::default()),
            Arc::new(MemoryCache::default()),
        )
        .with_bus(bus);
        let tenant = TenantId::generate();
        let ctx = TenantContext::for_tenant(tenant.clone());

        service
            .set(&ctx, "sales.tax_mode", SettingValue::Text("inclusive".into()))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "setting.updated");
        assert_eq!(event.tenant_id(), &tenant);
    }

    #[tokio::test]
    async fn test_sql_store_round_trip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(NewTenant {
                name: "Acme".into(),
                slug: "acme".into(),
            })
            .await
            .unwrap();

        let service = SettingService::new(
            Arc::new(SqlSettingsStore::new(db.clone())),
            Arc::new(MemoryCache::default()),
        );
        let ctx = TenantContext::for_tenant(tenant.id.clone());

        service
            .set(&ctx, "sales.quotation_validity_days", SettingValue::Integer(10))
            .await
            .unwrap();
        assert_eq!(
            service
                .get_i64(&ctx, "sales.quotation_validity_days", 30)
                .await
                .unwrap(),
            10
        );

        let group = service.get_group(&ctx, "sales").await.unwrap();
        assert_eq!(group.len(), 1);
        assert_eq!(group[0].tenant_id, tenant.id);
    }
}
