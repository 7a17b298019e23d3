//! # Setting Repository
//!
//! Per-tenant key/value settings. Every read and write is confined to the
//! repository's [`TenantScope`].
//!
//! ## Storage
//! ```text
//! settings
//! ├── tenant_id       ─┐ UNIQUE: one row per key per tenant
//! ├── setting_key     ─┘
//! ├── setting_group      indexed with tenant_id for group reads
//! ├── value_type         text | integer | boolean | decimal | json
//! └── value              encoded string
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::scope::{ScopedQuery, TenantScope};
use keystone_core::validation::{validate_setting_group, validate_setting_key};
use keystone_core::{Setting, SettingValue, TenantId};

const SETTING_COLUMNS: &str =
    "tenant_id, setting_key, setting_group, value_type, value, updated_at";

#[derive(Debug, FromRow)]
struct SettingRow {
    tenant_id: String,
    setting_key: String,
    setting_group: String,
    value_type: String,
    value: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SettingRow> for Setting {
    type Error = DbError;

    fn try_from(row: SettingRow) -> DbResult<Self> {
        let value = SettingValue::decode(&row.setting_key, &row.value_type, &row.value)?;
        Ok(Setting {
            tenant_id: TenantId::parse(&row.tenant_id).map_err(|e| DbError::decode("setting", e))?,
            key: row.setting_key,
            group: row.setting_group,
            value,
            updated_at: row.updated_at,
        })
    }
}

/// Outcome of an upsert: the stored row and what it replaced.
#[derive(Debug, Clone)]
pub struct SettingChange {
    pub current: Setting,
    pub previous: Option<Setting>,
}

/// Repository for tenant settings.
#[derive(Debug, Clone)]
pub struct SettingRepository {
    pool: SqlitePool,
    scope: TenantScope,
}

impl SettingRepository {
    pub fn new(pool: SqlitePool, scope: TenantScope) -> Self {
        SettingRepository { pool, scope }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Looks up one setting by key.
    pub async fn find(&self, key: &str) -> DbResult<Option<Setting>> {
        let row: Option<SettingRow> = ScopedQuery::select(&self.scope, "settings", SETTING_COLUMNS)
            .filter("setting_key", key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Setting::try_from).transpose()
    }

    /// All settings of a group, ordered by key.
    pub async fn find_group(&self, group: &str) -> DbResult<Vec<Setting>> {
        let rows: Vec<SettingRow> = ScopedQuery::select(&self.scope, "settings", SETTING_COLUMNS)
            .filter("setting_group", group)
            .order_by("setting_key")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Setting::try_from).collect()
    }

    /// Every setting visible in the scope.
    pub async fn list(&self) -> DbResult<Vec<Setting>> {
        let rows: Vec<SettingRow> = ScopedQuery::select(&self.scope, "settings", SETTING_COLUMNS)
            .order_by("setting_group, setting_key")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Setting::try_from).collect()
    }

    /// Inserts or replaces a setting; last write wins.
    ///
    /// Returns the previous row as well, so callers can invalidate caches
    /// for a group the key moved out of.
    pub async fn upsert(&self, key: &str, group: &str, value: SettingValue) -> DbResult<SettingChange> {
        validate_setting_key(key)?;
        validate_setting_group(group)?;
        let tenant = self.scope.require_tenant("write setting")?.clone();

        let mut tx = self.pool.begin().await?;

        let previous: Option<SettingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM settings WHERE tenant_id = ?1 AND setting_key = ?2",
            SETTING_COLUMNS
        ))
        .bind(tenant.as_str())
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let now = Utc::now();
        debug!(tenant_id = %tenant, key = %key, group = %group, "Upserting setting");

        sqlx::query(
            r#"
            INSERT INTO settings (
                id, tenant_id, setting_key, setting_group,
                value_type, value, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT (tenant_id, setting_key) DO UPDATE SET
                setting_group = excluded.setting_group,
                value_type = excluded.value_type,
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(tenant.as_str())
        .bind(key)
        .bind(group)
        .bind(value.type_tag())
        .bind(value.encode())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SettingChange {
            current: Setting {
                tenant_id: tenant,
                key: key.to_string(),
                group: group.to_string(),
                value,
                updated_at: now,
            },
            previous: previous.map(Setting::try_from).transpose()?,
        })
    }

    /// Deletes a setting, returning the row as it was when deleted.
    pub async fn remove(&self, key: &str) -> DbResult<Option<Setting>> {
        let tenant = self.scope.require_tenant("remove setting")?;

        let removed: Option<SettingRow> = sqlx::query_as(&format!(
            "DELETE FROM settings WHERE tenant_id = ?1 AND setting_key = ?2 RETURNING {}",
            SETTING_COLUMNS
        ))
        .bind(tenant.as_str())
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        if removed.is_some() {
            debug!(tenant_id = %tenant, key = %key, "Removed setting");
        }
        removed.map(Setting::try_from).transpose()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
