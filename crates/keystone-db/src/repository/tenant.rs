//! # Tenant Repository
//!
//! The tenant registry. This table is the root of tenancy itself, so it is
//! the one repository that is not built with a [`TenantScope`](crate::scope::TenantScope).

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use keystone_core::validation::{validate_tenant_name, validate_tenant_slug};
use keystone_core::{NewTenant, Tenant, TenantId};

const TENANT_COLUMNS: &str = "id, name, slug, is_active, created_at, updated_at";

#[derive(Debug, FromRow)]
struct TenantRow {
    id: String,
    name: String,
    slug: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = DbError;

    fn try_from(row: TenantRow) -> DbResult<Self> {
        Ok(Tenant {
            id: TenantId::parse(&row.id).map_err(|e| DbError::decode("tenant", e))?,
            name: row.name,
            slug: row.slug,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for the tenant registry.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: SqlitePool,
}

impl TenantRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TenantRepository { pool }
    }

    /// Registers a tenant. Slugs are unique across the whole system.
    pub async fn create(&self, input: NewTenant) -> DbResult<Tenant> {
        validate_tenant_name(&input.name)?;
        validate_tenant_slug(&input.slug)?;

        let now = Utc::now();
        let tenant = Tenant {
            id: TenantId::generate(),
            name: input.name.trim().to_string(),
            slug: input.slug,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        info!(id = %tenant.id, slug = %tenant.slug, "Creating tenant");

        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, slug, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(tenant.id.as_str())
        .bind(&tenant.name)
        .bind(&tenant.slug)
        .bind(tenant.is_active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("slug", &tenant.slug),
            other => other,
        })?;

        Ok(tenant)
    }

    pub async fn get_by_id(&self, id: &TenantId) -> DbResult<Option<Tenant>> {
        let sql = format!("SELECT {} FROM tenants WHERE id = ?1", TENANT_COLUMNS);
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Tenant::try_from).transpose()
    }

    pub async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Tenant>> {
        let sql = format!("SELECT {} FROM tenants WHERE slug = ?1", TENANT_COLUMNS);
        let row: Option<TenantRow> = sqlx::query_as(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Tenant::try_from).transpose()
    }

    /// Active tenants ordered by slug.
    pub async fn list_active(&self) -> DbResult<Vec<Tenant>> {
        let sql = format!(
            "SELECT {} FROM tenants WHERE is_active = 1 ORDER BY slug",
            TENANT_COLUMNS
        );
        let rows: Vec<TenantRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(Tenant::try_from).collect()
    }

    /// Marks a tenant inactive. Its data is kept.
    pub async fn deactivate(&self, id: &TenantId) -> DbResult<()> {
        debug!(id = %id, "Deactivating tenant");

        let result = sqlx::query("UPDATE tenants SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Tenant", id.as_str()));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
