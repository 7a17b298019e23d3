//! # Tenant Scope
//!
//! The tenant predicate that every query against a tenant-owned table goes
//! through.
//!
//! ## How Scoping Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tenant Scoping                                   │
//! │                                                                         │
//! │  TenantScope::current(&ctx)                                            │
//! │       │                                                                 │
//! │       ├── ctx unbound ─────────► Err(TenantNotBound)   (fail closed)   │
//! │       └── ctx bound to T ──────► TenantScope::Tenant(T)                │
//! │                                                                         │
//! │  ScopedQuery::select(&scope, "orders", COLUMNS)                        │
//! │       .filter("status", "placed")                                       │
//! │       .order_by("placed_at DESC")                                       │
//! │                                                                         │
//! │  SELECT … FROM orders WHERE tenant_id = ? AND status = ?               │
//! │                             ▲                                           │
//! │                             └── always the first predicate             │
//! │                                                                         │
//! │  TenantScope::Unscoped  → no predicate (system jobs only, explicit)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use keystone_core::{BelongsToTenant, TenantContext, TenantId};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use crate::error::{DbError, DbResult};

/// Column holding the owning tenant on every tenant-owned table.
pub const TENANT_COLUMN: &str = "tenant_id";

// =============================================================================
// Tenant Scope
// =============================================================================

/// Which rows a repository may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    /// Only rows of this tenant.
    Tenant(TenantId),
    /// All rows. Reserved for system jobs that work across tenants.
    Unscoped,
}

impl TenantScope {
    /// Scope of the tenant bound to `ctx`.
    ///
    /// Fails with `TenantNotBound` instead of silently returning every
    /// tenant's rows.
    pub fn current(ctx: &TenantContext) -> DbResult<Self> {
        Ok(TenantScope::Tenant(ctx.require()?))
    }

    pub fn tenant(id: TenantId) -> Self {
        TenantScope::Tenant(id)
    }

    pub fn unscoped() -> Self {
        TenantScope::Unscoped
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        match self {
            TenantScope::Tenant(id) => Some(id),
            TenantScope::Unscoped => None,
        }
    }

    /// The scoped tenant, or an error naming the operation that needed it.
    pub fn require_tenant(&self, operation: &str) -> DbResult<&TenantId> {
        self.tenant_id().ok_or_else(|| DbError::ScopeRequired {
            operation: operation.to_string(),
        })
    }

    /// Stamps the scoped tenant onto a record about to be inserted.
    pub fn stamp<E: BelongsToTenant>(&self, entity: &mut E, operation: &str) -> DbResult<TenantId> {
        let tenant = self.require_tenant(operation)?;
        Ok(TenantContext::for_tenant(tenant.clone()).stamp(entity)?)
    }

    /// Appends the tenant predicate to `qb`.
    ///
    /// Pushes ` WHERE tenant_id = ?` (or ` AND …` when `has_where`) with the
    /// tenant bound as a parameter. Returns whether the statement now has a
    /// WHERE clause.
    pub fn restrict(&self, qb: &mut QueryBuilder<'_, Sqlite>, has_where: bool) -> bool {
        match self {
            TenantScope::Tenant(id) => {
                qb.push(if has_where { " AND " } else { " WHERE " });
                qb.push(TENANT_COLUMN);
                qb.push(" = ");
                qb.push_bind(id.as_str().to_string());
                true
            }
            TenantScope::Unscoped => has_where,
        }
    }
}

// =============================================================================
// Scoped Query
// =============================================================================

/// A value bound into a scoped query.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Integer(i64),
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Integer(value)
    }
}

impl From<bool> for BindValue {
    fn from(value: bool) -> Self {
        BindValue::Integer(value as i64)
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &BindValue) {
    match value {
        BindValue::Text(s) => qb.push_bind(s.clone()),
        BindValue::Integer(i) => qb.push_bind(*i),
    };
}

/// A SELECT against one tenant-owned table.
///
/// Table and column names are `'static` so they can only come from code,
/// never from input; values are always bound.
///
/// ```rust,ignore
/// let rows: Vec<OrderRow> = ScopedQuery::select(&scope, "orders", ORDER_COLUMNS)
///     .filter("status", "placed")
///     .order_by("placed_at DESC")
///     .limit(20)
///     .fetch_all(&pool)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ScopedQuery {
    scope: TenantScope,
    table: &'static str,
    columns: &'static str,
    filters: Vec<(&'static str, BindValue)>,
    order_by: Option<&'static str>,
    limit: Option<i64>,
}

impl ScopedQuery {
    pub fn select(scope: &TenantScope, table: &'static str, columns: &'static str) -> Self {
        ScopedQuery {
            scope: scope.clone(),
            table,
            columns,
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    /// Adds `column = value`.
    pub fn filter(mut self, column: &'static str, value: impl Into<BindValue>) -> Self {
        self.filters.push((column, value.into()));
        self
    }

    pub fn order_by(mut self, clause: &'static str) -> Self {
        self.order_by = Some(clause);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn build(&self, select_list: &str) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(select_list);
        qb.push(" FROM ");
        qb.push(self.table);

        let mut has_where = self.scope.restrict(&mut qb, false);

        for (column, value) in &self.filters {
            qb.push(if has_where { " AND " } else { " WHERE " });
            qb.push(*column);
            qb.push(" = ");
            push_value(&mut qb, value);
            has_where = true;
        }

        if let Some(order_by) = self.order_by {
            qb.push(" ORDER BY ");
            qb.push(order_by);
        }

        if let Some(limit) = self.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        qb
    }

    /// The SQL this query runs (for logging and tests).
    pub fn sql(&self) -> String {
        self.build(self.columns).into_sql()
    }

    pub async fn fetch_all<R>(&self, pool: &SqlitePool) -> DbResult<Vec<R>>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut qb = self.build(self.columns);
        let rows = qb.build_query_as::<R>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn fetch_optional<R>(&self, pool: &SqlitePool) -> DbResult<Option<R>>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let mut qb = self.build(self.columns);
        let row = qb.build_query_as::<R>().fetch_optional(pool).await?;
        Ok(row)
    }

    /// Counts matching rows (ignores ordering and limit).
    pub async fn count(&self, pool: &SqlitePool) -> DbResult<i64> {
        let counting = ScopedQuery {
            order_by: None,
            limit: None,
            ..self.clone()
        };
        let mut qb = counting.build("COUNT(*)");
        let count: i64 = qb.build_query_scalar().fetch_one(pool).await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::CoreError;

    #[test]
    fn test_current_fails_closed() {
        let ctx = TenantContext::new();
        let err = TenantScope::current(&ctx).unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::TenantNotBound)));
    }

    #[test]
    fn test_tenant_predicate_comes_first() {
        let scope = TenantScope::tenant(TenantId::generate());
        let sql = ScopedQuery::select(&scope, "orders", "id")
            .filter("status", "placed")
            .order_by("placed_at DESC")
            .limit(5)
            .sql();

        assert_eq!(
            sql,
            "SELECT id FROM orders WHERE tenant_id = ? AND status = ? ORDER BY placed_at DESC LIMIT ?"
        );
    }

    #[test]
    fn test_unscoped_has_no_tenant_predicate() {
        let sql = ScopedQuery::select(&TenantScope::Unscoped, "orders", "id")
            .filter("status", "placed")
            .sql();
        assert_eq!(sql, "SELECT id FROM orders WHERE status = ?");
    }

    #[test]
    fn test_require_tenant_rejects_unscoped() {
        let err = TenantScope::Unscoped.require_tenant("place order").unwrap_err();
        assert!(matches!(err, DbError::ScopeRequired { .. }));
    }

    #[test]
    fn test_restrict_on_update_statement() {
        let scope = TenantScope::tenant(TenantId::generate());
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE orders SET status = 'x'");
        assert!(scope.restrict(&mut qb, false));
        assert!(scope.restrict(&mut qb, true));
        assert_eq!(
            qb.into_sql(),
            "UPDATE orders SET status = 'x' WHERE tenant_id = ? AND tenant_id = ?"
        );
    }
}
