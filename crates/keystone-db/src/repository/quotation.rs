//! # Quotation Repository
//!
//! Database operations for quotations. Quotations are usually drafted by the
//! `OrderPlaced` listener; at most one exists per order.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::order::generate_document_number;
use crate::repository::outbox::insert_event;
use crate::scope::{ScopedQuery, TenantScope};
use keystone_core::validation::validate_customer_name;
use keystone_core::{
    CoreError, DomainEvent, Money, NewQuotation, Quotation, QuotationStatus, TenantId,
};

const QUOTATION_COLUMNS: &str = "id, tenant_id, quotation_number, order_id, customer_name, \
     status, currency_scale, subtotal, discount, tax, total, valid_until, created_at, updated_at";

#[derive(Debug, FromRow)]
struct QuotationRow {
    id: String,
    tenant_id: String,
    quotation_number: String,
    order_id: Option<String>,
    customer_name: String,
    status: QuotationStatus,
    currency_scale: i64,
    subtotal: String,
    discount: String,
    tax: String,
    total: String,
    valid_until: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QuotationRow> for Quotation {
    type Error = DbError;

    fn try_from(row: QuotationRow) -> DbResult<Self> {
        let corrupt = |e: &dyn std::fmt::Display| DbError::decode("quotation", e.to_string());

        Ok(Quotation {
            tenant_id: TenantId::parse(&row.tenant_id).map_err(|e| corrupt(&e))?,
            currency_scale: u32::try_from(row.currency_scale).map_err(|e| corrupt(&e))?,
            subtotal: Money::parse(&row.subtotal).map_err(|e| corrupt(&e))?,
            discount: Money::parse(&row.discount).map_err(|e| corrupt(&e))?,
            tax: Money::parse(&row.tax).map_err(|e| corrupt(&e))?,
            total: Money::parse(&row.total).map_err(|e| corrupt(&e))?,
            id: row.id,
            quotation_number: row.quotation_number,
            order_id: row.order_id,
            customer_name: row.customer_name,
            status: row.status,
            valid_until: row.valid_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Repository for quotation database operations.
#[derive(Debug, Clone)]
pub struct QuotationRepository {
    pool: SqlitePool,
    scope: TenantScope,
}

impl QuotationRepository {
    pub fn new(pool: SqlitePool, scope: TenantScope) -> Self {
        QuotationRepository { pool, scope }
    }

    /// Creates a draft quotation and raises `QuotationCreated` in the same
    /// transaction.
    ///
    /// A second quotation for the same order fails with `UniqueViolation`.
    pub async fn create(&self, mut input: NewQuotation) -> DbResult<Quotation> {
        validate_customer_name(&input.customer_name)?;
        let tenant_id = self.scope.stamp(&mut input, "create quotation")?;

        let now = Utc::now();
        if input.valid_until < now {
            return Err(CoreError::InvalidAmount {
                field: "valid_until".to_string(),
                reason: "quotation would already be expired".to_string(),
            }
            .into());
        }

        let scale = input.totals.scale;
        let quotation = Quotation {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            quotation_number: generate_document_number("QT", now),
            order_id: input.order_id.clone(),
            customer_name: input.customer_name.trim().to_string(),
            status: QuotationStatus::Draft,
            currency_scale: scale,
            subtotal: input.totals.subtotal,
            discount: input.totals.discount,
            tax: input.totals.tax,
            total: input.totals.total,
            valid_until: input.valid_until,
            created_at: now,
            updated_at: now,
        };

        info!(
            id = %quotation.id,
            quotation_number = %quotation.quotation_number,
            order_id = ?quotation.order_id,
            "Creating quotation"
        );

        let mut tx = self.pool.begin().await?;

        if let Some(order_id) = &quotation.order_id {
            let owned: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM orders WHERE tenant_id = ?1 AND id = ?2")
                    .bind(quotation.tenant_id.as_str())
                    .bind(order_id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if owned.is_none() {
                return Err(DbError::not_found("Order", order_id.as_str()));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO quotations (
                id, tenant_id, quotation_number, order_id, customer_name,
                status, currency_scale, subtotal, discount, tax, total,
                valid_until, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14
            )
            "#,
        )
        .bind(&quotation.id)
        .bind(quotation.tenant_id.as_str())
        .bind(&quotation.quotation_number)
        .bind(&quotation.order_id)
        .bind(&quotation.customer_name)
        .bind(quotation.status)
        .bind(scale as i64)
        .bind(quotation.subtotal.to_fixed(scale))
        .bind(quotation.discount.to_fixed(scale))
        .bind(quotation.tax.to_fixed(scale))
        .bind(quotation.total.to_fixed(scale))
        .bind(quotation.valid_until)
        .bind(quotation.created_at)
        .bind(quotation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } if field.contains("order_id") => {
                DbError::duplicate("quotation for order", quotation.order_id.clone().unwrap_or_default())
            }
            other => other,
        })?;

        insert_event(&mut *tx, &DomainEvent::quotation_created(&quotation)).await?;

        tx.commit().await?;
        Ok(quotation)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Quotation>> {
        let row: Option<QuotationRow> = ScopedQuery::select(&self.scope, "quotations", QUOTATION_COLUMNS)
            .filter("id", id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Quotation::try_from).transpose()
    }

    /// The quotation drafted from `order_id`, if any.
    pub async fn find_by_order(&self, order_id: &str) -> DbResult<Option<Quotation>> {
        let row: Option<QuotationRow> = ScopedQuery::select(&self.scope, "quotations", QUOTATION_COLUMNS)
            .filter("order_id", order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Quotation::try_from).transpose()
    }

    /// Quotations in `status`, newest first.
    pub async fn list_for_status(&self, status: QuotationStatus, limit: u32) -> DbResult<Vec<Quotation>> {
        let rows: Vec<QuotationRow> = ScopedQuery::select(&self.scope, "quotations", QUOTATION_COLUMNS)
            .filter("status", status.as_str())
            .order_by("created_at DESC")
            .limit(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Quotation::try_from).collect()
    }

    /// Moves a quotation along its lifecycle.
    pub async fn update_status(&self, id: &str, status: QuotationStatus) -> DbResult<Quotation> {
        self.scope.require_tenant("update quotation")?;

        let mut quotation = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Quotation", id))?;

        if !quotation.status.can_transition_to(status) {
            return Err(CoreError::InvalidStatusTransition {
                entity: "quotation".to_string(),
                from: quotation.status.to_string(),
                to: status.to_string(),
            }
            .into());
        }

        let now = Utc::now();
        debug!(id = %id, from = %quotation.status, to = %status, "Updating quotation status");

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE quotations SET status = ");
        qb.push_bind(status);
        qb.push(", updated_at = ");
        qb.push_bind(now);
        self.scope.restrict(&mut qb, false);
        qb.push(" AND id = ");
        qb.push_bind(id.to_string());

        qb.build().execute(&self.pool).await?;

        quotation.status = status;
        quotation.updated_at = now;
        Ok(quotation)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
