//! # Order Repository
//!
//! Database operations for sales orders and their lines.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. PLACE                                                              │
//! │     └── place() → Order { status: Placed }                             │
//! │         (order + lines + OrderPlaced event, one transaction)           │
//! │                                                                         │
//! │  2. INVOICE                                                            │
//! │     └── update_status(Invoiced) → InvoiceGenerated event               │
//! │                                                                         │
//! │  3. (OPTIONAL) CANCEL                                                  │
//! │     └── update_status(Cancelled)                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::outbox::insert_event;
use crate::scope::{ScopedQuery, TenantScope};
use keystone_core::{
    DomainEvent, Money, NewOrder, Order, OrderLine, OrderStatus, PricedOrder, Rate, TaxMode,
    TenantId,
};

const ORDER_COLUMNS: &str = "id, tenant_id, order_number, customer_name, status, currency_scale, \
     tax_mode, subtotal, discount, tax, total, notes, placed_at, updated_at";

const LINE_COLUMNS: &str = "id, order_id, line_number, description, quantity, unit_price, \
     discount, tax_rate, tax, line_total";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    tenant_id: String,
    order_number: String,
    customer_name: String,
    status: OrderStatus,
    currency_scale: i64,
    tax_mode: String,
    subtotal: String,
    discount: String,
    tax: String,
    total: String,
    notes: Option<String>,
    placed_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DbError;

    fn try_from(row: OrderRow) -> DbResult<Self> {
        let corrupt = |e: &dyn std::fmt::Display| DbError::decode("order", e.to_string());

        Ok(Order {
            tenant_id: TenantId::parse(&row.tenant_id).map_err(|e| corrupt(&e))?,
            currency_scale: u32::try_from(row.currency_scale).map_err(|e| corrupt(&e))?,
            tax_mode: TaxMode::from_str(&row.tax_mode).map_err(|e| corrupt(&e))?,
            subtotal: Money::parse(&row.subtotal).map_err(|e| corrupt(&e))?,
            discount: Money::parse(&row.discount).map_err(|e| corrupt(&e))?,
            tax: Money::parse(&row.tax).map_err(|e| corrupt(&e))?,
            total: Money::parse(&row.total).map_err(|e| corrupt(&e))?,
            id: row.id,
            order_number: row.order_number,
            customer_name: row.customer_name,
            status: row.status,
            notes: row.notes,
            placed_at: row.placed_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderLineRow {
    id: String,
    order_id: String,
    line_number: i64,
    description: String,
    quantity: String,
    unit_price: String,
    discount: String,
    tax_rate: String,
    tax: String,
    line_total: String,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = DbError;

    fn try_from(row: OrderLineRow) -> DbResult<Self> {
        let corrupt = |e: &dyn std::fmt::Display| DbError::decode("order_line", e.to_string());

        Ok(OrderLine {
            line_number: u32::try_from(row.line_number).map_err(|e| corrupt(&e))?,
            quantity: Decimal::from_str(&row.quantity).map_err(|e| corrupt(&e))?,
            unit_price: Money::parse(&row.unit_price).map_err(|e| corrupt(&e))?,
            discount: Money::parse(&row.discount).map_err(|e| corrupt(&e))?,
            tax_rate: Rate::from_percent_str(&row.tax_rate).map_err(|e| corrupt(&e))?,
            tax: Money::parse(&row.tax).map_err(|e| corrupt(&e))?,
            line_total: Money::parse(&row.line_total).map_err(|e| corrupt(&e))?,
            id: row.id,
            order_id: row.order_id,
            description: row.description,
        })
    }
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    scope: TenantScope,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool, scope: TenantScope) -> Self {
        OrderRepository { pool, scope }
    }

    /// Stores a priced order and raises `OrderPlaced`.
    ///
    /// ## What This Does
    /// 1. Stamps the scoped tenant onto the order (rejects a foreign tenant)
    /// 2. Inserts the order and every line
    /// 3. Queues `OrderPlaced` in the outbox
    ///
    /// All three happen in one transaction.
    pub async fn place(&self, mut input: NewOrder, priced: &PricedOrder) -> DbResult<Order> {
        let tenant_id = self.scope.stamp(&mut input, "place order")?;

        let now = Utc::now();
        let scale = priced.totals.scale;
        let order = Order {
            id: Uuid::new_v4().to_string(),
            tenant_id,
            order_number: generate_document_number("SO", now),
            customer_name: input.customer_name.trim().to_string(),
            status: OrderStatus::Placed,
            currency_scale: scale,
            tax_mode: priced.tax_mode,
            subtotal: priced.totals.subtotal,
            discount: priced.totals.discount,
            tax: priced.totals.tax,
            total: priced.totals.total,
            notes: input.notes.clone(),
            placed_at: now,
            updated_at: now,
        };

        info!(
            id = %order.id,
            order_number = %order.order_number,
            tenant_id = %order.tenant_id,
            total = %order.total.to_fixed(scale),
            "Placing order"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, tenant_id, order_number, customer_name, status,
                currency_scale, tax_mode, subtotal, discount, tax, total,
                notes, placed_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14
            )
            "#,
        )
        .bind(&order.id)
        .bind(order.tenant_id.as_str())
        .bind(&order.order_number)
        .bind(&order.customer_name)
        .bind(order.status)
        .bind(order.currency_scale as i64)
        .bind(order.tax_mode.to_string())
        .bind(order.subtotal.to_fixed(scale))
        .bind(order.discount.to_fixed(scale))
        .bind(order.tax.to_fixed(scale))
        .bind(order.total.to_fixed(scale))
        .bind(&order.notes)
        .bind(order.placed_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for (index, priced_line) in priced.lines.iter().enumerate() {
            let line = &priced_line.line;
            let totals = &priced_line.totals;

            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    id, tenant_id, order_id, line_number, description,
                    quantity, unit_price, discount, tax_rate, tax, line_total
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(order.tenant_id.as_str())
            .bind(&order.id)
            .bind(index as i64 + 1)
            .bind(&line.description)
            .bind(line.quantity.to_string())
            .bind(line.unit_price.to_string())
            .bind(totals.discount.to_fixed(scale))
            .bind(line.tax_rate.percent().to_string())
            .bind(totals.tax.to_fixed(scale))
            .bind(totals.total.to_fixed(scale))
            .execute(&mut *tx)
            .await?;
        }

        insert_event(&mut *tx, &DomainEvent::order_placed(&order)).await?;

        tx.commit().await?;

        Ok(order)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = ScopedQuery::select(&self.scope, "orders", ORDER_COLUMNS)
            .filter("id", id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    /// Lines of an order in entry order.
    pub async fn get_lines(&self, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let rows: Vec<OrderLineRow> = ScopedQuery::select(&self.scope, "order_lines", LINE_COLUMNS)
            .filter("order_id", order_id)
            .order_by("line_number")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(OrderLine::try_from).collect()
    }

    /// Most recently placed orders first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<Order>> {
        let rows: Vec<OrderRow> = ScopedQuery::select(&self.scope, "orders", ORDER_COLUMNS)
            .order_by("placed_at DESC")
            .limit(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    pub async fn count_by_status(&self, status: OrderStatus) -> DbResult<i64> {
        ScopedQuery::select(&self.scope, "orders", ORDER_COLUMNS)
            .filter("status", status.as_str())
            .count(&self.pool)
            .await
    }

    /// Moves an order to `status`.
    ///
    /// Moving to `Invoiced` raises `InvoiceGenerated` in the same
    /// transaction.
    pub async fn update_status(&self, id: &str, status: OrderStatus) -> DbResult<Order> {
        self.scope.require_tenant("update order")?;

        let mut order = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        order.status.ensure_transition(status)?;

        let now = Utc::now();
        debug!(id = %id, from = %order.status, to = %status, "Updating order status");

        let mut tx = self.pool.begin().await?;

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE orders SET status = ");
        qb.push_bind(status);
        qb.push(", updated_at = ");
        qb.push_bind(now);
        self.scope.restrict(&mut qb, false);
        qb.push(" AND id = ");
        qb.push_bind(id.to_string());
        qb.push(" AND status = ");
        qb.push_bind(order.status);

        let result = qb.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            // Someone else changed it between the read and the write
            return Err(DbError::not_found("Order (in expected status)", id));
        }

        order.status = status;
        order.updated_at = now;

        if status == OrderStatus::Invoiced {
            insert_event(&mut *tx, &DomainEvent::invoice_generated(&order)).await?;
        }

        tx.commit().await?;
        Ok(order)
    }
}

/// Generates a document number: `{PREFIX}-{YYYYMMDD}-{6 hex}`.
///
/// The random suffix comes from a v4 UUID; uniqueness per tenant is
/// enforced by the schema.
pub(crate) fn generate_document_number(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(6)
        .collect::<String>()
        .to_uppercase();

    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix)
}

// =============================================================================
// Unit Tests
// =============================================================================
