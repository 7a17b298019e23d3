//! # Domain Event Outbox Repository
//!
//! Stores domain events next to the change that raised them and hands them
//! to the dispatcher.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  OrderRepository::place                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. INSERT INTO orders / order_lines                            │   │
//! │  │  2. INSERT INTO domain_events (event_type = 'order.placed', …) │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            EventDispatcher (keystone-services)                  │   │
//! │  │  1. get_pending(batch, max_attempts)                            │   │
//! │  │  2. run listeners                                               │   │
//! │  │  3. mark_dispatched  |  mark_failed (attempts += 1)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The outbox is a system table drained across all tenants, so this
//! repository is not scoped. Each entry still records its tenant, and the
//! dispatcher binds it before running listeners.

use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, Sqlite, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use keystone_core::{DomainEvent, TenantId};

/// One row of the `domain_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct OutboxEntry {
    pub id: String,
    pub tenant_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub payload: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

impl OutboxEntry {
    /// Decodes the stored payload.
    pub fn event(&self) -> DbResult<DomainEvent> {
        Ok(DomainEvent::from_json(&self.payload)?)
    }

    pub fn tenant(&self) -> DbResult<TenantId> {
        TenantId::parse(&self.tenant_id).map_err(|e| DbError::decode("domain_event", e))
    }
}

const OUTBOX_COLUMNS: &str = "id, tenant_id, event_type, aggregate_type, aggregate_id, payload, \
     attempts, last_error, created_at, attempted_at, dispatched_at";

/// Writes an event through any executor, so callers can enlist it in their
/// own transaction.
pub(crate) async fn insert_event<'e, E>(executor: E, event: &DomainEvent) -> DbResult<OutboxEntry>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let entry = OutboxEntry {
        id: Uuid::new_v4().to_string(),
        tenant_id: event.tenant_id().to_string(),
        event_type: event.name().to_string(),
        aggregate_type: event.aggregate_type().to_string(),
        aggregate_id: event.aggregate_id().to_string(),
        payload: event.to_json()?,
        attempts: 0,
        last_error: None,
        created_at: Utc::now(),
        attempted_at: None,
        dispatched_at: None,
    };

    debug!(
        event = %entry.event_type,
        aggregate_id = %entry.aggregate_id,
        tenant_id = %entry.tenant_id,
        "Queuing domain event"
    );

    sqlx::query(
        r#"
        INSERT INTO domain_events (
            id, tenant_id, event_type, aggregate_type, aggregate_id,
            payload, attempts, last_error, created_at, attempted_at, dispatched_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, NULL, NULL)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.tenant_id)
    .bind(&entry.event_type)
    .bind(&entry.aggregate_type)
    .bind(&entry.aggregate_id)
    .bind(&entry.payload)
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(entry)
}

/// Repository for the domain event outbox.
#[derive(Debug, Clone)]
pub struct EventOutboxRepository {
    pool: SqlitePool,
}

impl EventOutboxRepository {
    pub fn new(pool: SqlitePool) -> Self {
        EventOutboxRepository { pool }
    }

    /// Queues an event outside of any other write.
    pub async fn enqueue(&self, event: &DomainEvent) -> DbResult<OutboxEntry> {
        insert_event(&self.pool, event).await
    }

    /// Undispatched entries that have not used up their attempts, oldest
    /// first.
    pub async fn get_pending(&self, limit: u32, max_attempts: u32) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM domain_events
            WHERE dispatched_at IS NULL AND attempts < ?1
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?2
            "#,
            OUTBOX_COLUMNS
        );

        let entries = sqlx::query_as::<_, OutboxEntry>(&sql)
            .bind(max_attempts as i64)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Marks an entry as handled by every listener.
    pub async fn mark_dispatched(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            "UPDATE domain_events SET dispatched_at = ?2, attempted_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Domain event", id));
        }
        Ok(())
    }

    /// Records a failed dispatch attempt.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE domain_events SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Domain event", id));
        }
        Ok(())
    }

    /// Counts undispatched entries, including ones out of attempts.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM domain_events WHERE dispatched_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Entries for one aggregate, oldest first.
    pub async fn list_for_aggregate(&self, aggregate_id: &str) -> DbResult<Vec<OutboxEntry>> {
        let sql = format!(
            "SELECT {} FROM domain_events WHERE aggregate_id = ?1 ORDER BY created_at ASC, rowid ASC",
            OUTBOX_COLUMNS
        );

        let entries = sqlx::query_as::<_, OutboxEntry>(&sql)
            .bind(aggregate_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Deletes entries dispatched more than `days_old` days ago.
    pub async fn cleanup_dispatched(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(days_old as i64);

        let result = sqlx::query(
            "DELETE FROM domain_events WHERE dispatched_at IS NOT NULL AND dispatched_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    fn setting_event(key: &str) -> DomainEvent {
        DomainEvent::SettingUpdated {
            tenant_id: TenantId::generate(),
            key: key.to_string(),
            group: "general".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_enqueue_and_get_pending() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.outbox();

        let event = setting_event("timezone");
        let entry = outbox.enqueue(&event).await.unwrap();
        assert_eq!(entry.event_type, "setting.updated");

        let pending = outbox.get_pending(10, 5).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event().unwrap(), event);
        assert_eq!(pending[0].tenant().unwrap(), *event.tenant_id());
    }

    #[tokio::test]
    async fn test_dispatched_entries_leave_the_queue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.outbox();

        let entry = outbox.enqueue(&setting_event("a")).await.unwrap();
        outbox.enqueue(&setting_event("b")).await.unwrap();

        outbox.mark_dispatched(&entry.id).await.unwrap();

        assert_eq!(outbox.count_pending().await.unwrap(), 1);
        let pending = outbox.get_pending(10, 5).await.unwrap();
        assert_eq!(pending[0].aggregate_id, "b");
    }

    #[tokio::test]
    async fn test_failed_entries_stop_after_max_attempts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.outbox();

        let entry = outbox.enqueue(&setting_event("a")).await.unwrap();
        outbox.mark_failed(&entry.id, "listener down").await.unwrap();
        outbox.mark_failed(&entry.id, "listener down").await.unwrap();

        let pending = outbox.get_pending(10, 3).await.unwrap();
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("listener down"));

        assert!(outbox.get_pending(10, 2).await.unwrap().is_empty());
        // Still counted: it was never dispatched
        assert_eq!(outbox.count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let outbox = db.outbox();

        let entry = outbox.enqueue(&setting_event("a")).await.unwrap();
        outbox.mark_dispatched(&entry.id).await.unwrap();

        assert_eq!(outbox.cleanup_dispatched(7).await.unwrap(), 0);
        assert_eq!(outbox.cleanup_dispatched(0).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_unknown_entry_fails() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.outbox().mark_dispatched("missing").await.unwrap_err().is_not_found());
    }
}
