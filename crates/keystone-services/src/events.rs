//! # Domain Event Dispatch
//!
//! Delivers events from the `domain_events` outbox to listeners.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       EventDispatcher                                   │
//! │                                                                         │
//! │  interval tick (events.poll_interval_ms)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  outbox.get_pending(batch_size, max_attempts)                          │
//! │       │                                                                 │
//! │       ▼  for each entry                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  decode payload          ── error ──► mark_failed               │   │
//! │  │  ctx = TenantContext::for_tenant(entry.tenant)                  │   │
//! │  │  every listener where handles(event):                           │   │
//! │  │      listener.handle(&ctx, &event)                              │   │
//! │  │  all ok   ──► mark_dispatched, EventBus::publish                │   │
//! │  │  any err  ──► mark_failed (attempts += 1)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  cleanup tick ──► cleanup_dispatched(retention_days)                   │
//! │  shutdown      ──► loop exits after the current batch                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A retried event is handed to every interested listener again, including
//! those that already succeeded, so listeners must be idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use keystone_core::{DomainEvent, TenantContext};
use keystone_db::{Database, OutboxEntry};

use crate::config::EventSettings;
use crate::error::{ServiceError, ServiceResult};

// =============================================================================
// Listener
// =============================================================================

/// Reacts to domain events.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Stable name used in logs and failure messages.
    fn name(&self) -> &str;

    fn handles(&self, event: &DomainEvent) -> bool;

    /// Handles one event. `ctx` is bound to the event's tenant.
    async fn handle(&self, ctx: &TenantContext, event: &DomainEvent) -> ServiceResult<()>;
}

// =============================================================================
// In-process Bus
// =============================================================================

/// Fan-out of delivered events to in-process subscribers.
///
/// Subscribers that fall behind lose the oldest events; the outbox remains
/// the durable record.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    /// Sends to current subscribers and returns how many there were.
    pub fn publish(&self, event: DomainEvent) -> usize {
        // No subscribers is not a failure
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Outcome of one polling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.dispatched == 0 && self.failed == 0
    }
}

/// Drains the outbox into the registered listeners.
pub struct EventDispatcher {
    db: Database,
    settings: EventSettings,
    listeners: Vec<Arc<dyn EventListener>>,
    bus: EventBus,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running dispatcher.
#[derive(Clone)]
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatcherHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> ServiceResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| ServiceError::ChannelError("Dispatcher shutdown channel closed".into()))
    }
}

impl EventDispatcher {
    /// Creates a dispatcher and returns its handle.
    pub fn new(db: Database, bus: EventBus, settings: EventSettings) -> (Self, DispatcherHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let dispatcher = EventDispatcher {
            db,
            settings,
            listeners: Vec::new(),
            bus,
            shutdown_rx,
        };

        (dispatcher, DispatcherHandle { shutdown_tx })
    }

    pub fn register(&mut self, listener: Arc<dyn EventListener>) -> &mut Self {
        info!(listener = listener.name(), "Registered event listener");
        self.listeners.push(listener);
        self
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Runs the dispatch loop until shutdown.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!(
            listeners = self.listeners.len(),
            poll_ms = self.settings.poll_interval_ms,
            "Event dispatcher starting"
        );

        let mut poll = tokio::time::interval(self.settings.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut cleanup = tokio::time::interval(self.settings.cleanup_interval());
        cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(?e, "Failed to process event batch");
                    }
                }

                _ = cleanup.tick() => {
                    if let Err(e) = self.cleanup().await {
                        error!(?e, "Failed to clean up dispatched events");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Event dispatcher shutting down");
                    break;
                }
            }
        }

        info!("Event dispatcher stopped");
    }

    /// Processes one batch of pending events.
    pub async fn run_once(&self) -> ServiceResult<DispatchReport> {
        let entries = self
            .db
            .outbox()
            .get_pending(self.settings.batch_size, self.settings.max_attempts)
            .await?;

        if entries.is_empty() {
            debug!("No pending domain events");
            return Ok(DispatchReport::default());
        }

        debug!(count = entries.len(), "Dispatching domain events");

        let mut report = DispatchReport::default();
        for entry in &entries {
            match self.deliver(entry).await {
                Ok(event) => {
                    self.db.outbox().mark_dispatched(&entry.id).await?;
                    self.bus.publish(event);
                    report.dispatched += 1;
                }
                Err(e) => {
                    let attempts = entry.attempts + 1;
                    self.db.outbox().mark_failed(&entry.id, &e.to_string()).await?;
                    report.failed += 1;

                    if attempts >= i64::from(self.settings.max_attempts) {
                        error!(
                            id = %entry.id,
                            event_type = %entry.event_type,
                            attempts,
                            error = %e,
                            "Giving up on domain event"
                        );
                    } else {
                        warn!(
                            id = %entry.id,
                            event_type = %entry.event_type,
                            attempts,
                            error = %e,
                            "Domain event delivery failed, will retry"
                        );
                    }
                }
            }
        }

        info!(
            dispatched = report.dispatched,
            failed = report.failed,
            "Processed domain event batch"
        );
        Ok(report)
    }

    /// Purges dispatched events past the retention window.
    pub async fn cleanup(&self) -> ServiceResult<u64> {
        let removed = self
            .db
            .outbox()
            .cleanup_dispatched(self.settings.retention_days)
            .await?;
        if removed > 0 {
            info!(removed, retention_days = self.settings.retention_days, "Purged dispatched events");
        }
        Ok(removed)
    }

    /// Runs every interested listener for one entry.
    async fn deliver(&self, entry: &OutboxEntry) -> ServiceResult<DomainEvent> {
        let event = entry.event()?;
        let ctx = TenantContext::for_tenant(entry.tenant()?);

        let mut failures = Vec::new();
        for listener in self.listeners.iter().filter(|l| l.handles(&event)) {
            debug!(
                listener = listener.name(),
                event = event.name(),
                tenant_id = %event.tenant_id(),
                "Running listener"
            );
            if let Err(e) = listener.handle(&ctx, &event).await {
                failures.push(format!("{}: {}", listener.name(), e));
            }
        }

        if failures.is_empty() {
            Ok(event)
        } else {
            Err(ServiceError::listener(event.name(), failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::{
        Discount, Money, NewOrder, NewTenant, Rate, SaleLine, TaxMode, TenantId,
    };
    use keystone_db::{DbConfig, TenantScope};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        seen: AtomicUsize,
        fail: bool,
    }

    impl Recorder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Recorder {
                seen: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl EventListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn handles(&self, event: &DomainEvent) -> bool {
            matches!(event, DomainEvent::OrderPlaced { .. })
        }

        async fn handle(&self, ctx: &TenantContext, event: &DomainEvent) -> ServiceResult<()> {
            assert_eq!(&ctx.require()?, event.tenant_id());
            self.seen.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::listener("recorder", "boom"));
            }
            Ok(())
        }
    }

    fn settings(max_attempts: u32) -> EventSettings {
        EventSettings {
            max_attempts,
            ..EventSettings::default()
        }
    }

    async fn setup_with_order() -> (Database, TenantId) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(NewTenant {
                name: "Acme".into(),
                slug: "acme".into(),
            })
            .await
            .unwrap();

        let order = NewOrder {
            tenant_id: None,
            customer_name: "Initech".into(),
            lines: vec![SaleLine {
                description: "Consulting hour".into(),
                quantity: Decimal::new(2, 0),
                unit_price: Money::parse("150.00").unwrap(),
                discount: Discount::None,
                tax_rate: Rate::from_bps(1000),
            }],
            discount: Discount::None,
            notes: None,
        };
        let priced = order.price(TaxMode::Exclusive, 2).unwrap();
        db.orders(TenantScope::tenant(tenant.id.clone()))
            .place(order, &priced)
            .await
            .unwrap();

        (db, tenant.id)
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        let setting = keystone_core::Setting {
            tenant_id: TenantId::generate(),
            key: "general.timezone".into(),
            group: "general".into(),
            value: keystone_core::SettingValue::Text("UTC".into()),
            updated_at: chrono::Utc::now(),
        };
        assert_eq!(bus.publish(DomainEvent::setting_updated(&setting)), 0);
    }

    #[tokio::test]
    async fn test_run_once_dispatches_and_publishes() {
        let (db, tenant) = setup_with_order().await;
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let recorder = Recorder::new(false);
        let (mut dispatcher, _handle) = EventDispatcher::new(db.clone(), bus, settings(3));
        dispatcher.register(recorder.clone());

        let report = dispatcher.run_once().await.unwrap();
        assert_eq!(report, DispatchReport { dispatched: 1, failed: 0 });
        assert_eq!(recorder.seen.load(Ordering::SeqCst), 1);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);

        let published = rx.recv().await.unwrap();
        assert_eq!(published.name(), "order.placed");
        assert_eq!(published.tenant_id(), &tenant);

        // Nothing left to do
        assert!(dispatcher.run_once().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failures_retry_until_max_attempts() {
        let (db, _) = setup_with_order().await;

        let recorder = Recorder::new(true);
        let (mut dispatcher, _handle) = EventDispatcher::new(db.clone(), EventBus::default(), settings(2));
        dispatcher.register(recorder.clone());

        assert_eq!(dispatcher.run_once().await.unwrap().failed, 1);
        assert_eq!(dispatcher.run_once().await.unwrap().failed, 1);

        // Past max_attempts the entry is no longer picked up
        assert!(dispatcher.run_once().await.unwrap().is_empty());
        assert_eq!(recorder.seen.load(Ordering::SeqCst), 2);

        let entries = db.outbox().get_pending(10, 100).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].attempts, 2);
        assert!(entries[0]
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("recorder")));
    }

    #[tokio::test]
    async fn test_events_without_listeners_are_dispatched() {
        let (db, _) = setup_with_order().await;
        let (dispatcher, _handle) = EventDispatcher::new(db.clone(), EventBus::default(), settings(3));

        assert_eq!(dispatcher.run_once().await.unwrap().dispatched, 1);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (db, _) = setup_with_order().await;
        let recorder = Recorder::new(false);
        let (mut dispatcher, handle) = EventDispatcher::new(
            db.clone(),
            EventBus::default(),
            EventSettings {
                poll_interval_ms: 10,
                ..EventSettings::default()
            },
        );
        dispatcher.register(recorder.clone());

        let task = tokio::spawn(dispatcher.run());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert_eq!(recorder.seen.load(Ordering::SeqCst), 1);
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }
}
