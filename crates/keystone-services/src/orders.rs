//! # Order Service
//!
//! Places and invoices orders for the tenant bound to a [`TenantContext`].
//!
//! ## Placing an Order
//! ```text
//! place_order(&ctx, NewOrder)
//!      │
//!      ├── validate lines + customer
//!      ├── pricing(ctx): sales.tax_mode, sales.currency_scale
//!      │                 (tenant setting, else [sales] config)
//!      ├── ctx.stamp(&mut order)  ← fills or checks tenant_id
//!      ├── NewOrder::price(mode, scale) → PricedOrder
//!      ▼
//! OrderRepository::place ── order + lines + OrderPlaced, one transaction
//! ```

use std::sync::Arc;

use tracing::info;

use keystone_core::validation::{validate_customer_name, validate_order_lines, validate_scale};
use keystone_core::{
    CoreError, NewOrder, Order, OrderLine, OrderStatus, TaxMode, TenantContext,
};
use keystone_db::{Database, DbError, TenantScope};

use crate::config::SalesSettings;
use crate::error::ServiceResult;
use crate::settings::SettingService;

pub const TAX_MODE_SETTING: &str = "sales.tax_mode";
pub const CURRENCY_SCALE_SETTING: &str = "sales.currency_scale";

/// Order workflows.
pub struct OrderService {
    db: Database,
    settings: Arc<SettingService>,
    defaults: SalesSettings,
}

impl OrderService {
    pub fn new(db: Database, settings: Arc<SettingService>, defaults: SalesSettings) -> Self {
        OrderService {
            db,
            settings,
            defaults,
        }
    }

    /// Tax mode and currency scale in effect for the bound tenant.
    pub async fn pricing(&self, ctx: &TenantContext) -> ServiceResult<(TaxMode, u32)> {
        let mode = match self.settings.get_text(ctx, TAX_MODE_SETTING).await? {
            Some(raw) => raw.parse::<TaxMode>().map_err(|e| CoreError::InvalidSettingValue {
                key: TAX_MODE_SETTING.to_string(),
                value_type: "text".to_string(),
                reason: e.to_string(),
            })?,
            None => self.defaults.tax_mode,
        };

        let raw_scale = self
            .settings
            .get_i64(ctx, CURRENCY_SCALE_SETTING, i64::from(self.defaults.currency_scale))
            .await?;
        let scale = validate_scale(raw_scale)?;

        Ok((mode, scale))
    }

    /// Prices and persists an order, queuing `OrderPlaced`.
    pub async fn place_order(&self, ctx: &TenantContext, mut input: NewOrder) -> ServiceResult<Order> {
        validate_customer_name(&input.customer_name)?;
        validate_order_lines(&input.lines)?;

        let tenant = ctx.stamp(&mut input)?;
        let (mode, scale) = self.pricing(ctx).await?;
        let priced = input.price(mode, scale)?;

        let order = self.db.orders(TenantScope::current(ctx)?).place(input, &priced).await?;

        info!(
            tenant_id = %tenant,
            order = %order.order_number,
            total = %order.total.to_fixed(order.currency_scale),
            tax_mode = %mode,
            "Order placed"
        );
        Ok(order)
    }

    /// Moves a placed order to `Invoiced`, queuing `InvoiceGenerated`.
    pub async fn invoice(&self, ctx: &TenantContext, order_id: &str) -> ServiceResult<Order> {
        let order = self
            .db
            .orders(TenantScope::current(ctx)?)
            .update_status(order_id, OrderStatus::Invoiced)
            .await?;

        info!(order = %order.order_number, "Order invoiced");
        Ok(order)
    }

    pub async fn cancel(&self, ctx: &TenantContext, order_id: &str) -> ServiceResult<Order> {
        let order = self
            .db
            .orders(TenantScope::current(ctx)?)
            .update_status(order_id, OrderStatus::Cancelled)
            .await?;

        info!(order = %order.order_number, "Order cancelled");
        Ok(order)
    }

    /// Returns the order with its lines.
    pub async fn get_order(
        &self,
        ctx: &TenantContext,
        order_id: &str,
    ) -> ServiceResult<(Order, Vec<OrderLine>)> {
        let orders = self.db.orders(TenantScope::current(ctx)?);
        let order = orders
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id))?;
        let lines = orders.get_lines(order_id).await?;
        Ok((order, lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::ServiceError;
    use crate::settings::SqlSettingsStore;
    use keystone_core::{
        Discount, DomainEvent, Money, NewTenant, Rate, SaleLine, SettingValue, TenantId,
    };
    use keystone_db::DbConfig;
    use rust_decimal::Decimal;

    async fn setup() -> (OrderService, Database, Arc<SettingService>, TenantId) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tenant = db
            .tenants()
            .create(NewTenant {
                name: "Acme".into(),
                slug: "acme".into(),
            })
            .await
            .unwrap();
        let settings = Arc::new(SettingService::new(
            Arc::new(SqlSettingsStore::new(db.clone())),
            Arc::new(MemoryCache::default()),
        ));
        let service = OrderService::new(db.clone(), settings.clone(), SalesSettings::default());
        (service, db, settings, tenant.id)
    }

    fn order(lines: Vec<(&str, i64, &str, u32)>, discount: Discount) -> NewOrder {
        NewOrder {
            tenant_id: None,
            customer_name: "Initech".into(),
            lines: lines
                .into_iter()
                .map(|(description, qty, price, bps)| SaleLine {
                    description: description.into(),
                    quantity: Decimal::from(qty),
                    unit_price: Money::parse(price).unwrap(),
                    discount: Discount::None,
                    tax_rate: Rate::from_bps(bps),
                })
                .collect(),
            discount,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_place_order_with_config_defaults() {
        let (service, db, _, tenant) = setup().await;
        let ctx = TenantContext::for_tenant(tenant.clone());

        let placed = service
            .place_order(
                &ctx,
                order(
                    vec![("Widget", 2, "40.00", 1000), ("Gadget", 1, "20.00", 1000)],
                    Discount::Percentage(Rate::from_bps(1000)),
                ),
            )
            .await
            .unwrap();

        assert_eq!(placed.tenant_id, tenant);
        assert_eq!(placed.tax_mode, TaxMode::Exclusive);
        assert_eq!(placed.subtotal.to_fixed(2), "100.00");
        assert_eq!(placed.discount.to_fixed(2), "10.00");
        assert_eq!(placed.tax.to_fixed(2), "9.00");
        assert_eq!(placed.total.to_fixed(2), "99.00");

        let events = db.outbox().list_for_aggregate(&placed.id).await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].event().unwrap(),
            DomainEvent::OrderPlaced { .. }
        ));
    }

    #[tokio::test]
    async fn test_tenant_settings_drive_pricing() {
        let (service, _, settings, tenant) = setup().await;
        let ctx = TenantContext::for_tenant(tenant);

        settings
            .set(&ctx, TAX_MODE_SETTING, SettingValue::Text("inclusive".into()))
            .await
            .unwrap();
        settings
            .set(&ctx, CURRENCY_SCALE_SETTING, SettingValue::Integer(0))
            .await
            .unwrap();

        assert_eq!(service.pricing(&ctx).await.unwrap(), (TaxMode::Inclusive, 0));

        // 1100 including 10% tax: net 1000, tax 100
        let placed = service
            .place_order(&ctx, order(vec![("Workshop", 1, "1100", 1000)], Discount::None))
            .await
            .unwrap();
        assert_eq!(placed.currency_scale, 0);
        assert_eq!(placed.tax_mode, TaxMode::Inclusive);
        assert_eq!(placed.total.to_fixed(0), "1100");
        assert_eq!(placed.tax.to_fixed(0), "100");
    }

    #[tokio::test]
    async fn test_invalid_tax_mode_setting() {
        let (service, _, settings, tenant) = setup().await;
        let ctx = TenantContext::for_tenant(tenant);

        settings
            .set(&ctx, TAX_MODE_SETTING, SettingValue::Text("sometimes".into()))
            .await
            .unwrap();

        let err = service.pricing(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Core(CoreError::InvalidSettingValue { .. })
        ));
    }

    #[tokio::test]
    async fn test_unbound_context_cannot_place() {
        let (service, db, _, _) = setup().await;

        let err = service
            .place_order(
                &TenantContext::new(),
                order(vec![("Widget", 1, "10.00", 0)], Discount::None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::TenantNotBound)));
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_foreign_tenant_on_input_is_rejected() {
        let (service, _, _, tenant) = setup().await;
        let ctx = TenantContext::for_tenant(tenant);

        let mut input = order(vec![("Widget", 1, "10.00", 0)], Discount::None);
        input.tenant_id = Some(TenantId::generate());

        let err = service.place_order(&ctx, input).await.unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::TenantMismatch { .. })));
    }

    #[tokio::test]
    async fn test_empty_order_is_rejected() {
        let (service, _, _, tenant) = setup().await;
        let ctx = TenantContext::for_tenant(tenant);

        let err = service
            .place_order(&ctx, order(vec![], Discount::None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_invoice_and_lookup() {
        let (service, db, _, tenant) = setup().await;
        let ctx = TenantContext::for_tenant(tenant);

        let placed = service
            .place_order(&ctx, order(vec![("Widget", 3, "19.99", 2000)], Discount::None))
            .await
            .unwrap();

        let invoiced = service.invoice(&ctx, &placed.id).await.unwrap();
        assert_eq!(invoiced.status, OrderStatus::Invoiced);

        let (loaded, lines) = service.get_order(&ctx, &placed.id).await.unwrap();
        assert_eq!(loaded.status, OrderStatus::Invoiced);
        assert_eq!(lines.len(), 1);

        let names: Vec<String> = db
            .outbox()
            .list_for_aggregate(&placed.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(names, vec!["order.placed", "invoice.generated"]);

        // Invoiced orders cannot be cancelled
        assert!(service.cancel(&ctx, &placed.id).await.is_err());
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_invoice() {
        let (service, db, _, acme) = setup().await;
        let globex = db
            .tenants()
            .create(NewTenant {
                name: "Globex".into(),
                slug: "globex".into(),
            })
            .await
            .unwrap();

        let placed = service
            .place_order(
                &TenantContext::for_tenant(acme),
                order(vec![("Widget", 1, "10.00", 0)], Discount::None),
            )
            .await
            .unwrap();

        let err = service
            .invoice(&TenantContext::for_tenant(globex.id), &placed.id)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
