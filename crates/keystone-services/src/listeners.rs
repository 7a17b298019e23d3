//! # Event Listeners
//!
//! Listeners registered with the [`EventDispatcher`](crate::EventDispatcher).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

use keystone_core::{CoreError, DomainEvent, NewQuotation, TenantContext, TenantId};
use keystone_db::{Database, DbError, TenantScope};

use crate::error::ServiceResult;
use crate::events::EventListener;
use crate::settings::SettingService;

/// Tenant setting overriding how long generated quotations stay valid.
pub const QUOTATION_VALIDITY_SETTING: &str = "sales.quotation_validity_days";

/// Creates a draft quotation for every placed order.
///
/// Delivery is at-least-once, so an order that already has a quotation is
/// left alone.
pub struct CreateQuotationOnOrderPlaced {
    db: Database,
    settings: Arc<SettingService>,
    default_validity_days: i64,
}

impl CreateQuotationOnOrderPlaced {
    /// `default_validity_days` applies to tenants without their own
    /// `sales.quotation_validity_days` setting.
    pub fn new(db: Database, settings: Arc<SettingService>, default_validity_days: i64) -> Self {
        CreateQuotationOnOrderPlaced {
            db,
            settings,
            default_validity_days,
        }
    }

    async fn validity_days(&self, ctx: &TenantContext) -> ServiceResult<i64> {
        let days = self
            .settings
            .get_i64(ctx, QUOTATION_VALIDITY_SETTING, self.default_validity_days)
            .await?;

        if days <= 0 {
            return Err(CoreError::InvalidSettingValue {
                key: QUOTATION_VALIDITY_SETTING.to_string(),
                value_type: "integer".to_string(),
                reason: format!("must be positive, got {}", days),
            }
            .into());
        }
        Ok(days)
    }
}

#[async_trait]
impl EventListener for CreateQuotationOnOrderPlaced {
    fn name(&self) -> &str {
        "create_quotation_on_order_placed"
    }

    fn handles(&self, event: &DomainEvent) -> bool {
        matches!(event, DomainEvent::OrderPlaced { .. })
    }

    async fn handle(&self, ctx: &TenantContext, event: &DomainEvent) -> ServiceResult<()> {
        let DomainEvent::OrderPlaced {
            tenant_id,
            order_id,
            order_number,
            ..
        } = event
        else {
            return Ok(());
        };

        ensure_same_tenant(ctx, tenant_id)?;
        let scope = TenantScope::current(ctx)?;
        let quotations = self.db.quotations(scope.clone());

        if let Some(existing) = quotations.find_by_order(order_id).await? {
            debug!(
                order_id = %order_id,
                quotation = %existing.quotation_number,
                "Quotation already exists for order"
            );
            return Ok(());
        }

        let order = self
            .db
            .orders(scope)
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", order_id.as_str()))?;

        let days = self.validity_days(ctx).await?;
        let valid_until = Utc::now() + Duration::days(days);

        match quotations.create(NewQuotation::from_order(&order, valid_until)).await {
            Ok(quotation) => {
                info!(
                    tenant_id = %tenant_id,
                    order = %order_number,
                    quotation = %quotation.quotation_number,
                    valid_days = days,
                    "Created quotation for placed order"
                );
                Ok(())
            }
            // A concurrent delivery got there first
            Err(e) if e.is_unique_violation() => {
                debug!(order_id = %order_id, "Quotation created concurrently");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn ensure_same_tenant(ctx: &TenantContext, event_tenant: &TenantId) -> ServiceResult<()> {
    let bound = ctx.require()?;
    if &bound != event_tenant {
        return Err(CoreError::TenantMismatch {
            expected: bound.to_string(),
            actual: event_tenant.to_string(),
        }
        .into());
    }
    Ok(())
}
