//! # Domain Events
//!
//! Plain data describing something that already happened in a tenant's
//! business. Events are written to the outbox in the same transaction as
//! the change that raised them, then dispatched to listeners.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderRepository::place ──► domain_events (outbox, same transaction)  │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │  EventDispatcher ──► DomainEvent::from_json ──► listeners              │
//! │                                   │                                     │
//! │                                   ▼                                     │
//! │  CreateQuotationOnOrderPlaced ──► QuotationCreated                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! ```json
//! { "event": "order_placed", "tenant_id": "…", "order_id": "…", … }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::tenant::TenantId;
use crate::types::{Order, Quotation, Setting};

/// Something that happened inside a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A sales order was placed.
    OrderPlaced {
        tenant_id: TenantId,
        order_id: String,
        order_number: String,
        customer_name: String,
        total: Money,
        occurred_at: DateTime<Utc>,
    },

    /// A quotation was drafted.
    QuotationCreated {
        tenant_id: TenantId,
        quotation_id: String,
        order_id: Option<String>,
        total: Money,
        occurred_at: DateTime<Utc>,
    },

    /// An order was invoiced.
    InvoiceGenerated {
        tenant_id: TenantId,
        order_id: String,
        total: Money,
        occurred_at: DateTime<Utc>,
    },

    /// A tenant setting changed.
    SettingUpdated {
        tenant_id: TenantId,
        key: String,
        group: String,
        occurred_at: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn order_placed(order: &Order) -> Self {
        DomainEvent::OrderPlaced {
            tenant_id: order.tenant_id.clone(),
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_name: order.customer_name.clone(),
            total: order.total,
            occurred_at: order.placed_at,
        }
    }

    pub fn quotation_created(quotation: &Quotation) -> Self {
        DomainEvent::QuotationCreated {
            tenant_id: quotation.tenant_id.clone(),
            quotation_id: quotation.id.clone(),
            order_id: quotation.order_id.clone(),
            total: quotation.total,
            occurred_at: quotation.created_at,
        }
    }

    pub fn invoice_generated(order: &Order) -> Self {
        DomainEvent::InvoiceGenerated {
            tenant_id: order.tenant_id.clone(),
            order_id: order.id.clone(),
            total: order.total,
            occurred_at: order.updated_at,
        }
    }

    pub fn setting_updated(setting: &Setting) -> Self {
        DomainEvent::SettingUpdated {
            tenant_id: setting.tenant_id.clone(),
            key: setting.key.clone(),
            group: setting.group.clone(),
            occurred_at: setting.updated_at,
        }
    }

    /// Stable dotted name used in logs and the outbox `event_type` column.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } => "order.placed",
            DomainEvent::QuotationCreated { .. } => "quotation.created",
            DomainEvent::InvoiceGenerated { .. } => "invoice.generated",
            DomainEvent::SettingUpdated { .. } => "setting.updated",
        }
    }

    /// Tenant the event happened in.
    pub fn tenant_id(&self) -> &TenantId {
        match self {
            DomainEvent::OrderPlaced { tenant_id, .. }
            | DomainEvent::QuotationCreated { tenant_id, .. }
            | DomainEvent::InvoiceGenerated { tenant_id, .. }
            | DomainEvent::SettingUpdated { tenant_id, .. } => tenant_id,
        }
    }

    /// Kind of entity the event is about.
    pub fn aggregate_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced { .. } | DomainEvent::InvoiceGenerated { .. } => "order",
            DomainEvent::QuotationCreated { .. } => "quotation",
            DomainEvent::SettingUpdated { .. } => "setting",
        }
    }

    /// Id of the entity the event is about (the key for settings).
    pub fn aggregate_id(&self) -> &str {
        match self {
            DomainEvent::OrderPlaced { order_id, .. }
            | DomainEvent::InvoiceGenerated { order_id, .. } => order_id,
            DomainEvent::QuotationCreated { quotation_id, .. } => quotation_id,
            DomainEvent::SettingUpdated { key, .. } => key,
        }
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::OrderPlaced { occurred_at, .. }
            | DomainEvent::QuotationCreated { occurred_at, .. }
            | DomainEvent::InvoiceGenerated { occurred_at, .. }
            | DomainEvent::SettingUpdated { occurred_at, .. } => *occurred_at,
        }
    }

    /// Serializes the event for the outbox payload column.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::EventSerialization(e.to_string()))
    }

    /// Parses an outbox payload.
    pub fn from_json(payload: &str) -> CoreResult<Self> {
        serde_json::from_str(payload).map_err(|e| CoreError::EventSerialization(e.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn placed() -> DomainEvent {
        DomainEvent::OrderPlaced {
            tenant_id: TenantId::generate(),
            order_id: "o-1".to_string(),
            order_number: "SO-1".to_string(),
            customer_name: "Initech".to_string(),
            total: Money::parse("42.50").unwrap(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_names_and_aggregates() {
        let event = placed();
        assert_eq!(event.name(), "order.placed");
        assert_eq!(event.aggregate_type(), "order");
        assert_eq!(event.aggregate_id(), "o-1");
    }

    #[test]
    fn test_payload_is_tagged() {
        let event = placed();
        let json = event.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["event"], "order_placed");
        assert_eq!(value["total"], "42.50");
        assert_eq!(DomainEvent::from_json(&json).unwrap(), event);
    }

    #[test]
    fn test_unknown_payload_is_rejected() {
        let err = DomainEvent::from_json(r#"{"event":"stock_moved"}"#).unwrap_err();
        assert!(matches!(err, CoreError::EventSerialization(_)));
    }

    #[test]
    fn test_setting_event_uses_key_as_aggregate() {
        let event = DomainEvent::SettingUpdated {
            tenant_id: TenantId::generate(),
            key: "sales.tax_mode".to_string(),
            group: "sales".to_string(),
            occurred_at: Utc::now(),
        };
        assert_eq!(event.aggregate_id(), "sales.tax_mode");
        assert_eq!(event.name(), "setting.updated");
    }
}
