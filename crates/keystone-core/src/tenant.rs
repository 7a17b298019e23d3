//! # Tenancy
//!
//! Tenant identity, the per-unit-of-work tenant context, and the stamping
//! rule applied to new records.
//!
//! ## How Tenancy Flows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tenant Context Flow                              │
//! │                                                                         │
//! │  Job / event / request arrives for tenant T                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TenantContext::for_tenant(T)      ← one context per unit of work      │
//! │       │                                                                 │
//! │       ├──► reads:  TenantScope::current(&ctx)                          │
//! │       │            SELECT … WHERE tenant_id = T                        │
//! │       │                                                                 │
//! │       └──► writes: ctx.stamp(&mut new_record)                          │
//! │                    tenant_id = None → T                                │
//! │                    tenant_id = T    → ok                               │
//! │                    tenant_id = U    → TenantMismatch                   │
//! │                                                                         │
//! │  Nothing bound?  require() → TenantNotBound (fail closed)              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};

// =============================================================================
// Tenant Id
// =============================================================================

/// Identifier of a tenant (a UUID in canonical hyphenated form).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Parses and normalizes a tenant id.
    ///
    /// ```rust
    /// use keystone_core::tenant::TenantId;
    ///
    /// let id = TenantId::parse("6F9619FF-8B86-D011-B42D-00C04FC964FF").unwrap();
    /// assert_eq!(id.as_str(), "6f9619ff-8b86-d011-b42d-00c04fc964ff");
    /// assert!(TenantId::parse("acme").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let uuid = Uuid::parse_str(raw.trim())
            .map_err(|e| ValidationError::invalid_format("tenant_id", e.to_string()))?;
        Ok(TenantId(uuid.hyphenated().to_string()))
    }

    /// Generates a fresh tenant id.
    pub fn generate() -> Self {
        TenantId(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TenantId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TenantId::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl std::str::FromStr for TenantId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TenantId::parse(s)
    }
}

// =============================================================================
// Belongs To Tenant
// =============================================================================

/// Implemented by records that live in a tenant-owned table.
pub trait BelongsToTenant {
    /// The tenant the record is assigned to, if any yet.
    fn tenant_id(&self) -> Option<&TenantId>;

    /// Assigns the record to `tenant`.
    fn assign_tenant(&mut self, tenant: TenantId);
}

// =============================================================================
// Tenant Context
// =============================================================================

/// Holds the tenant the current unit of work acts for.
///
/// Cloning a context shares the binding, so a job can hand its context to
/// the repositories it calls. Independent jobs create independent contexts;
/// a context is never shared between tenants running concurrently.
///
/// ## Example
/// ```rust
/// use keystone_core::tenant::{TenantContext, TenantId};
///
/// let ctx = TenantContext::new();
/// assert!(ctx.require().is_err());
///
/// let tenant = TenantId::generate();
/// ctx.bind(tenant.clone());
/// assert_eq!(ctx.require().unwrap(), tenant);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TenantContext {
    current: Arc<RwLock<Option<TenantId>>>,
}

impl TenantContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context already bound to `tenant`.
    pub fn for_tenant(tenant: TenantId) -> Self {
        TenantContext {
            current: Arc::new(RwLock::new(Some(tenant))),
        }
    }

    /// Binds `tenant` as the current tenant, replacing any previous one.
    pub fn bind(&self, tenant: TenantId) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(tenant);
    }

    /// Clears the binding.
    pub fn forget(&self) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    /// Returns the bound tenant, if any.
    pub fn current(&self) -> Option<TenantId> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns true if a tenant is bound.
    pub fn is_bound(&self) -> bool {
        self.current().is_some()
    }

    /// Returns the bound tenant or [`CoreError::TenantNotBound`].
    pub fn require(&self) -> CoreResult<TenantId> {
        self.current().ok_or(CoreError::TenantNotBound)
    }

    /// Stamps the current tenant onto a record about to be created.
    ///
    /// ## Rules
    /// - record without tenant → assigned the current tenant
    /// - record with the current tenant → unchanged
    /// - record with another tenant → [`CoreError::TenantMismatch`]
    pub fn stamp<E: BelongsToTenant>(&self, entity: &mut E) -> CoreResult<TenantId> {
        let current = self.require()?;

        match entity.tenant_id() {
            None => {
                entity.assign_tenant(current.clone());
                Ok(current)
            }
            Some(existing) if *existing == current => Ok(current),
            Some(existing) => Err(CoreError::TenantMismatch {
                expected: current.to_string(),
                actual: existing.to_string(),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Record {
        tenant_id: Option<TenantId>,
    }

    impl BelongsToTenant for Record {
        fn tenant_id(&self) -> Option<&TenantId> {
            self.tenant_id.as_ref()
        }

        fn assign_tenant(&mut self, tenant: TenantId) {
            self.tenant_id = Some(tenant);
        }
    }

    #[test]
    fn test_parse_normalizes_case() {
        let upper = TenantId::parse("00000000-0000-0000-0000-00000000000A").unwrap();
        let lower = TenantId::parse("00000000-0000-0000-0000-00000000000a").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_parse_rejects_non_uuid() {
        assert!(TenantId::parse("").is_err());
        assert!(TenantId::parse("tenant-1").is_err());
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let id = TenantId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let bad: Result<TenantId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_bind_and_forget() {
        let ctx = TenantContext::new();
        assert!(!ctx.is_bound());

        let tenant = TenantId::generate();
        ctx.bind(tenant.clone());
        assert_eq!(ctx.current(), Some(tenant));

        ctx.forget();
        assert!(matches!(ctx.require(), Err(CoreError::TenantNotBound)));
    }

    #[test]
    fn test_clones_share_binding() {
        let ctx = TenantContext::new();
        let shared = ctx.clone();
        ctx.bind(TenantId::generate());
        assert!(shared.is_bound());
    }

    #[test]
    fn test_independent_contexts_do_not_leak() {
        let a = TenantContext::for_tenant(TenantId::generate());
        let b = TenantContext::for_tenant(TenantId::generate());
        assert_ne!(a.current(), b.current());
    }

    #[test]
    fn test_stamp_assigns_missing_tenant() {
        let tenant = TenantId::generate();
        let ctx = TenantContext::for_tenant(tenant.clone());

        let mut record = Record::default();
        let stamped = ctx.stamp(&mut record).unwrap();

        assert_eq!(stamped, tenant);
        assert_eq!(record.tenant_id, Some(tenant));
    }

    #[test]
    fn test_stamp_accepts_same_tenant() {
        let tenant = TenantId::generate();
        let ctx = TenantContext::for_tenant(tenant.clone());

        let mut record = Record {
            tenant_id: Some(tenant.clone()),
        };
        assert!(ctx.stamp(&mut record).is_ok());
    }

    #[test]
    fn test_stamp_rejects_foreign_tenant() {
        let ctx = TenantContext::for_tenant(TenantId::generate());
        let mut record = Record {
            tenant_id: Some(TenantId::generate()),
        };

        assert!(matches!(
            ctx.stamp(&mut record),
            Err(CoreError::TenantMismatch { .. })
        ));
    }

    #[test]
    fn test_stamp_requires_binding() {
        let ctx = TenantContext::new();
        let mut record = Record::default();
        assert!(matches!(
            ctx.stamp(&mut record),
            Err(CoreError::TenantNotBound)
        ));
        assert!(record.tenant_id.is_none());
    }
}
