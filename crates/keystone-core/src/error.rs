//! # Error Types
//!
//! Domain-specific error types for keystone-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  keystone-core errors (this file)                                      │
//! │  ├── CoreError        - Tenancy and calculation failures               │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  keystone-db errors                                                    │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  keystone-services errors                                              │
//! │  └── ServiceError     - Cache, dispatch, orchestration failures        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ServiceError            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An operation needed the current tenant but none was bound.
    ///
    /// ## When This Occurs
    /// - A background job forgot to bind the tenant of the event it handles
    /// - A repository was asked for a tenant scope from an empty context
    #[error("No tenant is bound to the current context")]
    TenantNotBound,

    /// An entity carries a tenant that differs from the bound one.
    ///
    /// ## When This Occurs
    /// ```text
    /// context bound to tenant A
    ///      │
    ///      ▼
    /// NewOrder { tenant_id: Some(B) } ──► stamp() ──► TenantMismatch
    /// ```
    #[error("Entity belongs to tenant {actual}, but the current tenant is {expected}")]
    TenantMismatch { expected: String, actual: String },

    /// A monetary amount is not acceptable for the operation.
    #[error("Invalid amount for {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    /// The discount would push the taxable amount below zero.
    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: String, subtotal: String },

    /// Requested scale is outside the supported range.
    #[error("Scale {requested} exceeds maximum allowed ({max})")]
    InvalidScale { requested: u32, max: u32 },

    /// Arithmetic overflowed the decimal range.
    #[error("Arithmetic overflow while computing {0}")]
    Overflow(String),

    /// A stored setting could not be decoded into its declared type.
    #[error("Setting '{key}' has invalid {value_type} value: {reason}")]
    InvalidSettingValue {
        key: String,
        value_type: String,
        reason: String,
    },

    /// A status change that the entity's lifecycle does not allow.
    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidStatusTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// An event payload could not be encoded or decoded.
    #[error("Event serialization failed: {0}")]
    EventSerialization(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: String, max: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

impl ValidationError {
    /// Shorthand for an [`ValidationError::InvalidFormat`] error.
    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
