//! # Service Error Types
//!
//! Error types for the service layer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Service Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Lower layers  │  │     Runtime             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  ConfigError    │  │  Db (DbError)   │  │  Cache                  │ │
//! │  │  (load, parse,  │  │  Core           │  │  Listener               │ │
//! │  │   validate)     │  │  (CoreError)    │  │  ChannelError           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use thiserror::Error;

use keystone_core::{CoreError, ValidationError};
use keystone_db::DbError;

/// Result type alias for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Service error type.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage failure, including scope and tenant violations raised by
    /// the repositories.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Business rule failure (totals, tenancy, setting values).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Cache backend failure.
    #[error("Cache error: {0}")]
    Cache(String),

    /// A listener rejected an event.
    #[error("Listener {listener} failed: {reason}")]
    Listener { listener: String, reason: String },

    /// Internal channel closed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// Creates a listener failure.
    pub fn listener(listener: impl Into<String>, reason: impl ToString) -> Self {
        ServiceError::Listener {
            listener: listener.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the underlying failure is a missing row.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Db(e) if e.is_not_found())
    }
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Core(CoreError::Validation(err))
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(err: redis::RedisError) -> Self {
        ServiceError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Cache(format!("payload encoding: {}", err))
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration values failed validation.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The config file could not be read or written.
    #[error("Config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No explicit path and no platform config directory.
    #[error("No config path available")]
    NoPath,
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_converts_through_core() {
        let err: ServiceError = ValidationError::Required {
            field: "customer_name".into(),
        }
        .into();
        assert!(matches!(err, ServiceError::Core(CoreError::Validation(_))));
    }

    #[test]
    fn test_not_found_detection() {
        let err: ServiceError = DbError::not_found("order", "abc").into();
        assert!(err.is_not_found());
        assert!(!ServiceError::Cache("down".into()).is_not_found());
    }
}
