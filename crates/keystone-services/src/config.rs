//! # Application Configuration
//!
//! Configuration for the Keystone services and the worker.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KEYSTONE_DB_PATH=/var/lib/keystone/keystone.db                     │
//! │     KEYSTONE_CACHE_BACKEND=redis                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     $KEYSTONE_CONFIG, or                                               │
//! │     ~/.config/keystone/keystone.toml (Linux)                           │
//! │     ~/Library/Application Support/com.keystone.erp/keystone.toml (mac) │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # keystone.toml
//! [database]
//! path = "/var/lib/keystone/keystone.db"
//! max_connections = 5
//!
//! [cache]
//! backend = "redis"          # memory | redis
//! redis_url = "redis://127.0.0.1:6379"
//! ttl_secs = 300             # 0 = never expire
//!
//! [events]
//! poll_interval_ms = 1000
//! batch_size = 50
//! max_attempts = 5
//! retention_days = 7
//!
//! [sales]
//! quotation_validity_days = 30
//! currency_scale = 2
//! tax_mode = "exclusive"     # exclusive | inclusive
//! ```
//!
//! The `[sales]` values are fallbacks: a tenant's own `sales.*` settings
//! take precedence at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use keystone_core::{TaxMode, DEFAULT_QUOTATION_VALIDITY_DAYS, DEFAULT_SCALE, MAX_SCALE};
use keystone_db::DbConfig;

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "KEYSTONE_CONFIG";

// =============================================================================
// Database
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("keystone.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Cache
// =============================================================================

/// Which settings cache backs the [`SettingService`](crate::SettingService).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local map. Each worker has its own copy.
    #[default]
    Memory,

    /// Shared Redis instance.
    Redis,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::Redis => write!(f, "redis"),
        }
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(CacheBackend::Memory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(ConfigError::invalid(format!(
                "unknown cache backend '{}' (expected memory or redis)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Required when `backend = "redis"`.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Entry lifetime in seconds; 0 keeps entries until invalidated.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    300
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            backend: CacheBackend::default(),
            redis_url: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheSettings {
    /// Entry lifetime, `None` when entries never expire.
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSettings {
    /// How often the dispatcher polls the outbox.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Events fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Failed deliveries after which an event is left alone.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Dispatched events older than this are purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// How often the purge runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_batch_size() -> u32 {
    50
}
fn default_max_attempts() -> u32 {
    5
}
fn default_retention_days() -> u32 {
    7
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}

impl Default for EventSettings {
    fn default() -> Self {
        EventSettings {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retention_days: default_retention_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl EventSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

// =============================================================================
// Sales defaults
// =============================================================================

/// Fallbacks for tenants that have not configured their own `sales.*`
/// settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesSettings {
    #[serde(default = "default_validity_days")]
    pub quotation_validity_days: i64,

    #[serde(default = "default_currency_scale")]
    pub currency_scale: u32,

    #[serde(default)]
    pub tax_mode: TaxMode,
}

fn default_validity_days() -> i64 {
    DEFAULT_QUOTATION_VALIDITY_DAYS
}

fn default_currency_scale() -> u32 {
    DEFAULT_SCALE
}

impl Default for SalesSettings {
    fn default() -> Self {
        SalesSettings {
            quotation_validity_days: default_validity_days(),
            currency_scale: default_currency_scale(),
            tax_mode: TaxMode::default(),
        }
    }
}

// =============================================================================
// Application Config
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub sales: SalesSettings,
}

impl AppConfig {
    /// Loads configuration from file and environment.
    ///
    /// The file is `config_path` when given, else `$KEYSTONE_CONFIG`, else
    /// the platform config directory. A missing file is not an error.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        let path = config_path
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_config_path);

        if let Some(path) = path {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path: path.clone(), source })?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Io { path: parent.to_path_buf(), source })?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|source| ConfigError::Io { path: path.clone(), source })?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid(
                "database.max_connections must be greater than 0",
            ));
        }

        if self.cache.backend == CacheBackend::Redis {
            match self.cache.redis_url.as_deref() {
                None | Some("") => {
                    return Err(ConfigError::invalid(
                        "cache.redis_url is required when backend = \"redis\"",
                    ));
                }
                Some(url) if !url.starts_with("redis://") && !url.starts_with("rediss://") => {
                    return Err(ConfigError::invalid(format!(
                        "cache.redis_url must start with redis:// or rediss://, got: {}",
                        url
                    )));
                }
                Some(_) => {}
            }
        }

        if self.events.batch_size == 0 {
            return Err(ConfigError::invalid("events.batch_size must be greater than 0"));
        }
        if self.events.max_attempts == 0 {
            return Err(ConfigError::invalid("events.max_attempts must be greater than 0"));
        }
        if self.events.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "events.poll_interval_ms must be greater than 0",
            ));
        }
        if self.events.cleanup_interval_secs == 0 {
            return Err(ConfigError::invalid(
                "events.cleanup_interval_secs must be greater than 0",
            ));
        }

        if self.sales.currency_scale > MAX_SCALE {
            return Err(ConfigError::invalid(format!(
                "sales.currency_scale must be between 0 and {}",
                MAX_SCALE
            )));
        }
        if self.sales.quotation_validity_days <= 0 {
            return Err(ConfigError::invalid(
                "sales.quotation_validity_days must be greater than 0",
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides from a variable lookup. Unparseable values are
    /// logged and ignored.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("KEYSTONE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(backend) = lookup("KEYSTONE_CACHE_BACKEND") {
            match backend.parse() {
                Ok(parsed) => self.cache.backend = parsed,
                Err(_) => warn!(backend = %backend, "Unknown cache backend in environment"),
            }
        }

        if let Some(url) = lookup("KEYSTONE_REDIS_URL") {
            debug!("Overriding redis URL from environment");
            self.cache.redis_url = Some(url);
        }

        if let Some(ttl) = lookup("KEYSTONE_CACHE_TTL_SECS") {
            match ttl.parse::<u64>() {
                Ok(secs) => self.cache.ttl_secs = secs,
                Err(_) => warn!(ttl = %ttl, "Invalid KEYSTONE_CACHE_TTL_SECS"),
            }
        }

        if let Some(poll) = lookup("KEYSTONE_EVENT_POLL_MS") {
            match poll.parse::<u64>() {
                Ok(ms) => {
                    debug!(poll_ms = ms, "Overriding event poll interval from environment");
                    self.events.poll_interval_ms = ms;
                }
                Err(_) => warn!(poll = %poll, "Invalid KEYSTONE_EVENT_POLL_MS"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "keystone", "erp")
            .map(|dirs| dirs.config_dir().join("keystone.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool configuration for [`keystone_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.events.batch_size, 50);
        assert_eq!(config.sales.currency_scale, 2);
        assert_eq!(config.sales.tax_mode, TaxMode::Exclusive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("memory".parse::<CacheBackend>().unwrap(), CacheBackend::Memory);
        assert_eq!("Redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert!("memcached".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();

        config.events.batch_size = 0;
        assert!(config.validate().is_err());
        config.events.batch_size = 10;

        config.events.cleanup_interval_secs = 0;
        assert!(config.validate().is_err());
        config.events.cleanup_interval_secs = 3600;

        // Redis without a URL
        config.cache.backend = CacheBackend::Redis;
        assert!(config.validate().is_err());

        config.cache.redis_url = Some("http://localhost:6379".into());
        assert!(config.validate().is_err());

        config.cache.redis_url = Some("redis://localhost:6379".into());
        assert!(config.validate().is_ok());

        config.sales.currency_scale = MAX_SCALE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ttl_zero_means_no_expiry() {
        let mut cache = CacheSettings::default();
        assert_eq!(cache.ttl(), Some(Duration::from_secs(300)));
        cache.ttl_secs = 0;
        assert_eq!(cache.ttl(), None);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KEYSTONE_DB_PATH", "/tmp/override.db"),
            ("KEYSTONE_CACHE_BACKEND", "redis"),
            ("KEYSTONE_REDIS_URL", "redis://cache:6379"),
            ("KEYSTONE_CACHE_TTL_SECS", "not-a-number"),
            ("KEYSTONE_EVENT_POLL_MS", "250"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.cache.backend, CacheBackend::Redis);
        assert_eq!(config.cache.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.cache.ttl_secs, 300); // bad value ignored
        assert_eq!(config.events.poll_interval_ms, 250);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystone.toml");
        std::fs::write(
            &path,
            r#"
            [events]
            batch_size = 10

            [sales]
            tax_mode = "inclusive"
            currency_scale = 0
            "#,
        )
        .unwrap();

        let config = AppConfig::load(Some(path)).unwrap();
        assert_eq!(config.events.batch_size, 10);
        assert_eq!(config.events.max_attempts, 5);
        assert_eq!(config.sales.tax_mode, TaxMode::Inclusive);
        assert_eq!(config.sales.currency_scale, 0);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystone.toml");
        std::fs::write(&path, "[events]\nbatch_size = 0\n").unwrap();

        assert!(matches!(
            AppConfig::load(Some(path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keystone.toml");

        let mut config = AppConfig::default();
        config.sales.quotation_validity_days = 14;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[sales]"));

        let reloaded = AppConfig::load(Some(path)).unwrap();
        assert_eq!(reloaded.sales.quotation_validity_days, 14);
    }
}
