//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cooldown: CooldownConfig,
    pub cache: CacheConfig,
    pub maintenance: MaintenanceConfig,
    pub logging: LoggingConfig,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Cooldown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    /// How long a pair cools after an unfollow (default: 300)
    pub ttl_seconds: u64,
    /// Maximum pairs tracked in memory (default: 10000)
    pub max_tracked_pairs: usize,
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum cached values (default: 10000)
    pub max_entries: usize,
}

/// Background maintenance configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Interval between cooldown/cache maintenance passes (default: 60)
    pub interval_seconds: u64,
    /// Counter reconciliation job
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Counter reconciliation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileConfig {
    /// Enable the scheduled reconciliation job
    pub enabled: bool,
    /// Reconciliation interval in seconds (default: 86400 = 24h)
    pub interval_seconds: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 86_400,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FOLLOWGRAPH_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("database.path", "data/followgraph.db")?
            .set_default("cooldown.ttl_seconds", 300)?
            .set_default("cooldown.max_tracked_pairs", 10_000)?
            .set_default("cache.max_entries", 10_000)?
            .set_default("maintenance.interval_seconds", 60)?
            .set_default("maintenance.reconcile.enabled", false)?
            .set_default("maintenance.reconcile.interval_seconds", 86_400)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FOLLOWGRAPH_*)
            .add_source(
                Environment::with_prefix("FOLLOWGRAPH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.cooldown.ttl_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "cooldown.ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(crate::error::AppError::Config(
                "cache.max_entries must be greater than 0".to_string(),
            ));
        }

        if self.maintenance.reconcile.enabled && self.maintenance.reconcile.interval_seconds == 0 {
            return Err(crate::error::AppError::Config(
                "maintenance.reconcile.interval_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/followgraph-test.db"),
            },
            cooldown: CooldownConfig {
                ttl_seconds: 300,
                max_tracked_pairs: 10_000,
            },
            cache: CacheConfig {
                max_entries: 10_000,
            },
            maintenance: MaintenanceConfig {
                interval_seconds: 60,
                reconcile: ReconcileConfig::default(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        let config = valid_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_cooldown_ttl() {
        let mut config = valid_config();
        config.cooldown.ttl_seconds = 0;

        let error = config
            .validate()
            .expect_err("zero cooldown TTL must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("cooldown.ttl_seconds")
        ));
    }

    #[test]
    fn validate_rejects_zero_cache_capacity() {
        let mut config = valid_config();
        config.cache.max_entries = 0;

        let error = config
            .validate()
            .expect_err("zero cache capacity must fail");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("cache.max_entries")
        ));
    }

    #[test]
    fn validate_rejects_zero_reconcile_interval_when_enabled() {
        let mut config = valid_config();
        config.maintenance.reconcile.enabled = true;
        config.maintenance.reconcile.interval_seconds = 0;

        let error = config
            .validate()
            .expect_err("enabled reconciliation needs an interval");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("reconcile.interval_seconds")
        ));
    }
}
