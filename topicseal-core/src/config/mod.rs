//! Configuration management for topicseal
//!
//! Defaults, overridden by a TOML file and/or `TOPICSEAL_*` environment
//! variables, validated before use.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod error;
mod feature_flags;

pub use error::ConfigError;
pub use feature_flags::FeatureFlags;

use crate::logging::LogLevel;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server-side storage
    pub store: StoreConfig,

    /// Client caches
    pub client: ClientConfig,

    /// Consistency reconciler
    pub reconciler: ReconcilerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Feature flags
    pub features: FeatureFlags,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding topics, participants and key records
    pub database_path: PathBuf,

    /// Directory of the local identity keystore
    pub keystore_dir: PathBuf,

    /// Maximum pooled database connections
    pub pool_size: u32,
}

/// Client cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Quiet period before a debounced identity lookup is sent
    #[serde(with = "humantime_serde")]
    pub lookup_debounce: Duration,
}

/// Reconciler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Time between periodic passes
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Topics reconciled concurrently
    pub concurrency: usize,

    /// Grace period granted on shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./topicseal.db"),
            keystore_dir: PathBuf::from("./keys"),
            pool_size: 4,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            lookup_debounce: Duration::from_millis(500),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            concurrency: 4,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e)))
}

fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value.trim())
        .map_err(|e| ConfigError::InvalidValue(format!("{}: {}", key, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: TOPICSEAL_<SECTION>_<KEY>
    /// Example: TOPICSEAL_RECONCILER_INTERVAL=15m
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from variables resolved through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Store config
        if let Some(path) = lookup("TOPICSEAL_STORE_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("TOPICSEAL_STORE_KEYSTORE_DIR") {
            self.store.keystore_dir = PathBuf::from(dir);
        }
        if let Some(size) = lookup("TOPICSEAL_STORE_POOL_SIZE") {
            self.store.pool_size = parse_var("TOPICSEAL_STORE_POOL_SIZE", &size)?;
        }

        // Client config
        if let Some(window) = lookup("TOPICSEAL_CLIENT_LOOKUP_DEBOUNCE") {
            self.client.lookup_debounce =
                parse_duration("TOPICSEAL_CLIENT_LOOKUP_DEBOUNCE", &window)?;
        }

        // Reconciler config
        if let Some(interval) = lookup("TOPICSEAL_RECONCILER_INTERVAL") {
            self.reconciler.interval =
                parse_duration("TOPICSEAL_RECONCILER_INTERVAL", &interval)?;
        }
        if let Some(concurrency) = lookup("TOPICSEAL_RECONCILER_CONCURRENCY") {
            self.reconciler.concurrency =
                parse_var("TOPICSEAL_RECONCILER_CONCURRENCY", &concurrency)?;
        }

        // Logging config
        if let Some(level) = lookup("TOPICSEAL_LOG_LEVEL") {
            self.logging.level = level.trim().to_lowercase();
        }
        if let Some(json) = lookup("TOPICSEAL_LOG_JSON") {
            self.logging.json_format = parse_var("TOPICSEAL_LOG_JSON", &json)?;
        }

        // Feature flags
        if let Some(enabled) = lookup("TOPICSEAL_FEATURES_ENCRYPTION_ENABLED") {
            self.features.encryption_enabled =
                parse_var("TOPICSEAL_FEATURES_ENCRYPTION_ENABLED", &enabled)?;
        }
        if let Some(groups) = lookup("TOPICSEAL_FEATURES_ALLOWED_GROUPS") {
            self.features.allowed_groups = FeatureFlags::parse_groups(&groups);
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.pool_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "pool_size must be greater than 0".to_string(),
            ));
        }

        if self.client.lookup_debounce.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "lookup_debounce must be greater than 0".to_string(),
            ));
        }

        if self.reconciler.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "reconciler concurrency must be greater than 0".to_string(),
            ));
        }
        if self.reconciler.interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "reconciler interval must be greater than 0".to_string(),
            ));
        }

        if LogLevel::from_str(&self.logging.level).is_err() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}
