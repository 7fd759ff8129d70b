//! Configuration management
//!
//! This module provides configuration file support with TOML format,
//! environment variable overrides, and sensible defaults.
//!
//! ```toml
//! [query]
//! worker_memory_budget_bytes = 67108864
//! estimated_source_count = 8
//! interpolation_limit_nanos = 20000000000
//! read_timeout_ms = 5000
//!
//! [monitoring]
//! metrics_enabled = true
//! log_level = "info"
//! ```

use crate::error::{Error, Result};
use crate::query::executor::ExecutorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Query execution settings
    #[serde(default)]
    pub query: QueryConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Query execution configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Bytes one query pass may hold in decoded spans
    #[serde(default = "default_worker_memory_budget")]
    pub worker_memory_budget_bytes: i64,

    /// Expected number of sources per metric, used to size chunks
    #[serde(default = "default_estimated_source_count")]
    pub estimated_source_count: i64,

    /// Default largest gap interpolated across (0 = unlimited)
    #[serde(default)]
    pub interpolation_limit_nanos: i64,

    /// Deadline for a single store read in milliseconds (0 = none)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Monitoring configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Record Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace)
    ///
    /// This crate only emits `tracing` events. The embedding service reads
    /// this value when it installs its subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_worker_memory_budget() -> i64 { 64 * 1024 * 1024 }
fn default_estimated_source_count() -> i64 { 8 }
fn default_read_timeout_ms() -> u64 { 30_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            worker_memory_budget_bytes: default_worker_memory_budget(),
            estimated_source_count: default_estimated_source_count(),
            interpolation_limit_nanos: 0,
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        // Query
        if let Some(v) = env_parse("ROLLUP_WORKER_MEMORY_BUDGET") {
            self.query.worker_memory_budget_bytes = v;
        }
        if let Some(v) = env_parse("ROLLUP_ESTIMATED_SOURCE_COUNT") {
            self.query.estimated_source_count = v;
        }
        if let Some(v) = env_parse("ROLLUP_INTERPOLATION_LIMIT_NANOS") {
            self.query.interpolation_limit_nanos = v;
        }
        if let Some(v) = env_parse("ROLLUP_READ_TIMEOUT_MS") {
            self.query.read_timeout_ms = v;
        }

        // Monitoring
        if let Some(v) = env_parse("ROLLUP_METRICS_ENABLED") {
            self.monitoring.metrics_enabled = v;
        }
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.query.worker_memory_budget_bytes <= 0 {
            return Err(Error::Configuration(
                "Worker memory budget must be > 0".to_string(),
            ));
        }
        if self.query.estimated_source_count <= 0 {
            return Err(Error::Configuration(
                "Estimated source count must be > 0".to_string(),
            ));
        }
        if self.query.interpolation_limit_nanos < 0 {
            return Err(Error::Configuration(
                "Interpolation limit cannot be negative".to_string(),
            ));
        }
        const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
        if !LEVELS.contains(&self.monitoring.log_level.to_ascii_lowercase().as_str()) {
            return Err(Error::Configuration(format!(
                "Unknown log level '{}'",
                self.monitoring.log_level
            )));
        }
        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Executor settings derived from this configuration
    pub fn executor_config(&self) -> ExecutorConfig {
        let read_timeout = (self.query.read_timeout_ms > 0)
            .then(|| Duration::from_millis(self.query.read_timeout_ms));

        ExecutorConfig {
            worker_memory_budget: self.query.worker_memory_budget_bytes,
            estimated_source_count: self.query.estimated_source_count,
            interpolation_limit_nanos: self.query.interpolation_limit_nanos,
            read_timeout,
            metrics_enabled: self.monitoring.metrics_enabled,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.query.estimated_source_count, 8);
        assert!(config.monitoring.metrics_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_budget() {
        let mut config = Config::default();
        config.query.worker_memory_budget_bytes = 0;
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.monitoring.log_level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollup.toml");
        std::fs::write(&path, "[query]\nestimated_source_count = 3\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.query.estimated_source_count, 3);
        assert_eq!(
            config.query.worker_memory_budget_bytes,
            default_worker_memory_budget()
        );
        assert_eq!(config.monitoring.log_level, "info");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");

        let mut config = Config::default();
        config.query.read_timeout_ms = 0;
        config.query.interpolation_limit_nanos = 20_000_000_000;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let exec = loaded.executor_config();
        assert_eq!(exec.read_timeout, None);
        assert_eq!(exec.interpolation_limit_nanos, 20_000_000_000);
    }

    #[test]
    fn test_log_level_is_loaded_for_the_embedding_service() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logging.toml");
        std::fs::write(&path, "[monitoring]\nlog_level = \"debug\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.monitoring.log_level, "debug");
        assert!(config.monitoring.metrics_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("ROLLUP_ESTIMATED_SOURCE_COUNT", "42");
        let config = Config::from_env();
        assert_eq!(config.query.estimated_source_count, 42);
        std::env::remove_var("ROLLUP_ESTIMATED_SOURCE_COUNT");
    }
}
