//! Configuration loading with hierarchical merging.
//!
//! Core components never read files or environment variables; they take
//! configuration records as constructor input. This loader is the only
//! place configuration enters the process.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::models::GatePolicy;
use crate::services::event_bus::EventBusConfig;
use crate::services::executor::ExecutorConfig;
use crate::services::workflow_service::WorkflowConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid concurrency_limit: {0}. Must be at least 1")]
    InvalidConcurrencyLimit(usize),

    #[error("Invalid max_history_size: {0}. Must be at least 1")]
    InvalidHistorySize(usize),

    #[error("Invalid freshness_window_ms: {0}. Must be positive")]
    InvalidFreshnessWindow(u64),

    #[error("Invalid completed_retention_days: {0}. Must be at least 1")]
    InvalidRetentionDays(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Default filter directive: trace, debug, info, warn, or error.
    pub level: String,
    /// Output format: json or pretty.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Root configuration record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TaskgateConfig {
    pub workflow: WorkflowConfig,
    pub gates: GatePolicy,
    pub executor: ExecutorConfig,
    pub events: EventBusConfig,
    pub logging: LoggingConfig,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .taskgate/config.yaml (project config)
    /// 3. .taskgate/local.yaml (project local overrides, optional)
    /// 4. Environment variables (TASKGATE_* prefix, highest priority)
    ///
    /// Configuration is always project-local (pwd/.taskgate/) so one
    /// machine can host several projects with different settings.
    pub fn load() -> Result<TaskgateConfig> {
        let config: TaskgateConfig = Figment::new()
            .merge(Serialized::defaults(TaskgateConfig::default()))
            .merge(Yaml::file(".taskgate/config.yaml"))
            .merge(Yaml::file(".taskgate/local.yaml"))
            .merge(Env::prefixed("TASKGATE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<TaskgateConfig> {
        let config: TaskgateConfig = Figment::new()
            .merge(Serialized::defaults(TaskgateConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &TaskgateConfig) -> Result<(), ConfigError> {
        if config.executor.concurrency_limit == 0 {
            return Err(ConfigError::InvalidConcurrencyLimit(
                config.executor.concurrency_limit,
            ));
        }

        if config.events.max_history_size == 0 {
            return Err(ConfigError::InvalidHistorySize(config.events.max_history_size));
        }

        if config.gates.freshness_window_ms == 0 {
            return Err(ConfigError::InvalidFreshnessWindow(
                config.gates.freshness_window_ms,
            ));
        }

        if config.workflow.completed_retention_days == 0 {
            return Err(ConfigError::InvalidRetentionDays(
                config.workflow.completed_retention_days,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
