//! Configuration loading.
//!
//! Hierarchical merge: programmatic defaults, then a project-local YAML
//! file, then `CONDUCTOR_*` environment variables (highest priority).

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::pool::PoolConfig;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_concurrent_tasks: {0}. Must be at least 1")]
    InvalidMaxConcurrentTasks(usize),

    #[error("Invalid pool sizing: min_agents ({min}) must not exceed max_agents ({max})")]
    InvalidPoolSizing { min: usize, max: usize },

    #[error("Invalid max_agents: {0}. Must be at least 1")]
    InvalidMaxAgents(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid acquire_backoff_ms: {0}. Must be positive")]
    InvalidBackoff(u64),
}

/// Executor tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Simulated per-step delay in milliseconds.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    /// Backoff while the agent pool is exhausted, in milliseconds.
    #[serde(default = "default_acquire_backoff_ms")]
    pub acquire_backoff_ms: u64,
}

const fn default_step_delay_ms() -> u64 {
    400
}

const fn default_acquire_backoff_ms() -> u64 {
    100
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            acquire_backoff_ms: default_acquire_backoff_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Minimum level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for file output. Stderr only when absent.
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of concurrently running orchestrator tasks.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Agent pool sizing.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Executor tuning.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_concurrent_tasks() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            pool: PoolConfig::default(),
            executor: ExecutorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `conductor.yaml` in the working directory
    /// 3. Environment variables (`CONDUCTOR_*`, `__` as section separator)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("conductor.yaml"))
            .merge(Env::prefixed("CONDUCTOR_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context("Failed to extract configuration from file")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.max_concurrent_tasks == 0 {
            return Err(ConfigError::InvalidMaxConcurrentTasks(
                config.max_concurrent_tasks,
            ));
        }
        if config.pool.max_agents == 0 {
            return Err(ConfigError::InvalidMaxAgents(config.pool.max_agents));
        }
        if config.pool.min_agents > config.pool.max_agents {
            return Err(ConfigError::InvalidPoolSizing {
                min: config.pool.min_agents,
                max: config.pool.max_agents,
            });
        }
        if config.executor.acquire_backoff_ms == 0 {
            return Err(ConfigError::InvalidBackoff(config.executor.acquire_backoff_ms));
        }
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => return Err(ConfigError::InvalidLogLevel(other.to_string())),
        }
        match config.logging.format.as_str() {
            "json" | "pretty" => {}
            other => return Err(ConfigError::InvalidLogFormat(other.to_string())),
        }
        Ok(())
    }
}
