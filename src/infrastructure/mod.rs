//! Infrastructure: configuration and logging.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError, ConfigLoader, ExecutorConfig, LoggingConfig};
pub use logging::Logging;
