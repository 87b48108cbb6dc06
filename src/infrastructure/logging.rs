//! Logging initialization using tracing.

use anyhow::Result;
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use super::config::LoggingConfig;

/// Holds the file-writer guard so buffered log lines are flushed on drop.
pub struct Logging {
    _guard: Option<WorkerGuard>,
}

impl Logging {
    /// Initialize the global subscriber from the given configuration.
    ///
    /// Stderr gets the configured format; when `log_dir` is set, a daily
    /// rolling file additionally receives JSON lines.
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let default_level = parse_log_level(&config.level)?;
        let env_filter = EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy();

        let guard = if let Some(ref log_dir) = config.log_dir {
            let file_appender = rolling::daily(log_dir, "conductor.log");
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true)
                .boxed();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer(&config.format))
                .with(file_layer)
                .try_init()?;
            Some(guard)
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer(&config.format))
                .try_init()?;
            None
        };

        Ok(Self { _guard: guard })
    }
}

fn stderr_layer<S>(format: &str) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    if format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .boxed()
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(anyhow::anyhow!("Invalid log level: {other}")),
    }
}
