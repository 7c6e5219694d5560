//! Logging system configuration and initialization
//!
//! This module provides:
//! - Console output and optional non-blocking file output
//! - Configuration file based log level control with RUST_LOG override
//! - Structured JSON logging (optional)
//! - Local-time timestamps

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::ConfigManager;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Get the log directory under the user data directory
pub fn get_log_directory() -> PathBuf {
    ConfigManager::get_log_dir()
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Build the env filter used by [`init_logging_with_config`].
///
/// `RUST_LOG` wins when set. Otherwise noisy dependency targets are
/// suppressed unless the configured level is `trace`.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        let mut directives = vec![
            "sqlx::query=warn".to_string(),
            "sqlx::sqlite=warn".to_string(),
            "hyper=warn".to_string(),
            "h2=warn".to_string(),
            "reqwest=info".to_string(),
            "tokio=info".to_string(),
            "selectors=warn".to_string(),
        ];
        directives.extend(
            config
                .module_filters
                .iter()
                .map(|(module, level)| format!("{module}={level}")),
        );
        directives.push(format!("seed_harvester={}", config.level));

        for directive in directives {
            filter = filter.add_directive(
                directive
                    .parse()
                    .with_context(|| format!("Invalid log directive '{directive}'"))?,
            );
        }
    }

    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    init_logging_in(config, &get_log_directory())
}

/// Initialize logging, writing the log file (if enabled) into `log_dir`
pub fn init_logging_in(config: &LoggingConfig, log_dir: &Path) -> Result<()> {
    let env_filter = build_env_filter(config)?;
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.file_output {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

        let file_appender = rolling::never(log_dir, &config.file_name);
        let (file_writer, file_guard) = non_blocking(file_appender);

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let file_layer = if config.json_format {
            fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .boxed()
        } else {
            fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_ansi(false)
                .boxed()
        };
        layers.push(file_layer);
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    if config.file_output {
        info!("📝 Logging to {}", log_dir.join(&config.file_name).display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_builds() {
        let config = LoggingConfig::default();
        assert!(build_env_filter(&config).is_ok());
    }

    #[test]
    fn bad_module_filter_is_an_error() {
        let mut config = LoggingConfig::default();
        config
            .module_filters
            .insert("sqlx".to_string(), "not a level!".to_string());
        // RUST_LOG takes precedence when the test runner sets it
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_env_filter(&config).is_err());
        }
    }
}
