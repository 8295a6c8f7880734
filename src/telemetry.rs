//! # Telemetry Module
//!
//! Structured logging setup on top of `tracing-subscriber`.
//!
//! ## Environment Variables
//!
//! - `ROUTEBIND_LOG_LEVEL`: `trace|debug|info|warn|error` (default: `info`)
//! - `ROUTEBIND_LOG_FORMAT`: `json|pretty` (default: `json`)
//! - `ROUTEBIND_LOG_ASYNC`: write through a non-blocking appender (default: `true`)
//! - `ROUTEBIND_LOG_FILTER`: extra comma-separated directives, e.g.
//!   `routebind::binding=debug,routebind::router=trace`
//! - `ROUTEBIND_LOG_LOCATION`: include file and line (default: `false`)
//!
//! `RUST_LOG`, when set, takes precedence over `ROUTEBIND_LOG_LEVEL`.

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Unknown values fall back to JSON.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    pub async_logging: bool,
    pub target_filter: Option<String>,
    pub include_location: bool,
}

fn env_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("ROUTEBIND_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(&env::var("ROUTEBIND_LOG_FORMAT").unwrap_or_else(|_| "json".to_string())),
            async_logging: env_flag("ROUTEBIND_LOG_ASYNC", true),
            target_filter: env::var("ROUTEBIND_LOG_FILTER").ok(),
            include_location: env_flag("ROUTEBIND_LOG_LOCATION", false),
        }
    }

    /// Verbose, human-readable, synchronous.
    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    #[must_use]
    pub fn default_prod() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            async_logging: true,
            target_filter: None,
            include_location: false,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Build the filter: `RUST_LOG` or the level, plus extra directives.
    ///
    /// # Errors
    ///
    /// A directive in `target_filter` does not parse.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        if let Some(extra) = &self.target_filter {
            for directive in extra.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                filter = filter.add_directive(
                    directive
                        .parse()
                        .with_context(|| format!("invalid log filter directive: {directive}"))?,
                );
            }
        }
        Ok(filter)
    }
}

/// Keeps the non-blocking writer flushing; drop it at shutdown.
#[must_use = "dropping the guard stops asynchronous log output"]
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

/// Initialize logging from `ROUTEBIND_LOG_*`.
///
/// # Errors
///
/// See [`init_logging_with_config`].
pub fn init_logging() -> Result<LoggingGuard> {
    init_logging_with_config(&LogConfig::from_env())
}

/// Install the global subscriber.
///
/// # Errors
///
/// An invalid filter directive, or a subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<LoggingGuard> {
    let filter = config.env_filter()?;
    let (writer, worker) = if config.async_logging {
        let (nb, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(nb), Some(guard))
    } else {
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout), None)
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LoggingGuard { _worker: worker })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("invalid"), LogFormat::Json);
    }

    #[test]
    fn test_presets() {
        let dev = LogConfig::default_dev();
        assert_eq!(dev.level(), Level::DEBUG);
        assert!(!dev.async_logging);
        let prod = LogConfig::default_prod();
        assert_eq!(prod.format, LogFormat::Json);
        assert!(!prod.include_location);
    }

    #[test]
    fn test_filter_directives() {
        let mut config = LogConfig::default_prod();
        config.target_filter = Some("routebind::router=trace, ,routebind::binding=debug".into());
        assert!(config.env_filter().is_ok());
        config.target_filter = Some("routebind=notalevel".into());
        assert!(config.env_filter().is_err());
    }
}
