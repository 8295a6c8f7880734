//! # Configuration Module
//!
//! [`AppConfig`] is read from a YAML or TOML file (chosen by extension) and
//! then overridden by environment variables, so a deployment can tune a
//! packaged config without editing it.
//!
//! ## Environment Variables
//!
//! - `ROUTEBIND_ASYNC_TIMEOUT_MS`: default wait for deferred/async results
//! - `ROUTEBIND_ASYNC_TIMEOUT_FALLBACK`: JSON body sent when that wait times out
//! - `ROUTEBIND_FLASH_TIMEOUT_SECS`: lifetime of flash attributes
//! - `ROUTEBIND_MAX_BODY_BYTES`: request body limit
//! - `ROUTEBIND_ADMIN_PREFIX`: path prefix of the admin endpoints
//! - `ROUTEBIND_MAX_FORWARD_DEPTH`: bound on chained `forward:` views
//! - worker pool variables, see [`crate::worker_pool`]
//!
//! ## Example
//!
//! ```yaml
//! async_timeout_ms: 10000
//! async_timeout_fallback: { "status": "pending" }
//! max_body_bytes: 1048576
//! worker_pool:
//!   core_workers: 8
//!   max_workers: 32
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::binding::{default_converters, ArgumentBinder, ResolverRegistry};
use crate::dispatcher::{
    Dispatcher, FlashMapManager, ResponseDispatcher, DEFAULT_ASYNC_TIMEOUT, DEFAULT_FLASH_TIMEOUT,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_FORWARD_DEPTH,
};
use crate::router::RouteTable;
use crate::worker_pool::{WorkerPool, WorkerPoolConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub worker_pool: WorkerPoolConfig,
    pub async_timeout_ms: u64,
    /// Body sent when an async wait times out; 503 when absent.
    pub async_timeout_fallback: Option<Value>,
    pub flash_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub admin_prefix: String,
    pub max_forward_depth: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker_pool: WorkerPoolConfig::default(),
            async_timeout_ms: u64::try_from(DEFAULT_ASYNC_TIMEOUT.as_millis()).unwrap_or(30_000),
            async_timeout_fallback: None,
            flash_timeout_secs: DEFAULT_FLASH_TIMEOUT.as_secs(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            admin_prefix: "/admin".to_string(),
            max_forward_depth: DEFAULT_MAX_FORWARD_DEPTH,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

impl AppConfig {
    /// Defaults plus environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a YAML (`.yaml`/`.yml`) or TOML (`.toml`) file, then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// The file cannot be read, has an unknown extension, or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parsed: AppConfig = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&raw)
                .with_context(|| format!("invalid YAML config {}", path.display()))?,
            "toml" => toml::from_str(&raw).with_context(|| format!("invalid TOML config {}", path.display()))?,
            other => anyhow::bail!("unsupported config extension '{other}' for {}", path.display()),
        };
        let config = parsed.with_env_overrides();
        // C1: Config loaded
        info!(
            path = %path.display(),
            async_timeout_ms = config.async_timeout_ms,
            max_body_bytes = config.max_body_bytes,
            admin_prefix = %config.admin_prefix,
            "Configuration loaded"
        );
        Ok(config)
    }

    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.worker_pool = self.worker_pool.with_env_overrides();
        if let Some(v) = env_parse("ROUTEBIND_ASYNC_TIMEOUT_MS") {
            self.async_timeout_ms = v;
        }
        if let Ok(raw) = std::env::var("ROUTEBIND_ASYNC_TIMEOUT_FALLBACK") {
            match serde_json::from_str(&raw) {
                Ok(v) => self.async_timeout_fallback = Some(v),
                Err(e) => warn!(error = %e, "Ignoring invalid ROUTEBIND_ASYNC_TIMEOUT_FALLBACK"),
            }
        }
        if let Some(v) = env_parse("ROUTEBIND_FLASH_TIMEOUT_SECS") {
            self.flash_timeout_secs = v;
        }
        if let Some(v) = env_parse("ROUTEBIND_MAX_BODY_BYTES") {
            self.max_body_bytes = v;
        }
        if let Ok(v) = std::env::var("ROUTEBIND_ADMIN_PREFIX") {
            self.admin_prefix = v;
        }
        if let Some(v) = env_parse("ROUTEBIND_MAX_FORWARD_DEPTH") {
            self.max_forward_depth = v;
        }
        self
    }

    #[must_use]
    pub fn async_timeout(&self) -> Duration {
        Duration::from_millis(self.async_timeout_ms)
    }

    #[must_use]
    pub fn flash_timeout(&self) -> Duration {
        Duration::from_secs(self.flash_timeout_secs)
    }

    /// Assemble a dispatcher with a fresh route table, the default
    /// resolvers, and a worker pool built from `worker_pool`.
    ///
    /// # Errors
    ///
    /// The worker pool could not start.
    pub fn build_dispatcher(&self) -> Result<Dispatcher> {
        let pool = WorkerPool::new(self.worker_pool.clone()).context("failed to start worker pool")?;
        Ok(self.build_dispatcher_with_pool(pool))
    }

    /// Like [`AppConfig::build_dispatcher`] with an existing pool.
    #[must_use]
    pub fn build_dispatcher_with_pool(&self, pool: Arc<WorkerPool>) -> Dispatcher {
        let registry = Arc::new(ResolverRegistry::with_defaults(default_converters()));
        let responses = ResponseDispatcher::new(Arc::new(FlashMapManager::new(self.flash_timeout())))
            .with_pool(pool)
            .with_async_timeout(self.async_timeout())
            .with_async_fallback(self.async_timeout_fallback.clone());
        Dispatcher::with_parts(Arc::new(RouteTable::new()), ArgumentBinder::new(registry), responses)
            .with_max_body_bytes(self.max_body_bytes)
            .with_max_forward_depth(self.max_forward_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = AppConfig::default();
        assert_eq!(c.async_timeout(), Duration::from_secs(30));
        assert_eq!(c.flash_timeout(), Duration::from_secs(180));
        assert_eq!(c.admin_prefix, "/admin");
    }

    #[test]
    fn test_load_yaml_partial() {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            f,
            "async_timeout_ms: 500\nasync_timeout_fallback:\n  status: pending\nworker_pool:\n  core_workers: 2"
        )
        .unwrap();
        let c = AppConfig::load(f.path()).unwrap();
        assert_eq!(c.async_timeout_ms, 500);
        assert_eq!(c.async_timeout_fallback, Some(serde_json::json!({"status": "pending"})));
        assert_eq!(c.worker_pool.core_workers, 2);
        assert_eq!(c.worker_pool.queue_bound, 1024);
    }

    #[test]
    fn test_load_toml() {
        let mut f = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(f, "max_body_bytes = 2048\nadmin_prefix = \"/ops\"\n[worker_pool]\nmax_workers = 3").unwrap();
        let c = AppConfig::load(f.path()).unwrap();
        assert_eq!(c.max_body_bytes, 2048);
        assert_eq!(c.admin_prefix, "/ops");
        assert_eq!(c.worker_pool.max_workers, 3);
    }

    #[test]
    fn test_unknown_extension() {
        let f = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = AppConfig::load(f.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config extension"));
    }
}
