//! Layered broker configuration.
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! `QUERN__`-prefixed environment variables (`QUERN__LISTEN`,
//! `QUERN__POOL__GPU__MAX_SIZE`, ...).

use crate::task::domain::{DEFAULT_POOL_MAX_SIZE, PoolLimits, PoolName, TaskDomainError};
use crate::telemetry::{CustomMetricSettings, DEFAULT_METRICS_PREFIX, LogFormat, WorkerMetrics};
use camino::{Utf8Path, Utf8PathBuf};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "QUERN_CONFIG_PATH";

/// File read when no path is given explicitly or through the environment.
pub const DEFAULT_CONFIG_FILE: &str = "quern.toml";

const ENV_PREFIX: &str = "QUERN";
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Per-pool overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolSettings {
    /// Maximum number of acquired or working tasks in the pool.
    pub max_size: usize,
}

/// Broker process settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrokerSettings {
    /// Socket address the HTTP server binds to. A bare `:port` binds all
    /// interfaces.
    pub listen: String,
    /// Snapshot file restored at startup and written at shutdown.
    #[serde(default)]
    pub snapshot_path: Option<String>,
    /// Token required in the `x-auth-token` header when set.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Cap applied to pools without an override.
    #[serde(default = "default_pool_max_size")]
    pub default_pool_max_size: usize,
    /// Per-pool overrides keyed by pool name.
    #[serde(default)]
    pub pool: HashMap<String, PoolSettings>,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Prefix of every exported metric name.
    pub metrics_prefix: String,
    /// Custom series workers may report with their updates, keyed by name.
    #[serde(default)]
    pub worker_custom_metric: HashMap<String, CustomMetricSettings>,
}

const fn default_pool_max_size() -> usize {
    DEFAULT_POOL_MAX_SIZE
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("listen", DEFAULT_LISTEN)?
        .set_default("log_filter", "info")?
        .set_default("log_format", "text")?
        .set_default("metrics_prefix", DEFAULT_METRICS_PREFIX)
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}

/// Picks the configuration file: explicit path, then environment, then the
/// default file name.
#[must_use]
pub fn resolve_config_path(explicit: Option<&Utf8Path>, from_env: Option<String>) -> Utf8PathBuf {
    explicit.map_or_else(
        || {
            from_env
                .filter(|value| !value.trim().is_empty())
                .map_or_else(|| Utf8PathBuf::from(DEFAULT_CONFIG_FILE), Utf8PathBuf::from)
        },
        Utf8Path::to_path_buf,
    )
}

impl BrokerSettings {
    /// Loads settings from `path` (missing file allowed) and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a source is malformed or a value fails
    /// validation.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        Self::build(
            defaults()?
                .add_source(File::new(path.as_str(), FileFormat::Toml).required(false))
                .add_source(env_source()),
        )
    }

    /// Parses settings from TOML text on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text is malformed or a value fails
    /// validation.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Self::build(defaults()?.add_source(File::from_str(contents, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Self = builder.build()?.try_deserialize()?;
        settings
            .pool_limits()
            .map_err(|err| ConfigError::Message(err.to_string()))?;
        Ok(settings)
    }

    /// Returns the address to bind, expanding a bare `:port`.
    #[must_use]
    pub fn listen_addr(&self) -> String {
        if self.listen.starts_with(':') {
            format!("0.0.0.0{}", self.listen)
        } else {
            self.listen.clone()
        }
    }

    /// Returns the auth token when one is configured and non-blank.
    #[must_use]
    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }

    /// Returns the snapshot path when one is configured and non-blank.
    #[must_use]
    pub fn snapshot_path(&self) -> Option<Utf8PathBuf> {
        self.snapshot_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
            .map(Utf8PathBuf::from)
    }

    /// Builds the registry of worker-reported series.
    #[must_use]
    pub fn worker_metrics(&self) -> WorkerMetrics {
        WorkerMetrics::new(&self.metrics_prefix, self.worker_custom_metric.clone())
    }

    /// Builds the admission limits the task store enforces.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDomainError::EmptyPoolName`] when an override is keyed by
    /// a blank name.
    pub fn pool_limits(&self) -> Result<PoolLimits, TaskDomainError> {
        let mut limits = PoolLimits::new(self.default_pool_max_size);
        for (name, pool) in &self.pool {
            limits = limits.with_pool(PoolName::new(name.as_str())?, pool.max_size);
        }
        Ok(limits)
    }
}
