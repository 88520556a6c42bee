//! Configuration system for iihflow.
//!
//! Supports TOML-based configuration with global defaults and per-datasource overrides.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IihflowError, Result};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct IihflowConfig {
    /// Global defaults applied to all datasources unless overridden.
    pub defaults: GlobalDefaults,

    /// Per-datasource configuration overrides (keyed by datasource name).
    #[serde(default)]
    pub datasources: HashMap<String, DatasourceConfig>,
}

/// Global default settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalDefaults {
    pub query: QueryConfig,
    pub pagination: PaginationConfig,
    pub session: SessionConfig,
}

/// Query execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Replace a `to` bound in the future with the current instant (default: true).
    pub clamp_to_now: bool,
    /// Maximum values returned to a variable picker (0 = unlimited).
    pub max_picker_values: usize,
}

/// How a failed page request is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Abort the query on the first backend error.
    #[default]
    FailFast,
    /// Re-issue the same page with exponential backoff.
    Retry,
}

/// Pagination loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Delay before every page request in milliseconds (default: 200).
    pub request_delay_ms: u64,
    /// Hard ceiling on requests per access group (default: 99999).
    pub max_iterations: u32,
    pub failure_policy: FailureMode,
    /// Consecutive failures tolerated under the retry policy (default: 3).
    pub max_retries: u32,
    /// First backoff in milliseconds, doubled on each consecutive failure (default: 500).
    pub backoff_ms: u64,
}

/// Session / token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Refresh the token this many seconds before it expires (default: 120).
    pub token_refresh_margin_secs: u64,
}

/// Per-datasource configuration (can override globals).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasourceConfig {
    pub query: Option<QueryConfig>,
    pub pagination: Option<PaginationConfig>,
    pub session: Option<SessionConfig>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            clamp_to_now: true,
            max_picker_values: 0,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 200,
            max_iterations: 99_999,
            failure_policy: FailureMode::FailFast,
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_refresh_margin_secs: 120,
        }
    }
}

impl PaginationConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl IihflowConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| IihflowError::Config(format!("failed to read config file: {e}")))?;
        Self::from_toml(&contents)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| IihflowError::Config(format!("failed to parse config: {e}")))
    }

    /// Load from default locations (env var, cwd, user config dir, or defaults).
    ///
    /// Search order:
    /// 1. `IIHFLOW_CONFIG` environment variable
    /// 2. `./iihflow.toml` (current directory)
    /// 3. `~/.config/iihflow/config.toml` (user config dir)
    /// 4. Built-in defaults
    pub fn load_default() -> Self {
        if let Ok(path) = std::env::var("IIHFLOW_CONFIG") {
            if let Ok(cfg) = Self::from_file(&path) {
                tracing::info!(path = %path, "loaded config from IIHFLOW_CONFIG");
                return cfg;
            }
        }

        if let Ok(cfg) = Self::from_file("iihflow.toml") {
            tracing::info!("loaded config from ./iihflow.toml");
            return cfg;
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("iihflow").join("config.toml");
            if let Ok(cfg) = Self::from_file(&user_config) {
                tracing::info!(path = %user_config.display(), "loaded config from user config dir");
                return cfg;
            }
        }

        tracing::debug!("no config file found, using defaults");
        Self::default()
    }

    /// Get resolved config for a specific datasource (merges global defaults).
    pub fn for_datasource(&self, name: &str) -> ResolvedDatasourceConfig {
        ResolvedDatasourceConfig::merge(&self.defaults, self.datasources.get(name))
    }
}

/// Fully resolved configuration for a datasource (no Option fields).
#[derive(Debug, Clone, Default)]
pub struct ResolvedDatasourceConfig {
    pub query: QueryConfig,
    pub pagination: PaginationConfig,
    pub session: SessionConfig,
}

impl ResolvedDatasourceConfig {
    fn merge(defaults: &GlobalDefaults, override_cfg: Option<&DatasourceConfig>) -> Self {
        match override_cfg {
            Some(ds) => Self {
                query: ds.query.clone().unwrap_or_else(|| defaults.query.clone()),
                pagination: ds
                    .pagination
                    .clone()
                    .unwrap_or_else(|| defaults.pagination.clone()),
                session: ds
                    .session
                    .clone()
                    .unwrap_or_else(|| defaults.session.clone()),
            },
            None => Self {
                query: defaults.query.clone(),
                pagination: defaults.pagination.clone(),
                session: defaults.session.clone(),
            },
        }
    }
}
