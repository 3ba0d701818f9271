//! Configuration loading
//!
//! Configuration lives in a single TOML file, located by priority:
//! 1. Command-line argument (highest priority)
//! 2. `QUOTEBOARD_CONFIG` environment variable
//! 3. `<user config dir>/quoteboard/config.toml`, then `/etc/quoteboard/config.toml`
//!
//! The tracker access token may additionally come from
//! `QUOTEBOARD_ACCESS_TOKEN`, which overrides the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::models::QuoteType;
use crate::{Error, Result};

pub const CONFIG_ENV_VAR: &str = "QUOTEBOARD_CONFIG";
pub const ACCESS_TOKEN_ENV_VAR: &str = "QUOTEBOARD_ACCESS_TOKEN";

const DEFAULT_BASE_URL: &str = "https://app.asana.com/api/1.0";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_requests_per_minute() -> u32 {
    150
}

fn default_quiet_period_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_helper_threshold() -> u32 {
    3
}

fn default_max_length() -> usize {
    280
}

fn default_quote_type() -> QuoteType {
    QuoteType::Multi
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Complete moderator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub tracker: TrackerConfig,
    /// Identity the moderator acts as; records assigned to it are flagged
    pub moderator: String,
    /// Identity added as follower after repeated failures
    pub helper: String,
    /// Idle time after the last edit before a record is reparsed
    #[serde(default = "default_quiet_period_secs")]
    pub quiet_period_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Failure count at which the helper is brought in
    #[serde(default = "default_helper_threshold")]
    pub helper_threshold: u32,
    /// Port of the status endpoint; disabled when absent
    #[serde(default)]
    pub status_port: Option<u16>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

/// Tracker connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

/// Logging configuration; `RUST_LOG` takes precedence when set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One moderated collection (tracker project)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub id: String,
    #[serde(default = "default_quote_type")]
    pub quote_type: QuoteType,
    /// Spoken characters above which the quote is accepted with a warning
    #[serde(default = "default_max_length")]
    pub max_length: usize,
    #[serde(default)]
    pub status_field: Option<StatusFieldConfig>,
}

/// Enum custom field mirroring the quote status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFieldConfig {
    pub field: String,
    pub needs_review: String,
    pub needs_editing: String,
    pub accepted: String,
}

impl TomlConfig {
    /// Parse and validate TOML text (no environment overrides)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_secs(self.quiet_period_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.moderator.trim().is_empty() {
            return Err(Error::Config("moderator identity must not be empty".to_string()));
        }
        if self.helper.trim().is_empty() {
            return Err(Error::Config("helper identity must not be empty".to_string()));
        }
        if self.quiet_period_secs == 0 {
            return Err(Error::Config("quiet_period_secs must be positive".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll_interval_secs must be positive".to_string()));
        }
        if self.helper_threshold == 0 {
            return Err(Error::Config("helper_threshold must be positive".to_string()));
        }
        if self.tracker.requests_per_minute == 0 {
            return Err(Error::Config("requests_per_minute must be positive".to_string()));
        }
        if self.collections.is_empty() {
            return Err(Error::Config("at least one collection must be configured".to_string()));
        }
        for collection in &self.collections {
            if collection.id.trim().is_empty() {
                return Err(Error::Config("collection id must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Locate the configuration file
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config locations
    let user_config = dirs::config_dir().map(|d| d.join("quoteboard").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }
    let system_config = PathBuf::from("/etc/quoteboard/config.toml");
    if system_config.exists() {
        return Ok(system_config);
    }

    Err(Error::Config(format!(
        "No config file found. Pass --config, set {}, or create ~/.config/quoteboard/config.toml",
        CONFIG_ENV_VAR
    )))
}

/// Read, parse and validate the configuration file, applying env overrides
pub fn load_config(path: &Path) -> Result<TomlConfig> {
    debug!(path = %path.display(), "Reading configuration");
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let mut config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;

    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV_VAR) {
        if !token.trim().is_empty() {
            info!("Tracker access token loaded from environment variable");
            config.tracker.access_token = Some(token);
        }
    }

    config.validate()?;
    info!(
        path = %path.display(),
        collections = config.collections.len(),
        "Configuration loaded"
    );
    Ok(config)
}
