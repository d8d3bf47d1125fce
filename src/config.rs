//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and `STRATA_*` environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path of the embedded store file
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Cluster node addresses
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// Operating account, created on first install
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_password")]
    pub password: String,

    /// Well-known administrative account of a pristine store
    #[serde(default = "default_admin_username")]
    pub default_admin_username: String,

    #[serde(default = "default_admin_password")]
    pub default_admin_password: String,
}

fn default_store_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("strata").join("strata.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./strata_data/strata.db".to_string())
}

fn default_nodes() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_username() -> String {
    "strata_admin".to_string()
}

fn default_password() -> String {
    "strata_admin".to_string()
}

fn default_admin_username() -> String {
    crate::gateway::embedded::DEFAULT_ADMIN_USER.to_string()
}

fn default_admin_password() -> String {
    crate::gateway::embedded::DEFAULT_ADMIN_PASSWORD.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            nodes: default_nodes(),
            username: default_username(),
            password: default_password(),
            default_admin_username: default_admin_username(),
            default_admin_password: default_admin_password(),
        }
    }
}

/// Retention, TTL and index layout for the metric buckets
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_raw_retention_days")]
    pub raw_retention_days: i64,

    #[serde(default = "default_one_hour_retention_days")]
    pub one_hour_retention_days: i64,

    #[serde(default = "default_six_hour_retention_days")]
    pub six_hour_retention_days: i64,

    #[serde(default = "default_twenty_four_hour_retention_days")]
    pub twenty_four_hour_retention_days: i64,

    /// TTLs in seconds; default to the retention period
    pub raw_ttl_secs: Option<u32>,
    pub one_hour_ttl_secs: Option<u32>,
    pub six_hour_ttl_secs: Option<u32>,
    pub twenty_four_hour_ttl_secs: Option<u32>,

    /// Width of the collection time slice per bucket, in hours
    #[serde(default = "default_raw_slice_hours")]
    pub raw_time_slice_hours: i64,

    #[serde(default = "default_one_hour_slice_hours")]
    pub one_hour_time_slice_hours: i64,

    #[serde(default = "default_six_hour_slice_hours")]
    pub six_hour_time_slice_hours: i64,

    #[serde(default = "default_twenty_four_hour_slice_hours")]
    pub twenty_four_hour_time_slice_hours: i64,

    /// Rows fetched per index page
    #[serde(default = "default_index_page_size")]
    pub index_page_size: usize,

    /// Number of index shards; never change once entries exist
    #[serde(default = "default_index_partitions")]
    pub index_partitions: u32,

    /// Width of the schedule id range grouped into one index entry
    #[serde(default = "default_schedule_batch_size")]
    pub schedule_batch_size: i32,
}

fn default_raw_retention_days() -> i64 {
    7
}

fn default_one_hour_retention_days() -> i64 {
    14
}

fn default_six_hour_retention_days() -> i64 {
    31
}

fn default_twenty_four_hour_retention_days() -> i64 {
    365
}

fn default_raw_slice_hours() -> i64 {
    1
}

fn default_one_hour_slice_hours() -> i64 {
    6
}

fn default_six_hour_slice_hours() -> i64 {
    24
}

fn default_twenty_four_hour_slice_hours() -> i64 {
    24
}

fn default_index_page_size() -> usize {
    2500
}

fn default_index_partitions() -> u32 {
    10
}

fn default_schedule_batch_size() -> i32 {
    5
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            raw_retention_days: default_raw_retention_days(),
            one_hour_retention_days: default_one_hour_retention_days(),
            six_hour_retention_days: default_six_hour_retention_days(),
            twenty_four_hour_retention_days: default_twenty_four_hour_retention_days(),
            raw_ttl_secs: None,
            one_hour_ttl_secs: None,
            six_hour_ttl_secs: None,
            twenty_four_hour_ttl_secs: None,
            raw_time_slice_hours: default_raw_slice_hours(),
            one_hour_time_slice_hours: default_one_hour_slice_hours(),
            six_hour_time_slice_hours: default_six_hour_slice_hours(),
            twenty_four_hour_time_slice_hours: default_twenty_four_hour_slice_hours(),
            index_page_size: default_index_page_size(),
            index_partitions: default_index_partitions(),
            schedule_batch_size: default_schedule_batch_size(),
        }
    }
}

/// Schema script configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaConfig {
    /// Directory holding `create/`, `update/` and `drop/` script folders.
    /// The scripts compiled into the binary are used when unset.
    pub scripts_dir: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
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
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("strata").join("config.toml")),
            Some(PathBuf::from("/etc/strata/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Store overrides
        if let Ok(path) = std::env::var("STRATA_STORE_PATH") {
            self.store.path = path;
        }
        if let Ok(nodes) = std::env::var("STRATA_STORE_NODES") {
            self.store.nodes = nodes
                .split(',')
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
        }
        if let Ok(username) = std::env::var("STRATA_STORE_USERNAME") {
            self.store.username = username;
        }
        if let Ok(password) = std::env::var("STRATA_STORE_PASSWORD") {
            self.store.password = password;
        }

        // Index overrides
        if let Ok(page_size) = std::env::var("STRATA_INDEX_PAGE_SIZE") {
            if let Ok(p) = page_size.parse() {
                self.metrics.index_page_size = p;
            }
        }

        // Schema overrides
        if let Ok(dir) = std::env::var("STRATA_SCRIPTS_DIR") {
            self.schema.scripts_dir = Some(dir);
        }

        // Logging overrides
        if let Ok(level) = std::env::var("STRATA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("STRATA_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Strata Configuration
#
# Environment variables override these settings:
# - STRATA_STORE_PATH
# - STRATA_STORE_NODES (comma separated)
# - STRATA_STORE_USERNAME
# - STRATA_STORE_PASSWORD
# - STRATA_INDEX_PAGE_SIZE
# - STRATA_SCRIPTS_DIR
# - STRATA_LOG_LEVEL
# - STRATA_LOG_FORMAT

[store]
# Embedded store file (default: the platform data directory)
path = "./strata_data/strata.db"

# Cluster nodes; the count drives the auth keyspace replication factor
nodes = ["127.0.0.1"]

# Operating account, created by `strata install`
username = "strata_admin"
password = "strata_admin"

# Administrative account of a pristine store
default_admin_username = "cassandra"
default_admin_password = "cassandra"

[metrics]
# Retention per bucket (days)
raw_retention_days = 7
one_hour_retention_days = 14
six_hour_retention_days = 31
twenty_four_hour_retention_days = 365

# TTL per bucket (seconds); defaults to the retention period
# raw_ttl_secs = 604800

# Collection time slice per bucket (hours)
raw_time_slice_hours = 1
one_hour_time_slice_hours = 6
six_hour_time_slice_hours = 24
twenty_four_hour_time_slice_hours = 24

# Index rows fetched per page
index_page_size = 2500

# Index shards. Do not change once data has been written.
index_partitions = 10

# Schedule ids grouped into one index entry
schedule_batch_size = 5

[schema]
# Directory with create/, update/ and drop/ script folders.
# Bundled scripts are used when unset.
# scripts_dir = "/etc/strata/schema"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/strata/strata.log"
"#
    .to_string()
}
