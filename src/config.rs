//! Configuration module for geo-lookup-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::lookup::geo::default_location;
use crate::protocol::{Location, DEFAULT_MAX_FRAME_SIZE};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Largest frame size that may be configured.
const MAX_CONFIGURABLE_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Command-line arguments for the lookup server
#[derive(Parser, Debug, Default)]
#[command(name = "geo-lookup-server")]
#[command(version)]
#[command(about = "IP, phone and time lookups over a framed binary protocol", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Maximum accepted request payload in bytes
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Per-lookup timeout in milliseconds (no timeout when unset)
    #[arg(long)]
    pub lookup_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub lookup: LookupConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads
    pub threads: Option<usize>,
    /// Pending connection queue length
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds in-flight requests get to finish on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            threads: None,
            backlog: default_backlog(),
            max_connections: default_max_connections(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Wire protocol configuration
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
        }
    }
}

/// Lookup capability configuration
#[derive(Debug, Deserialize)]
pub struct LookupConfig {
    pub timeout_ms: Option<u64>,
    /// Resolve host names in IP queries through the system resolver
    #[serde(default = "default_true")]
    pub resolve_hostnames: bool,
    /// Location returned for resolvable IP queries
    #[serde(default)]
    pub location: LocationConfig,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            resolve_hostnames: true,
            location: LocationConfig::default(),
        }
    }
}

/// Fixed location answered by the IP lookup
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocationConfig {
    pub country_iso: String,
    pub country_name: String,
    pub city_name: String,
    pub postal: String,
    pub subdivision_name: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        default_location().into()
    }
}

impl From<Location> for LocationConfig {
    fn from(location: Location) -> Self {
        Self {
            country_iso: location.country_iso,
            country_name: location.country_name,
            city_name: location.city_name,
            postal: location.postal,
            subdivision_name: location.subdivision_name,
        }
    }
}

impl From<LocationConfig> for Location {
    fn from(config: LocationConfig) -> Self {
        Self {
            country_iso: config.country_iso,
            country_name: config.country_name,
            city_name: config.city_name,
            postal: config.postal,
            subdivision_name: config.subdivision_name,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    /// Seconds between metrics log lines (0 = disabled)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
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

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_backlog() -> u32 {
    1024
}

fn default_max_connections() -> usize {
    10_000
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_true() -> bool {
    true
}

fn default_stats_interval_secs() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Number of available processing units, at least 1.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    pub backlog: u32,
    pub max_connections: usize,
    pub shutdown_grace_secs: u64,
    pub max_frame_size: usize,
    pub lookup_timeout_ms: Option<u64>,
    pub resolve_hostnames: bool,
    pub location: LocationConfig,
    pub stats_interval_secs: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve configuration from already-parsed CLI args.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|source| ConfigError::FileRead {
                    path: config_path.clone(),
                    source,
                })?;
            toml::from_str(&contents)
                .map_err(|source| ConfigError::TomlParse {
                    path: config_path.clone(),
                    source,
                })?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values (CLI takes precedence) and validate.
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            threads: cli
                .threads
                .or(toml_config.server.threads)
                .unwrap_or_else(default_threads),
            backlog: toml_config.server.backlog,
            max_connections: toml_config.server.max_connections,
            shutdown_grace_secs: toml_config.server.shutdown_grace_secs,
            max_frame_size: cli
                .max_frame_size
                .unwrap_or(toml_config.protocol.max_frame_size),
            lookup_timeout_ms: cli.lookup_timeout_ms.or(toml_config.lookup.timeout_ms),
            resolve_hostnames: toml_config.lookup.resolve_hostnames,
            location: toml_config.lookup.location,
            stats_interval_secs: toml_config.metrics.stats_interval_secs,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be at least 1".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.max_frame_size == 0 || self.max_frame_size > MAX_CONFIGURABLE_FRAME_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size must be between 1 and {MAX_CONFIGURABLE_FRAME_SIZE}"
            )));
        }
        if self.lookup_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "lookup timeout must be greater than 0 ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
