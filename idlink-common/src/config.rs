//! Bootstrap configuration loading
//!
//! Every setting is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`IDLINK_DATABASE`, `IDLINK_BIND`, `IDLINK_PORT`, `IDLINK_LOG`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the service logs a warning and
//! starts on defaults. A file that exists but fails to parse is rejected.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENV_DATABASE: &str = "IDLINK_DATABASE";
pub const ENV_BIND: &str = "IDLINK_BIND";
pub const ENV_PORT: &str = "IDLINK_PORT";
pub const ENV_LOG: &str = "IDLINK_LOG";

const DEFAULT_PORT: u16 = 5730;
const DEFAULT_BIND: &str = "127.0.0.1";

/// Configuration file contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Address the HTTP listener binds to
    #[serde(default)]
    pub bind_address: Option<String>,

    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub merge: MergeConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default)]
    pub level: Option<String>,
}

/// Merge behaviour
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct MergeConfig {
    /// Re-link the children of a demoted primary to the surviving primary.
    /// Off by default: demotion only rewrites the demoted row.
    #[serde(default)]
    pub cascade_children: bool,
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Load the explicit path, else the platform default; fall back to
    /// defaults when no file is found
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => default_config_path(),
        };

        match path {
            Some(p) if p.exists() => {
                info!("Loading configuration from {}", p.display());
                Self::load(&p)
            }
            Some(p) => {
                warn!("Config file not found at {}, using defaults", p.display());
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub database_path: PathBuf,
    pub bind_address: String,
    pub port: u16,
    pub log_level: String,
    pub cascade_children: bool,
}

impl ServiceConfig {
    /// Merge CLI values, environment, file contents and defaults
    pub fn resolve(cli: CliOverrides, file: TomlConfig) -> Result<Self> {
        let database_path = cli
            .database_path
            .or_else(|| std::env::var(ENV_DATABASE).ok().map(PathBuf::from))
            .or(file.database_path)
            .unwrap_or_else(default_database_path);

        let bind_address = cli
            .bind_address
            .or_else(|| std::env::var(ENV_BIND).ok())
            .or(file.bind_address)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let port = match cli.port {
            Some(p) => p,
            None => match std::env::var(ENV_PORT) {
                Ok(raw) => raw
                    .parse::<u16>()
                    .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", ENV_PORT, raw, e)))?,
                Err(_) => file.port.unwrap_or(DEFAULT_PORT),
            },
        };

        let log_level = cli
            .log_level
            .or_else(|| std::env::var(ENV_LOG).ok())
            .or(file.logging.level)
            .unwrap_or_else(|| "info".to_string());

        Ok(Self {
            database_path,
            bind_address,
            port,
            log_level,
            cascade_children: file.merge.cascade_children,
        })
    }

    /// `address:port` string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Default configuration file location (`<config_dir>/idlink/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("idlink").join("config.toml"))
}

/// Default database location (`<data_local_dir>/idlink/contacts.db`)
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("idlink"))
        .unwrap_or_else(|| PathBuf::from("./idlink_data"))
        .join("contacts.db")
}
