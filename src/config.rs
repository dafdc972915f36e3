//! Server configuration
//!
//! Configuration is an optional YAML file. Every field has a default, so an
//! empty file (or no file at all) yields the reference setup: port 8080,
//! three concurrent connections, documents under `./client`.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on `server.max_connections`.
pub const MAX_CONNECTIONS_LIMIT: usize = 10_000;

/// Command line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "docserve")]
#[command(about = "Minimal concurrent static file server", long_about = None)]
#[command(version)]
pub struct Args {
    /// YAML configuration file
    pub config: Option<PathBuf>,

    /// Port to listen on, overriding the configured one
    pub port: Option<u16>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub listen_addr: String,
    /// Maximum number of connections handled at the same time
    pub max_connections: usize,
    /// Upper bound on the time a client may take to send its request head
    pub read_timeout_ms: u64,
    /// How long shutdown waits for in-flight connections
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Document root every requested path is resolved beneath
    pub root: PathBuf,
    /// File served for `/` and for directory paths
    pub index_file: String,
    /// Directory holding the fallback resource
    pub not_found_root: PathBuf,
    /// Fallback resource served whenever resolution fails
    pub not_found_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            max_connections: 3,
            read_timeout_ms: 30_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./client"),
            index_file: "index.html".to_string(),
            not_found_root: PathBuf::from("./notFoundHTML"),
            not_found_file: "notFound.html".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Config {
    /// Loads configuration from a YAML file and validates it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // serde_yaml treats an empty document as null, not as an empty map
        let config: Config = if content.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Builds the configuration from parsed command line arguments.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = args.port {
            config.server.listen_addr = config.server.with_port(port)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "server.max_connections must be at least 1".to_string(),
            ));
        }
        if self.server.max_connections > MAX_CONNECTIONS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_connections must be at most {}",
                MAX_CONNECTIONS_LIMIT
            )));
        }
        if self.static_files.not_found_file.is_empty() {
            return Err(ConfigError::Invalid(
                "static_files.not_found_file must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Replaces the port of `listen_addr`, keeping its host part.
    pub fn with_port(&self, port: u16) -> Result<String, ConfigError> {
        match self.listen_addr.rsplit_once(':') {
            Some((host, _)) if !host.is_empty() => Ok(format!("{}:{}", host, port)),
            _ => Err(ConfigError::Invalid(format!(
                "server.listen_addr has no host:port form: {}",
                self.listen_addr
            ))),
        }
    }
}
